//! Feature importance bar chart and prediction summary.

use crate::logic::types::{Explanation, ExplanationResult, FeatureValues};

/// One bar of the chart
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub feature: String,
    pub importance: f64,
    /// `importance` as a percentage label
    pub percent: f64,
    /// Bar length relative to the largest importance, in `[0, 1]`
    pub width: f64,
}

/// Bars sorted by importance, largest first
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureChart {
    bars: Vec<Bar>,
}

impl FeatureChart {
    /// Weights are not assumed to be normalized. When the largest weight is
    /// not positive every bar gets zero width.
    pub fn from_weights(weights: &FeatureValues) -> Self {
        let max = weights.values().copied().fold(f64::NEG_INFINITY, f64::max);

        let mut bars: Vec<Bar> = weights
            .iter()
            .map(|(feature, &importance)| Bar {
                feature: feature.clone(),
                importance,
                percent: importance * 100.0,
                width: if max > 0.0 {
                    (importance / max).clamp(0.0, 1.0)
                } else {
                    0.0
                },
            })
            .collect();

        bars.sort_by(|a, b| {
            b.importance
                .total_cmp(&a.importance)
                .then_with(|| a.feature.cmp(&b.feature))
        });

        Self { bars }
    }

    pub fn for_explanation(explanation: &Explanation) -> Option<Self> {
        explanation.result.feature_importance().map(Self::from_weights)
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Text rendering, one line per bar; `columns` is the full bar length
    pub fn render(&self, columns: usize) -> String {
        let label_width = self.bars.iter().map(|b| b.feature.len()).max().unwrap_or(0);

        self.bars
            .iter()
            .map(|bar| {
                let filled = (bar.width * columns as f64).round() as usize;
                format!(
                    "{:<label$}  {}{}  {:>5.1}%",
                    bar.feature,
                    "#".repeat(filled),
                    " ".repeat(columns.saturating_sub(filled)),
                    bar.percent,
                    label = label_width,
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Prediction line of an instance explanation
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionSummary {
    pub prediction: String,
    pub confidence: Option<f64>,
}

impl PredictionSummary {
    pub fn from_explanation(explanation: &Explanation) -> Option<Self> {
        match &explanation.result {
            ExplanationResult::Instance(instance) => Some(Self {
                prediction: instance.prediction.to_string(),
                confidence: instance.confidence(),
            }),
            ExplanationResult::FeatureImportance(_) => None,
        }
    }

    pub fn render(&self) -> String {
        match self.confidence {
            Some(c) => format!("Prediction: {} (confidence {:.1}%)", self.prediction, c * 100.0),
            None => format!("Prediction: {}", self.prediction),
        }
    }
}
