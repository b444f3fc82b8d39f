//! List screens: models and explanations.

use super::chart::{FeatureChart, PredictionSummary};
use crate::logic::query::QueryState;
use crate::logic::types::{Explanation, ExplanationKind, Model};

const CHART_COLUMNS: usize = 30;

/// What a list screen shows for a query state
#[derive(Debug, Clone, PartialEq)]
pub enum ListView<T> {
    /// First load, nothing cached yet
    Loading,
    Failed(String),
    Empty(&'static str),
    Ready(Vec<T>),
    /// A refetch failed; the last good data stays on screen with the error
    Stale { items: Vec<T>, error: String },
}

impl<T: Clone> ListView<T> {
    /// Cached data keeps showing while a refetch runs or after it fails
    pub fn from_state(state: &QueryState<Vec<T>>, empty: &'static str) -> Self {
        match (state.data(), &state.error) {
            (Some(items), Some(error)) if !items.is_empty() => Self::Stale {
                items: items.clone(),
                error: error.to_string(),
            },
            (_, Some(error)) => Self::Failed(error.to_string()),
            (None, None) if state.is_loading => Self::Loading,
            (Some(items), None) if !items.is_empty() => Self::Ready(items.clone()),
            _ => Self::Empty(empty),
        }
    }

    /// Keep only the items matching `keep`
    pub fn filter(self, keep: impl Fn(&T) -> bool, empty: &'static str) -> Self {
        match self {
            Self::Ready(items) => {
                let items: Vec<T> = items.into_iter().filter(|item| keep(item)).collect();
                if items.is_empty() {
                    Self::Empty(empty)
                } else {
                    Self::Ready(items)
                }
            }
            Self::Stale { items, error } => {
                let items: Vec<T> = items.into_iter().filter(|item| keep(item)).collect();
                if items.is_empty() {
                    Self::Failed(error)
                } else {
                    Self::Stale { items, error }
                }
            }
            other => other,
        }
    }
}

pub fn models_view(state: &QueryState<Vec<Model>>) -> ListView<Model> {
    ListView::from_state(state, "No models available")
}

pub fn explanations_view(state: &QueryState<Vec<Explanation>>) -> ListView<Explanation> {
    ListView::from_state(state, "No explanations generated yet")
}

/// Tabs splitting explanations by kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExplanationTabs {
    active: ExplanationKind,
}

impl ExplanationTabs {
    pub fn new(active: ExplanationKind) -> Self {
        Self { active }
    }

    pub fn active(&self) -> ExplanationKind {
        self.active
    }

    pub fn select(&mut self, kind: ExplanationKind) {
        self.active = kind;
    }

    pub fn visible<'a>(&self, explanations: &'a [Explanation]) -> Vec<&'a Explanation> {
        explanations.iter().filter(|e| e.kind() == self.active).collect()
    }

    /// Narrow a list screen to the active tab
    pub fn apply(&self, view: ListView<Explanation>) -> ListView<Explanation> {
        view.filter(|e| e.kind() == self.active, "No explanations of this kind")
    }

    /// Tab labels with item counts, e.g. `Feature Importance Analysis (2)`
    pub fn labels(&self, explanations: &[Explanation]) -> Vec<(ExplanationKind, String)> {
        [ExplanationKind::FeatureImportance, ExplanationKind::InstanceExplanation]
            .into_iter()
            .map(|kind| {
                let count = explanations.iter().filter(|e| e.kind() == kind).count();
                (kind, format!("{} ({})", kind.title(), count))
            })
            .collect()
    }
}

fn render_list<T>(view: &ListView<T>, loading: &str, render_item: fn(&T) -> String) -> String {
    let items = |items: &[T]| items.iter().map(render_item).collect::<Vec<_>>().join("\n\n");

    match view {
        ListView::Loading => loading.to_string(),
        ListView::Failed(message) => format!("Error: {}", message),
        ListView::Empty(message) => message.to_string(),
        ListView::Ready(list) => items(&list[..]),
        ListView::Stale { items: list, error } => {
            format!("Error: {} (showing cached data)\n\n{}", error, items(&list[..]))
        }
    }
}

pub fn render_models(view: &ListView<Model>) -> String {
    render_list(view, "Loading models...", render_model)
}

fn render_model(model: &Model) -> String {
    let mut lines = vec![format!("{} [{}]", model.name, model.kind), format!("  id: {}", model.id)];
    if let Some(description) = &model.description {
        lines.push(format!("  {}", description));
    }
    if !model.features().is_empty() {
        lines.push(format!("  features: {}", model.features().join(", ")));
    }
    lines.push(format!("  Added {}", model.created_at.format("%Y-%m-%d")));
    lines.join("\n")
}

pub fn render_explanations(view: &ListView<Explanation>) -> String {
    render_list(view, "Loading explanations...", render_explanation)
}

pub fn render_explanation(explanation: &Explanation) -> String {
    let mut lines = vec![
        format!("{} ({})", explanation.kind().title(), explanation.id),
        format!("  model: {}", explanation.model_id),
    ];

    if let Some(chart) = FeatureChart::for_explanation(explanation).filter(|c| !c.is_empty()) {
        lines.extend(chart.render(CHART_COLUMNS).lines().map(|line| format!("  {}", line)));
    }

    if let Some(summary) = PredictionSummary::from_explanation(explanation) {
        lines.push(format!("  {}", summary.render()));
    }

    let input = explanation.result.input_data();
    if !input.is_empty() {
        let values: Vec<String> = input.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        lines.push(format!("  input: {}", values.join(", ")));
    }

    lines.push(format!(
        "  Generated on {}",
        explanation.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    lines.join("\n")
}
