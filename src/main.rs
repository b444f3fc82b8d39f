//! Explainify CLI
//!
//! Terminal front end over the explanation service: list and upload models,
//! list and generate explanations.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use explainify::constants::{APP_NAME, APP_VERSION};
use explainify::view::{self, ExplanationForm, ExplanationTabs, StageOutcome, UploadPanel};
use explainify::{
    ApiClient, ApiContract, ClientConfig, ExplainApi, ExplanationFilter, ExplanationKind, ExplanationsHandle,
    ModelUpload, ModelsHandle, QueryClient,
};

#[derive(Parser, Debug)]
#[command(name = "explainify", version, about = "Browse models and request explanations of their outputs")]
struct Cli {
    /// API base URL (overrides EXPLAINIFY_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Server contract: v1 or legacy (overrides EXPLAINIFY_API_CONTRACT)
    #[arg(long, global = true)]
    contract: Option<ApiContract>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List uploaded models
    Models,

    /// Upload a model file (.pkl or .h5)
    Upload {
        path: PathBuf,

        /// Upload even if the extension is not a known model format
        #[arg(long)]
        force: bool,
    },

    /// List explanations, optionally for one model
    Explanations {
        #[arg(long)]
        model: Option<String>,

        /// Only show one kind (feature-importance or instance)
        #[arg(long)]
        kind: Option<ExplanationKind>,
    },

    /// Generate an explanation for a model
    Explain {
        model_id: String,

        #[arg(long, default_value = "feature-importance")]
        kind: ExplanationKind,

        /// Input data as a JSON object, e.g. '{"a": 1.0}'
        #[arg(long, conflicts_with = "set")]
        input: Option<String>,

        /// One feature value, repeatable
        #[arg(long = "set", value_name = "NAME=VALUE")]
        set: Vec<String>,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    let config = build_config(cli.api_url, cli.contract);
    log::info!(
        "{} v{} -> {} (contract {})",
        APP_NAME,
        APP_VERSION,
        config.base_url,
        config.contract
    );

    let api: Arc<dyn ExplainApi> = Arc::new(ApiClient::new(config)?);
    let client = QueryClient::new();

    match cli.command {
        Command::Models => {
            let models = ModelsHandle::new(&client, api);
            models.load().await.context("Failed to load models")?;
            println!("{}", view::render_models(&view::models_view(&models.state())));
        }

        Command::Upload { path, force } => {
            let file = ModelUpload::from_path(&path)?;
            let mut panel = UploadPanel::new();

            if let StageOutcome::Rejected { .. } = panel.stage(file.clone()) {
                if !force {
                    bail!(
                        "{} does not look like a model file. {} (use --force to upload anyway)",
                        file.file_name,
                        view::upload::hint()
                    );
                }
                log::warn!("Uploading {} anyway", file.file_name);
                panel.force_stage(file);
            }

            let models = ModelsHandle::new(&client, api);
            let model = panel.submit(&models).await.context("Upload failed")?;
            println!("Uploaded {} (id {})", model.name, model.id);

            let all = models.load().await.context("Failed to refresh models")?;
            println!("{} model(s) available", all.len());
        }

        Command::Explanations { model, kind } => {
            let filter = model.map_or(ExplanationFilter::All, ExplanationFilter::Model);
            let explanations = ExplanationsHandle::new(&client, api, filter);
            explanations.load().await.context("Failed to load explanations")?;

            let list = view::explanations_view(&explanations.state());
            let list = match kind {
                Some(kind) => ExplanationTabs::new(kind).apply(list),
                None => list,
            };
            println!("{}", view::render_explanations(&list));
        }

        Command::Explain {
            model_id,
            kind,
            input,
            set,
        } => {
            let models = ModelsHandle::new(&client, Arc::clone(&api));
            let mut form = ExplanationForm::new();
            match models.find(&model_id).await.context("Failed to load models")? {
                Some(model) => form.select_model(&model),
                None => {
                    log::warn!("Model {} is not in the model list", model_id);
                    form.select_model_id(model_id.as_str());
                }
            }

            form.set_kind(kind);
            if let Some(json) = input {
                form.set_json(json);
            }
            for assignment in &set {
                form.set_assignment(assignment)?;
            }
            let request = form.build()?;

            let explanations = ExplanationsHandle::new(&client, api, ExplanationFilter::Model(model_id));
            let before = explanations.load().await.context("Failed to load explanations")?;
            log::debug!("{} explanation(s) before generating", before.len());

            let created = explanations.generate(request).await.context("Failed to generate explanation")?;
            let listed = explanations.load().await.context("Failed to reload explanations")?;
            let shown = listed.iter().find(|e| e.id == created.id).unwrap_or(created.as_ref());
            println!("{}", view::render_explanation(shown));
        }
    }

    Ok(())
}

fn build_config(api_url: Option<String>, contract: Option<ApiContract>) -> ClientConfig {
    let from_env = ClientConfig::from_env();

    let mut config = match api_url {
        Some(url) => ClientConfig {
            timeout: from_env.timeout,
            contract: from_env.contract,
            ..ClientConfig::new(url)
        },
        None => from_env,
    };

    if let Some(contract) = contract {
        config = config.with_contract(contract);
    }
    config
}
