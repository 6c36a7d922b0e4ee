mod app;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;

use studio_data::{PipelineTag, Store, StoreAction};
use studio_inference::{select_input_mode, UserInput};

#[derive(Parser, Debug)]
#[command(name = "studio")]
#[command(about = "Run models hosted by a local inference backend")]
#[command(version)]
struct Cli {
    /// Backend base URL, saved as the new default (defaults to the saved preference)
    #[arg(long, global = true, env = "STUDIO_BACKEND_URL")]
    backend: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the models in the backend library
    Models,
    /// Load a model into the backend
    Load { model_id: String },
    /// Unload a model from the backend
    Unload { model_id: String },
    /// Replace a model's configuration with a JSON object
    Configure { model_id: String, config: String },
    /// Show which input a pipeline tag uses
    Modes { tag: String },
    /// Run one inference against a model
    Run {
        model_id: String,
        /// Text input, or comma-separated labels for zero-shot detection
        #[arg(long)]
        text: Option<String>,
        /// Image or video input
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    log::info!("Starting studio");

    let mut store = Store::load();
    if let Some(url) = cli.backend {
        log::info!("Using backend {}", url);
        store.handle_action(&StoreAction::SetBackendUrl(url));
    }

    match cli.command {
        Command::Models => {
            store.refresh_models()?;
            if store.models.is_empty() {
                println!("No models in the library.");
            }
            for model in &store.models {
                println!(
                    "{:<40} {:<28} {}",
                    model.model_id,
                    model.pipeline_tag.label(),
                    model.status_label()
                );
            }
        }
        Command::Load { model_id } => {
            store.refresh_models()?;
            store.load_model(&model_id)?;
            println!("{} loaded", model_id);
        }
        Command::Unload { model_id } => {
            store.refresh_models()?;
            store.unload_model(&model_id)?;
            println!("{} unloaded", model_id);
        }
        Command::Configure { model_id, config } => {
            let value: Value = serde_json::from_str(&config).context("configuration is not valid JSON")?;
            let Value::Object(config) = value else {
                bail!("configuration must be a JSON object");
            };
            store.refresh_models()?;
            store.configure_model(&model_id, config)?;
            println!("{} configured", model_id);
        }
        Command::Modes { tag } => {
            let tag = PipelineTag::parse(&tag);
            let descriptor = select_input_mode(&tag);
            println!("{}: {:#?}", tag.label(), descriptor);
        }
        Command::Run { model_id, text, file } => {
            store.refresh_models()?;
            let model = store
                .get_model(&model_id)
                .cloned()
                .with_context(|| format!("model '{}' is not in the library", model_id))?;
            if !model.is_online {
                log::warn!("{} is not loaded; the backend may reject the request", model_id);
            }
            store.handle_action(&StoreAction::SelectModel(Some(model_id)));

            let input = UserInput {
                text: text.unwrap_or_default(),
                file_path: file,
            };
            app::run(&store, model, input)?;
        }
    }

    Ok(())
}
