use anyhow::Result;
use clap::{Parser, Subcommand};
use snowcell_core::telemetry::{self, LogFormat};
use snowcell_core::{
    accumulate, AcceptAny, Account, ChatMessage, Dispatcher, ModelCatalog, ProviderKind, Settings,
};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::runtime::Runtime;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "xtask", version, about = "Automation helpers for SnowCell")]
struct Cli {
    /// Log output format: `pretty` or `json`.
    #[arg(long, default_value = "pretty", global = true)]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Log in, select a model and dispatch through the mock provider.
    Smoke {
        #[arg(long, default_value = "qwen")]
        model: String,
    },
    /// Print the model catalog.
    Models,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    telemetry::init_tracing(filter, LogFormat::parse(&cli.log_format)?)?;

    match cli.command {
        Commands::Smoke { model } => smoke_test(&model),
        Commands::Models => {
            list_models();
            Ok(())
        }
    }
}

fn smoke_test(model: &str) -> Result<()> {
    let runtime = Runtime::new()?;
    let temp_dir = TempDir::new()?;
    let settings = Settings::load()?
        .with_provider(ProviderKind::Mock)
        .with_state_dir(temp_dir.path());
    let dispatcher = Dispatcher::from_settings(&settings)?;
    let account = Account::new(Arc::new(AcceptAny), dispatcher.selections().clone());

    let session = account.login("smoke", "smoke-token")?;
    info!(subject = %session.subject, expires_at = %session.expires_at, "logged in");
    let selection = dispatcher.selections().select(model)?;
    info!(key = %selection.key, name = %selection.name, "model selected");

    let messages = vec![ChatMessage::user("ping from xtask")];
    let namespaced = format!("{}:{}", settings.namespace, selection.key);

    let complete = runtime
        .block_on(dispatcher.dispatch(&namespaced, messages.clone(), settings.defaults, false))?
        .into_result()
        .ok_or_else(|| anyhow::anyhow!("expected a complete result"))?;
    info!(
        id = %complete.id,
        "total_tokens" = complete.usage.total_tokens,
        "complete dispatch ok"
    );

    let streamed = runtime.block_on(async {
        let chunks = dispatcher
            .dispatch(&namespaced, messages, settings.defaults, true)
            .await?
            .into_stream()
            .ok_or_else(|| anyhow::anyhow!("expected a chunk stream"))?;
        anyhow::Ok(accumulate(chunks).await?)
    })?;
    anyhow::ensure!(
        streamed == complete.content(),
        "streamed text differs from complete text"
    );
    info!("chars" = streamed.len(), "streaming dispatch ok");

    account.logout()?;
    Ok(())
}

fn list_models() {
    for model in ModelCatalog::builtin().list() {
        println!("{:<8} {:<32} {}", model.key, model.name, model.description);
    }
}
