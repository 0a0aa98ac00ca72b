use anyhow::Context;
use app::config::{Cli, Command};
use app::seed::seed_demo_course;
use app::{AppState, serve};
use clap::Parser;
use progress_core::completion::CompletionPolicy;
use progress_core::model::UserId;
use services::{AppServices, Clock};
use tracing_subscriber::EnvFilter;

/// Create the parent directory of a file-backed database so `mode=rwc` can create the file.
fn prepare_sqlite_file(db_url: &str) -> anyhow::Result<()> {
    let Some(path) = db_url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        anyhow::bail!("invalid database url: {db_url}");
    }
    if let Some(parent) = std::path::Path::new(path).parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating database directory {}", parent.display()))?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let settings = cli.settings;
    let policy = CompletionPolicy::new(settings.completion_threshold)?;

    let db_url = settings.database_url();
    prepare_sqlite_file(&db_url)?;
    let services = AppServices::new_sqlite(&db_url, Clock::System, policy)
        .await
        .with_context(|| format!("opening database {db_url}"))?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(AppState::new(services), settings.bind).await?,
        Command::Seed { user_id } => seed_demo_course(&services, UserId::new(user_id)).await?,
    }
    Ok(())
}
