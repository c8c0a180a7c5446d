use std::path::Path;
use std::sync::Arc;

use crawlspace::api::{self, AppState};
use crawlspace::cli::Cli;
use crawlspace::logging;
use crawlspace::registry::JobRegistry;
use crawlspace::search::SearchEngine;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse_args();

    logging::init(Path::new(&cli.data_dir).join("logs"))?;

    // a registry that cannot load its state aborts the process
    let registry = JobRegistry::open(&cli.data_dir)?;
    let reconciled = registry.mark_interrupted_on_start()?;
    if reconciled > 0 {
        tracing::info!("{reconciled} crawl(s) from a previous run marked interrupted");
    }

    let search = Arc::new(SearchEngine::new(registry.layout().storage_dir()));
    let app = api::build_router(AppState { registry, search });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", cli.port)).await?;
    tracing::info!("control API listening on port {}", cli.port);
    axum::serve(listener, app).await?;

    Ok(())
}
