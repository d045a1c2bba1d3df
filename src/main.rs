#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use mediatag_rs::collab::{HttpMediaLibrary, HttpTranscriptSource, HttpVisionModel};
use mediatag_rs::config::SETTINGS;
use mediatag_rs::pipeline::{BatchAnalyzer, ConcurrencyGate, Janitor, Orchestrator};
use mediatag_rs::store::MemoryTaskStore;
use mediatag_rs::utils::logger;
use mediatag_rs::{web, AppContext};

#[tokio::main]
async fn main() -> Result<()> {
    mediatag_rs::init_env();
    let _guard = logger::init("./logs".to_string())?;

    info!("Starting media tagging service...");
    let settings = SETTINGS.clone();

    info!("Initializing collaborators...");
    let media = Arc::new(HttpMediaLibrary::new(&settings));
    let transcripts = Arc::new(HttpTranscriptSource::new());
    let model = Arc::new(HttpVisionModel::new(&settings));

    info!("Initializing task store and concurrency gate...");
    let store = Arc::new(MemoryTaskStore::new());
    let gate = Arc::new(ConcurrencyGate::new(
        settings.max_extraction_concurrent,
        settings.max_analysis_concurrent,
    ));

    let analyzer = BatchAnalyzer::new(model, &settings);
    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        gate,
        media,
        transcripts,
        analyzer,
        settings.clone(),
    ));

    info!("Starting janitor...");
    let janitor = Arc::new(Janitor::new(store, settings.clone()));
    let janitor_handle = janitor.start();

    let ctx = Arc::new(AppContext {
        orchestrator,
        janitor: janitor.clone(),
    });

    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port).parse()?;
    info!("Starting HTTP server at http://{}", addr);

    match web::start_server(ctx, addr).await {
        Ok(_) => info!("Server stopped gracefully"),
        Err(e) => {
            tracing::error!("Server error: {}", e);
            janitor.stop();
            return Err(e);
        }
    }

    info!("Shutting down...");
    janitor.stop();
    let _ = janitor_handle.await;

    Ok(())
}
