use anyhow::Result;
use verification_service::{
    config::AppConfig,
    import::{import_snapshot, KeyLayout},
    observability,
    store,
    telemetry::{HttpTelemetryClient, TelemetryFetch},
};

/// One-shot import: fetch the configured snapshot and create or extend meter
/// records from it.
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    // VERIFICATION_CONFIG can point at a tool-specific file.
    let cfg = AppConfig::load()?;
    let store = store::connect(&cfg).await?;

    let source = HttpTelemetryClient::new(vec![cfg.import.source_url.clone()], cfg.telemetry.request_timeout())?;
    let snapshot = source.fetch().await?;
    tracing::info!(keys = snapshot.len(), url = %cfg.import.source_url, "fetched import snapshot");

    let layout = KeyLayout::from_config(&cfg.import);
    let summary = import_snapshot(store.as_ref(), &snapshot, &layout).await?;

    println!("inserted={} updated={}", summary.inserted, summary.updated);
    Ok(())
}
