use anyhow::Result;
use std::{net::SocketAddr, sync::Arc};
use verification_service::{
    api::{self, AppState},
    config::AppConfig,
    import::KeyLayout,
    metrics_server,
    observability,
    store,
    telemetry::{HttpTelemetryClient, TelemetryFetch, TelemetryPoller},
};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let store = store::connect(&cfg).await?;

    let tel_cfg = &cfg.telemetry;
    let live_client = HttpTelemetryClient::new(tel_cfg.sources.clone(), tel_cfg.request_timeout())?;
    tracing::info!(sources = ?live_client.sources(), "telemetry sources configured");
    let telemetry: Arc<dyn TelemetryFetch> = Arc::new(live_client);
    let import_source: Arc<dyn TelemetryFetch> = Arc::new(HttpTelemetryClient::new(
        vec![cfg.import.source_url.clone()],
        tel_cfg.request_timeout(),
    )?);

    let poller = Arc::new(TelemetryPoller::new(telemetry.clone(), tel_cfg.poll_interval()));
    let _poll_task = poller.clone().spawn();
    tracing::info!(interval_ms = tel_cfg.poll_interval_ms, "telemetry poller started");

    let state = AppState {
        store,
        telemetry,
        import_source,
        poller,
        import_layout: Arc::new(KeyLayout::from_config(&cfg.import)),
    };

    let addr: SocketAddr = cfg
        .http
        .bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid http.bind_addr: {e}"))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "verification service listening");

    axum::serve(listener, api::router(state).into_make_service()).await?;

    Ok(())
}
