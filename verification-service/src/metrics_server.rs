use std::net::SocketAddr;

use axum::{http::StatusCode, routing::get, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static PROM_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder and serve `/metrics` on its own listener.
/// Fails without spawning anything on a bad address or a second install.
pub fn init(bind_addr: &str) -> anyhow::Result<()> {
    let addr: SocketAddr = bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid metrics.bind_addr {bind_addr}: {e}"))?;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("metrics recorder already installed or unavailable: {e}"))?;
    if PROM_HANDLE.set(handle).is_err() {
        anyhow::bail!("metrics server initialised twice");
    }

    tokio::spawn(serve(addr));
    Ok(())
}

async fn serve(addr: SocketAddr) {
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "metrics listener bind failed, /metrics disabled");
            return;
        }
    };
    tracing::info!(%addr, "serving /metrics");
    if let Err(e) = axum::serve(listener, router().into_make_service()).await {
        tracing::error!(error = %e, "metrics server stopped");
    }
}

fn router() -> Router {
    Router::new().route("/metrics", get(render))
}

/// Prometheus text exposition, or 503 while no recorder is installed.
async fn render() -> Result<String, (StatusCode, &'static str)> {
    PROM_HANDLE
        .get()
        .map(PrometheusHandle::render)
        .ok_or((StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    #[tokio::test]
    async fn metrics_without_recorder_is_unavailable() {
        let response = router()
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn rejects_bad_bind_addr_before_installing() {
        let err = init("not-an-address").unwrap_err();
        assert!(err.to_string().contains("metrics.bind_addr"));
        assert!(PROM_HANDLE.get().is_none());
    }
}
