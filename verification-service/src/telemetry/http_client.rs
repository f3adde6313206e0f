use std::time::Duration;

use futures::future::try_join_all;
use serde_json::{Map, Value};

use super::{TelemetryFetch, TelemetrySnapshot};
use crate::error::UpstreamError;

/// Fetches snapshots from one or more HTTP endpoints that each return a flat
/// JSON object. All sources are requested concurrently and merged in the
/// configured order, so later sources override earlier ones on shared keys.
pub struct HttpTelemetryClient {
    client: reqwest::Client,
    sources: Vec<String>,
}

impl HttpTelemetryClient {
    pub fn new(sources: Vec<String>, timeout: Duration) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UpstreamError::Request {
                url: sources.join(","),
                message: e.to_string(),
            })?;

        Ok(Self { client, sources })
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    async fn fetch_one(&self, url: &str) -> Result<TelemetrySnapshot, UpstreamError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| UpstreamError::Request {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body: Value = response.json().await.map_err(|e| UpstreamError::Body {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        match body {
            Value::Object(values) => Ok(TelemetrySnapshot::new(values)),
            other => Err(UpstreamError::Body {
                url: url.to_string(),
                message: format!("expected a JSON object, got {}", json_kind(&other)),
            }),
        }
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[async_trait::async_trait]
impl TelemetryFetch for HttpTelemetryClient {
    async fn fetch(&self) -> Result<TelemetrySnapshot, UpstreamError> {
        let parts = try_join_all(self.sources.iter().map(|url| self.fetch_one(url))).await?;

        let mut merged = TelemetrySnapshot::new(Map::new());
        for part in parts {
            merged.merge(part);
        }

        tracing::debug!(sources = self.sources.len(), keys = merged.len(), "telemetry snapshot fetched");
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Json, Router};
    use serde_json::json;

    async fn spawn_upstream() -> String {
        let app = Router::new()
            .route("/first", get(|| async { Json(json!({"U1_KW": 1.5, "U1_PF": 0.9})) }))
            .route("/second", get(|| async { Json(json!({"U1_PF": 0.95, "U2_KW": 7})) }))
            .route("/array", get(|| async { Json(json!([1, 2, 3])) }))
            .route("/down", get(|| async { StatusCode::SERVICE_UNAVAILABLE }));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service()).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client(base: &str, paths: &[&str]) -> HttpTelemetryClient {
        let sources = paths.iter().map(|p| format!("{base}{p}")).collect();
        HttpTelemetryClient::new(sources, Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn merges_sources_in_order() {
        let base = spawn_upstream().await;
        let client = client(&base, &["/first", "/second"]);
        assert_eq!(client.sources(), [format!("{base}/first"), format!("{base}/second")]);
        let snapshot = client.fetch().await.unwrap();

        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.number("U1_KW"), Some(1.5));
        assert_eq!(snapshot.number("U1_PF"), Some(0.95));
        assert_eq!(snapshot.number("U2_KW"), Some(7.0));
    }

    #[tokio::test]
    async fn any_failing_source_fails_the_fetch() {
        let base = spawn_upstream().await;
        let err = client(&base, &["/first", "/down"]).fetch().await.unwrap_err();
        assert!(matches!(err, UpstreamError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn non_object_body_is_rejected() {
        let base = spawn_upstream().await;
        let err = client(&base, &["/array"]).fetch().await.unwrap_err();
        assert!(matches!(err, UpstreamError::Body { .. }));
    }
}
