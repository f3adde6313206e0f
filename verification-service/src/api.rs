//! JSON HTTP surface of the verification service.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use meter_client::domain::{MeterDetail, MeterDirectoryEntry, ParameterStatus};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tower_http::trace::TraceLayer;

use crate::{
    error::AppError,
    import::{create_record, import_snapshot, ImportSummary, KeyLayout, NewMeterRequest},
    reconcile::{self, ParameterPage, ParameterQuery},
    store::MeterStore,
    telemetry::{TelemetryFetch, TelemetryPoller, TelemetrySnapshot},
    update::{update_meter, UpdateOutcome, UpdateRequest, UpdatedFields},
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MeterStore>,
    /// Live sources behind `GET /telemetry`.
    pub telemetry: Arc<dyn TelemetryFetch>,
    /// Snapshot source used by the import job.
    pub import_source: Arc<dyn TelemetryFetch>,
    pub poller: Arc<TelemetryPoller>,
    pub import_layout: Arc<KeyLayout>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/meters", get(list_meters).post(create_meter))
        .route("/meters/filter", get(filter_meter))
        .route("/meters/import", post(import_meters))
        .route("/meters/:unique_key", get(get_meter))
        .route("/meters/:unique_key/view", get(meter_view))
        .route("/meters/:unique_key/status", patch(update_status))
        .route("/telemetry", get(telemetry_proxy))
        .route("/telemetry/latest", get(telemetry_latest))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

fn required_key(raw: &str) -> Result<&str, AppError> {
    let key = raw.trim();
    if key.is_empty() {
        return Err(AppError::validation("Unique key not provided"));
    }
    Ok(key)
}

/// Directory fields joined with the record. A record without a directory
/// entry falls back to its key as display name; a directory entry without a
/// record has no parameters yet.
async fn load_detail(store: &dyn MeterStore, unique_key: &str) -> Result<MeterDetail, AppError> {
    let entry = store.directory_entry(unique_key).await?;
    let record = store.record(unique_key).await?;
    if entry.is_none() && record.is_none() {
        return Err(AppError::not_found(format!("Meter {unique_key} not found")));
    }
    let entry = entry.unwrap_or_else(|| MeterDirectoryEntry::fallback(unique_key));
    Ok(MeterDetail::new(entry, record))
}

async fn list_meters(State(state): State<AppState>) -> Result<Json<Vec<MeterDirectoryEntry>>, AppError> {
    let meters = state.store.list_directory().await?;
    if meters.is_empty() {
        return Err(AppError::not_found("No meters found"));
    }
    Ok(Json(meters))
}

#[derive(Serialize)]
struct CreatedMeter {
    success: bool,
    meter: MeterDetail,
}

async fn create_meter(
    State(state): State<AppState>,
    body: Result<Json<NewMeterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatedMeter>), AppError> {
    let Json(req) = body.map_err(|e| AppError::validation(e.body_text()))?;
    let record = create_record(state.store.as_ref(), &req).await?;
    let entry = MeterDirectoryEntry {
        unique_key: record.unique_key.clone(),
        meter_name: record.meter_name.clone(),
        location: record.location.clone(),
    };
    let meter = MeterDetail::new(entry, Some(record));
    Ok((StatusCode::CREATED, Json(CreatedMeter { success: true, meter })))
}

async fn get_meter(State(state): State<AppState>, Path(unique_key): Path<String>) -> Result<Json<MeterDetail>, AppError> {
    let unique_key = required_key(&unique_key)?;
    Ok(Json(load_detail(state.store.as_ref(), unique_key).await?))
}

#[derive(Debug, Deserialize)]
struct FilterParams {
    unique_key: Option<String>,
    status: Option<String>,
}

#[derive(Serialize)]
struct FilterResponse {
    success: bool,
    meter: MeterDetail,
}

/// Comma-separated status list; every entry must be a known status.
fn parse_statuses(raw: &str) -> Result<Vec<ParameterStatus>, AppError> {
    let statuses = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<ParameterStatus>().map_err(|e| AppError::validation(e.to_string())))
        .collect::<Result<Vec<_>, _>>()?;
    if statuses.is_empty() {
        return Err(AppError::validation("status must list at least one value"));
    }
    Ok(statuses)
}

async fn filter_meter(
    State(state): State<AppState>,
    params: Result<Query<FilterParams>, QueryRejection>,
) -> Result<Json<FilterResponse>, AppError> {
    let Query(params) = params.map_err(|e| AppError::validation(e.body_text()))?;
    let (Some(unique_key), Some(status)) = (params.unique_key, params.status) else {
        return Err(AppError::validation(
            "Both status and unique_key query parameters are required",
        ));
    };
    let unique_key = required_key(&unique_key)?;
    let statuses = parse_statuses(&status)?;

    let record = state
        .store
        .record(unique_key)
        .await?
        .ok_or_else(|| AppError::not_found("Meter not found or no parameters matching status"))?;
    let entry = state
        .store
        .directory_entry(unique_key)
        .await?
        .unwrap_or_else(|| MeterDirectoryEntry::fallback(unique_key));

    let mut meter = MeterDetail::new(entry, Some(record));
    meter.parameters.retain(|p| statuses.contains(&p.status));
    if meter.parameters.is_empty() {
        return Err(AppError::not_found("Meter not found or no parameters matching status"));
    }

    Ok(Json(FilterResponse { success: true, meter }))
}

#[derive(Debug, Default, Deserialize)]
struct ViewParams {
    search: Option<String>,
    status: Option<String>,
    page: Option<usize>,
}

#[derive(Serialize)]
struct MeterViewResponse {
    meter_name: String,
    location: String,
    comment: String,
    #[serde(with = "time::serde::rfc3339::option")]
    last_fetched_at: Option<OffsetDateTime>,
    #[serde(flatten)]
    page: ParameterPage,
}

async fn meter_view(
    State(state): State<AppState>,
    Path(unique_key): Path<String>,
    params: Result<Query<ViewParams>, QueryRejection>,
) -> Result<Json<MeterViewResponse>, AppError> {
    let Query(params) = params.map_err(|e| AppError::validation(e.body_text()))?;
    let unique_key = required_key(&unique_key)?;

    let status = match params.status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(s) => Some(s.parse::<ParameterStatus>().map_err(|e| AppError::validation(e.to_string()))?),
    };
    let query = ParameterQuery {
        search: params.search.unwrap_or_default(),
        status,
    };

    let detail = load_detail(state.store.as_ref(), unique_key).await?;
    let telemetry = state.poller.state().await;
    let page = reconcile::build_page(
        unique_key,
        &detail.parameters,
        &query,
        params.page.unwrap_or(1),
        telemetry.snapshot(),
    );

    Ok(Json(MeterViewResponse {
        meter_name: detail.meter_name,
        location: detail.location,
        comment: detail.comment,
        last_fetched_at: telemetry.last_fetched_at,
        page,
    }))
}

#[derive(Debug, Serialize)]
struct UpdateResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated: Option<UpdatedFields>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
}

async fn update_status(
    State(state): State<AppState>,
    Path(unique_key): Path<String>,
    body: Result<Json<UpdateRequest>, JsonRejection>,
) -> Result<Json<UpdateResponse>, AppError> {
    let Json(req) = body.map_err(|e| AppError::validation(e.body_text()))?;

    let response = match update_meter(state.store.as_ref(), &unique_key, &req).await? {
        UpdateOutcome::Updated(fields) => UpdateResponse {
            success: true,
            updated: Some(fields),
            message: None,
        },
        UpdateOutcome::NothingToUpdate => UpdateResponse {
            success: false,
            updated: None,
            message: Some("Nothing to update"),
        },
    };
    Ok(Json(response))
}

async fn import_meters(State(state): State<AppState>) -> Result<(StatusCode, Json<ImportSummary>), AppError> {
    let snapshot = state.import_source.fetch().await?;
    let summary = import_snapshot(state.store.as_ref(), &snapshot, &state.import_layout).await?;
    tracing::info!(inserted = summary.inserted, updated = summary.updated, "meter import finished");
    Ok((StatusCode::CREATED, Json(summary)))
}

async fn telemetry_proxy(State(state): State<AppState>) -> Result<Json<TelemetrySnapshot>, AppError> {
    let snapshot = state.telemetry.fetch().await.map_err(AppError::Proxy)?;
    Ok(Json(snapshot))
}

#[derive(Serialize)]
struct TelemetryLatest {
    loading: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    last_fetched_at: Option<OffsetDateTime>,
    last_error: Option<String>,
    snapshot: Option<TelemetrySnapshot>,
}

async fn telemetry_latest(State(state): State<AppState>) -> Json<TelemetryLatest> {
    let current = state.poller.state().await;
    Json(TelemetryLatest {
        loading: current.is_loading(),
        last_fetched_at: current.last_fetched_at,
        last_error: current.last_error.clone(),
        snapshot: current.snapshot().cloned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::UpstreamError, store::InMemoryMeterStore};
    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request},
    };
    use meter_client::domain::MeterRecord;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    struct FixedTelemetry(Option<Value>);

    #[async_trait::async_trait]
    impl TelemetryFetch for FixedTelemetry {
        async fn fetch(&self) -> Result<TelemetrySnapshot, UpstreamError> {
            match &self.0 {
                Some(v) => Ok(serde_json::from_value(v.clone()).unwrap()),
                None => Err(UpstreamError::Status {
                    url: "http://telemetry/down".into(),
                    status: 503,
                }),
            }
        }
    }

    async fn seeded_store() -> Arc<InMemoryMeterStore> {
        let store = InMemoryMeterStore::with_directory([MeterDirectoryEntry {
            unique_key: "U1".into(),
            meter_name: "Main Incomer".into(),
            location: "Substation A".into(),
        }]);
        let mut record = MeterRecord::new(
            &MeterDirectoryEntry::fallback("U1"),
            ["paramA", "paramB"],
            OffsetDateTime::now_utc(),
        );
        record.parameters[0].status = ParameterStatus::Verified;
        store.insert_record(&record).await.unwrap();
        Arc::new(store)
    }

    fn app(store: Arc<InMemoryMeterStore>, telemetry: Option<Value>) -> (Router, Arc<TelemetryPoller>) {
        let fetcher: Arc<dyn TelemetryFetch> = Arc::new(FixedTelemetry(telemetry));
        let poller = Arc::new(TelemetryPoller::new(fetcher.clone(), Duration::from_secs(5)));
        let state = AppState {
            store,
            telemetry: fetcher.clone(),
            import_source: fetcher,
            poller: poller.clone(),
            import_layout: Arc::new(KeyLayout::new(1, ["Time", "timestamp", "UNIXtimestamp"])),
        };
        (router(state), poller)
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                builder = builder.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::String(String::from_utf8_lossy(&bytes).into()))
        };
        (status, value)
    }

    #[tokio::test]
    async fn list_meters_is_404_when_directory_empty() {
        let (app, _) = app(Arc::new(InMemoryMeterStore::new()), None);
        let (status, body) = send(&app, Method::GET, "/meters", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "No meters found");

        let (app, _) = app_with_seed().await;
        let (status, body) = send(&app, Method::GET, "/meters", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["meter_name"], "Main Incomer");
    }

    async fn app_with_seed() -> (Router, Arc<TelemetryPoller>) {
        app(seeded_store().await, Some(json!({"U1_paramA": 12.345})))
    }

    #[tokio::test]
    async fn get_meter_joins_directory_and_record() {
        let (app, _) = app_with_seed().await;
        let (status, body) = send(&app, Method::GET, "/meters/U1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["meter_name"], "Main Incomer");
        assert_eq!(body["location"], "Substation A");
        assert_eq!(body["parameters"][0]["paramName"], "paramA");
        assert_eq!(body["parameters"][1]["status"], "Not Verified");

        let (status, _) = send(&app, Method::GET, "/meters/U404", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn patch_then_get_reflects_new_status() {
        let (app, _) = app_with_seed().await;
        let (status, body) = send(
            &app,
            Method::PATCH,
            "/meters/U1/status",
            Some(json!({"paramName": "paramB", "newStatus": "Verified"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["updated"]["paramName"], "paramB");
        assert_eq!(body["updated"]["newStatus"], "Verified");
        let stamped = body["updated"]["updatedAt"].as_str().unwrap().to_string();

        let (_, meter) = send(&app, Method::GET, "/meters/U1", None).await;
        assert_eq!(meter["parameters"][1]["status"], "Verified");
        assert_eq!(meter["parameters"][1]["updatedAt"], stamped.as_str());

        let (status, body) = send(
            &app,
            Method::PATCH,
            "/meters/U1/status",
            Some(json!({"paramName": "paramB", "newStatus": "Verified"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": false, "message": "Nothing to update"}));
    }

    #[tokio::test]
    async fn patch_rejects_bad_bodies() {
        let (app, _) = app_with_seed().await;

        let (status, _) = send(&app, Method::PATCH, "/meters/U1/status", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            Method::PATCH,
            "/meters/U1/status",
            Some(json!({"paramName": "paramB", "newStatus": "Maybe"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            Method::PATCH,
            "/meters/U1/status",
            Some(json!({"paramName": "paramZ", "newStatus": "Verified"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, Method::PATCH, "/meters/U404/status", Some(json!({"comment": "x"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn empty_patch_on_unknown_meter_is_bad_request() {
        let (app, _) = app(Arc::new(InMemoryMeterStore::new()), None);
        let (status, body) = send(&app, Method::PATCH, "/meters/U404/status", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "paramName or comment must be provided");
    }

    #[tokio::test]
    async fn filter_by_status_set() {
        let (app, _) = app_with_seed().await;

        let (status, _) = send(&app, Method::GET, "/meters/filter?unique_key=U1", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&app, Method::GET, "/meters/filter?unique_key=U1&status=Verified,Not%20Sure", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["meter"]["parameters"].as_array().unwrap().len(), 1);

        let (status, _) = send(&app, Method::GET, "/meters/filter?unique_key=U1&status=Not%20Used", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, Method::GET, "/meters/filter?unique_key=U1&status=Done", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn view_binds_live_values_once_polled() {
        let (app, poller) = app_with_seed().await;

        let (_, body) = send(&app, Method::GET, "/meters/U1/view", None).await;
        assert_eq!(body["telemetry_loading"], true);
        assert_eq!(body["rows"][0]["display_value"], "Loading...");

        poller.poll_once().await;
        let (status, body) = send(&app, Method::GET, "/meters/U1/view?page=5", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["page"], 1);
        assert_eq!(body["meter_name"], "Main Incomer");
        assert_eq!(body["rows"][0]["display_value"], "12.35");
        assert_eq!(body["rows"][1]["display_value"], "N/A");
        assert!(body["last_fetched_at"].is_string());

        let (_, body) = send(&app, Method::GET, "/meters/U1/view?status=Verified&search=PARAM", None).await;
        assert_eq!(body["filtered"], 1);
        assert_eq!(body["total"], 2);
    }

    #[tokio::test]
    async fn import_creates_records_from_snapshot() {
        let store = Arc::new(InMemoryMeterStore::new());
        let (app, _) = app(store.clone(), Some(json!({"Time": "10:00", "U7_KW": 1.0, "U7_PF": 0.9})));

        let (status, body) = send(&app, Method::POST, "/meters/import", None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, json!({"inserted": 1, "updated": 0}));
        assert_eq!(store.record("U7").await.unwrap().unwrap().parameters.len(), 2);
    }

    #[tokio::test]
    async fn upstream_failures_map_to_gateway_and_proxy_errors() {
        let (app, _) = app(Arc::new(InMemoryMeterStore::new()), None);

        let (status, _) = send(&app, Method::POST, "/meters/import", None).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let (status, body) = send(&app, Method::GET, "/telemetry", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("503"));

        let (status, body) = send(&app, Method::GET, "/telemetry/latest", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["loading"], true);
    }

    #[tokio::test]
    async fn create_meter_then_conflict() {
        let (app, _) = app_with_seed().await;
        let body = json!({"unique_key": "U2", "parameters": ["KW", "PF"]});

        let (status, created) = send(&app, Method::POST, "/meters", Some(body.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["meter"]["parameters"][1]["status"], "Not Verified");

        let (status, _) = send(&app, Method::POST, "/meters", Some(body)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(&app, Method::POST, "/meters", Some(json!({"unique_key": "U3"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn telemetry_proxy_returns_flat_map() {
        let (app, _) = app_with_seed().await;
        let (status, body) = send(&app, Method::GET, "/telemetry", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"U1_paramA": 12.345}));
    }
}
