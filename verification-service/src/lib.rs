pub mod api;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod import;
pub mod metrics_server;
pub mod observability;
pub mod reconcile;
pub mod seed;
pub mod store;
pub mod telemetry;
pub mod update;

pub use api::{router, AppState};
pub use error::{AppError, StoreError, UpstreamError};
