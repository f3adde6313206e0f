//! Document store seam: directory entries plus per-meter records.
//!
//! Records are read whole, mutated in memory and written back whole. There is
//! no versioning, so two concurrent writers to the same record race and the
//! last write wins.

use std::sync::Arc;

use meter_client::domain::{MeterDirectoryEntry, MeterRecord};
use sqlx::postgres::PgPoolOptions;

use crate::{
    config::{AppConfig, StoreKind},
    error::StoreError,
};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryMeterStore;
pub use postgres::PgMeterStore;

#[async_trait::async_trait]
pub trait MeterStore: Send + Sync {
    async fn list_directory(&self) -> Result<Vec<MeterDirectoryEntry>, StoreError>;

    async fn directory_entry(&self, unique_key: &str) -> Result<Option<MeterDirectoryEntry>, StoreError>;

    async fn upsert_directory_entry(&self, entry: &MeterDirectoryEntry) -> Result<(), StoreError>;

    async fn record(&self, unique_key: &str) -> Result<Option<MeterRecord>, StoreError>;

    /// Returns `false` when a record already exists for the key.
    async fn insert_record(&self, record: &MeterRecord) -> Result<bool, StoreError>;

    /// Returns `false` when no record exists for the key.
    async fn save_record(&self, record: &MeterRecord) -> Result<bool, StoreError>;
}

/// Build the store selected by `store.kind`.
pub async fn connect(cfg: &AppConfig) -> anyhow::Result<Arc<dyn MeterStore>> {
    match cfg.store.kind {
        StoreKind::Postgres => {
            let db = cfg.database()?;
            let pool = PgPoolOptions::new()
                .max_connections(db.max_connections)
                .connect(&db.uri)
                .await?;
            tracing::info!(max_connections = db.max_connections, "connected to postgres meter store");
            Ok(Arc::new(PgMeterStore::new(pool)))
        }
        StoreKind::Memory => {
            tracing::warn!("using in-memory meter store; records are lost on restart");
            Ok(Arc::new(InMemoryMeterStore::new()))
        }
    }
}
