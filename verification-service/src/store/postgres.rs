use meter_client::{
    db::meter_queries,
    domain::{MeterDirectoryEntry, MeterRecord},
};
use sqlx::postgres::PgPool;

use super::MeterStore;
use crate::error::StoreError;

pub struct PgMeterStore {
    pool: PgPool,
}

impl PgMeterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl MeterStore for PgMeterStore {
    async fn list_directory(&self) -> Result<Vec<MeterDirectoryEntry>, StoreError> {
        Ok(meter_queries::list_directory(&self.pool).await?)
    }

    async fn directory_entry(&self, unique_key: &str) -> Result<Option<MeterDirectoryEntry>, StoreError> {
        Ok(meter_queries::directory_entry(&self.pool, unique_key).await?)
    }

    async fn upsert_directory_entry(&self, entry: &MeterDirectoryEntry) -> Result<(), StoreError> {
        Ok(meter_queries::upsert_directory_entry(&self.pool, entry).await?)
    }

    async fn record(&self, unique_key: &str) -> Result<Option<MeterRecord>, StoreError> {
        Ok(meter_queries::meter_record(&self.pool, unique_key).await?)
    }

    async fn insert_record(&self, record: &MeterRecord) -> Result<bool, StoreError> {
        Ok(meter_queries::insert_meter_record(&self.pool, record).await?)
    }

    async fn save_record(&self, record: &MeterRecord) -> Result<bool, StoreError> {
        Ok(meter_queries::save_meter_record(&self.pool, record).await?)
    }
}
