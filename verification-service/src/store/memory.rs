use std::collections::BTreeMap;

use meter_client::domain::{MeterDirectoryEntry, MeterRecord};
use tokio::sync::RwLock;

use super::MeterStore;
use crate::error::StoreError;

/// Non-durable store for tests and `kind = "memory"` development runs.
#[derive(Default)]
pub struct InMemoryMeterStore {
    directory: RwLock<BTreeMap<String, MeterDirectoryEntry>>,
    records: RwLock<BTreeMap<String, MeterRecord>>,
}

impl InMemoryMeterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_directory<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = MeterDirectoryEntry>,
    {
        let directory = entries
            .into_iter()
            .map(|e| (e.unique_key.clone(), e))
            .collect();
        Self {
            directory: RwLock::new(directory),
            records: RwLock::new(BTreeMap::new()),
        }
    }
}

#[async_trait::async_trait]
impl MeterStore for InMemoryMeterStore {
    async fn list_directory(&self) -> Result<Vec<MeterDirectoryEntry>, StoreError> {
        Ok(self.directory.read().await.values().cloned().collect())
    }

    async fn directory_entry(&self, unique_key: &str) -> Result<Option<MeterDirectoryEntry>, StoreError> {
        Ok(self.directory.read().await.get(unique_key).cloned())
    }

    async fn upsert_directory_entry(&self, entry: &MeterDirectoryEntry) -> Result<(), StoreError> {
        self.directory
            .write()
            .await
            .insert(entry.unique_key.clone(), entry.clone());
        Ok(())
    }

    async fn record(&self, unique_key: &str) -> Result<Option<MeterRecord>, StoreError> {
        Ok(self.records.read().await.get(unique_key).cloned())
    }

    async fn insert_record(&self, record: &MeterRecord) -> Result<bool, StoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.unique_key) {
            return Ok(false);
        }
        records.insert(record.unique_key.clone(), record.clone());
        Ok(true)
    }

    async fn save_record(&self, record: &MeterRecord) -> Result<bool, StoreError> {
        let mut records = self.records.write().await;
        match records.get_mut(&record.unique_key) {
            Some(existing) => {
                existing.parameters = record.parameters.clone();
                existing.comment = record.comment.clone();
                existing.updated_at = record.updated_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[tokio::test]
    async fn insert_is_create_only_and_save_replaces_state() {
        let store = InMemoryMeterStore::new();
        let now = datetime!(2025-08-16 10:00:00 UTC);
        let mut record = MeterRecord::new(&MeterDirectoryEntry::fallback("U1"), ["A"], now);

        assert!(store.insert_record(&record).await.unwrap());
        assert!(!store.insert_record(&record).await.unwrap());

        record.comment = "checked on site".into();
        assert!(store.save_record(&record).await.unwrap());
        let loaded = store.record("U1").await.unwrap().unwrap();
        assert_eq!(loaded.comment, "checked on site");

        let missing = MeterRecord::new(&MeterDirectoryEntry::fallback("U2"), ["A"], now);
        assert!(!store.save_record(&missing).await.unwrap());
    }
}
