use serde::{Deserialize, Serialize};

/// Location recorded for meters that have no directory entry.
pub const UNKNOWN_LOCATION: &str = "Not Available";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MeterDirectoryEntry {
    pub unique_key: String,
    pub meter_name: String,
    pub location: String,
}

impl MeterDirectoryEntry {
    /// Entry used when a record references a key the directory does not know.
    pub fn fallback(unique_key: &str) -> Self {
        Self {
            unique_key: unique_key.to_string(),
            meter_name: unique_key.to_string(),
            location: UNKNOWN_LOCATION.to_string(),
        }
    }
}
