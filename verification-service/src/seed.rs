//! Directory seeding from CSV.
//!
//! Expected header columns (by name):
//! - unique_key
//! - meter_name (optional, defaults to the key)
//! - location (optional, defaults to "Not Available")

use std::io::Read;

use anyhow::{anyhow, Context, Result};
use csv::StringRecord;
use meter_client::domain::{meter_directory::UNKNOWN_LOCATION, MeterDirectoryEntry};

use crate::store::MeterStore;

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

fn record_to_entry(record: &StringRecord, headers: &StringRecord, line: u64) -> Result<Option<MeterDirectoryEntry>> {
    let get = |name: &str| headers.iter().position(|h| h.trim() == name).and_then(|idx| record.get(idx));

    let Some(unique_key) = non_empty(get("unique_key")) else {
        if record.iter().all(|f| f.trim().is_empty()) {
            return Ok(None);
        }
        return Err(anyhow!("line {line}: unique_key is empty"));
    };

    Ok(Some(MeterDirectoryEntry {
        meter_name: non_empty(get("meter_name")).unwrap_or_else(|| unique_key.clone()),
        location: non_empty(get("location")).unwrap_or_else(|| UNKNOWN_LOCATION.to_string()),
        unique_key,
    }))
}

pub fn parse_directory_csv<R: Read>(reader: R) -> Result<Vec<MeterDirectoryEntry>> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = rdr.headers().context("reading CSV header")?.clone();
    if !headers.iter().any(|h| h.trim() == "unique_key") {
        return Err(anyhow!("CSV header must contain a unique_key column"));
    }

    let mut entries = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        // Header is line 1.
        let line = i as u64 + 2;
        let record = record.with_context(|| format!("reading CSV line {line}"))?;
        if let Some(entry) = record_to_entry(&record, &headers, line)? {
            entries.push(entry);
        }
    }
    Ok(entries)
}

/// Upsert every entry; returns how many were written.
pub async fn seed_directory(store: &dyn MeterStore, entries: &[MeterDirectoryEntry]) -> Result<usize> {
    for entry in entries {
        store.upsert_directory_entry(entry).await?;
    }
    tracing::info!(count = entries.len(), "seeded meter directory");
    Ok(entries.len())
}
