//! Bootstrap meter records from a raw telemetry snapshot.
//!
//! Snapshot keys look like `<unique_key>_<param_name>`. Each distinct meter
//! becomes a record; re-running the import only ever appends parameters.

use std::collections::{BTreeMap, HashSet};

use meter_client::domain::{MeterDirectoryEntry, MeterRecord};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    config::ImportConfig,
    error::{AppError, StoreError},
    store::MeterStore,
    telemetry::TelemetrySnapshot,
};

/// How snapshot keys split into meter key and parameter name.
#[derive(Debug, Clone)]
pub struct KeyLayout {
    /// Segments forming the meter key when no directory key matches.
    default_segments: usize,
    pub skip_keys: HashSet<String>,
    /// Known directory keys, longest first.
    known_keys: Vec<String>,
}

impl KeyLayout {
    pub fn new<I, S>(default_segments: usize, skip_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            default_segments: default_segments.max(1),
            skip_keys: skip_keys.into_iter().map(Into::into).collect(),
            known_keys: Vec::new(),
        }
    }

    pub fn from_config(cfg: &ImportConfig) -> Self {
        Self::new(cfg.key_segments, cfg.skip_keys.iter().cloned())
    }

    /// Directory keys let multi-segment identifiers such as
    /// `USG_DP1_PS1_MRCZ1_PSL` win over the fixed segment count.
    pub fn with_known_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_keys = keys.into_iter().map(Into::into).collect();
        self.known_keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        self
    }

    /// Split a snapshot key into `(unique_key, param_name)`.
    pub fn split<'a>(&self, key: &'a str) -> Option<(&'a str, &'a str)> {
        if self.skip_keys.contains(key) {
            return None;
        }

        for known in &self.known_keys {
            if let Some(rest) = key.strip_prefix(known.as_str()).and_then(|r| r.strip_prefix('_')) {
                if !rest.is_empty() {
                    return Some((&key[..known.len()], rest));
                }
            }
        }

        let (split_at, _) = key.match_indices('_').nth(self.default_segments.checked_sub(1)?)?;
        let (meter, param) = (&key[..split_at], &key[split_at + 1..]);
        if meter.is_empty() || param.is_empty() {
            return None;
        }
        Some((meter, param))
    }
}

/// Meter key → parameter names, each list in first-seen order.
pub fn discover_meters(snapshot: &TelemetrySnapshot, layout: &KeyLayout) -> BTreeMap<String, Vec<String>> {
    let mut meters: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for key in snapshot.keys() {
        let Some((meter, param)) = layout.split(key) else {
            tracing::trace!(key, "skipping non-parameter telemetry key");
            continue;
        };
        let params = meters.entry(meter.to_string()).or_default();
        if !params.iter().any(|p| p == param) {
            params.push(param.to_string());
        }
    }
    meters
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub inserted: usize,
    pub updated: usize,
}

/// Create missing records and append unseen parameters to existing ones.
/// Existing parameters and their statuses are never modified or removed.
pub async fn import_snapshot(
    store: &dyn MeterStore,
    snapshot: &TelemetrySnapshot,
    layout: &KeyLayout,
) -> Result<ImportSummary, StoreError> {
    let directory = store.list_directory().await?;
    let layout = layout
        .clone()
        .with_known_keys(directory.iter().map(|e| e.unique_key.clone()));
    let directory: BTreeMap<_, _> = directory.into_iter().map(|e| (e.unique_key.clone(), e)).collect();

    let now = OffsetDateTime::now_utc();
    let mut summary = ImportSummary::default();

    for (unique_key, params) in discover_meters(snapshot, &layout) {
        match store.record(&unique_key).await? {
            Some(mut record) => {
                let mut appended = 0usize;
                for param in params {
                    if record.add_parameter(param, now) {
                        appended += 1;
                    }
                }
                if appended > 0 {
                    record.updated_at = now;
                    store.save_record(&record).await?;
                    summary.updated += 1;
                    tracing::info!(unique_key, appended, "appended parameters to meter record");
                }
            }
            None => {
                let entry = directory
                    .get(&unique_key)
                    .cloned()
                    .unwrap_or_else(|| MeterDirectoryEntry::fallback(&unique_key));
                let record = MeterRecord::new(&entry, params, now);
                if store.insert_record(&record).await? {
                    summary.inserted += 1;
                    tracing::info!(unique_key, parameters = record.parameters.len(), "created meter record");
                }
            }
        }
    }

    metrics::counter!("meter_import_inserted_total").increment(summary.inserted as u64);
    metrics::counter!("meter_import_updated_total").increment(summary.updated as u64);
    Ok(summary)
}

/// Body of `POST /meters`: register a record by hand instead of importing it.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewMeterRequest {
    pub unique_key: String,
    pub parameters: Vec<String>,
}

pub async fn create_record(store: &dyn MeterStore, req: &NewMeterRequest) -> Result<MeterRecord, AppError> {
    let unique_key = req.unique_key.trim();
    if unique_key.is_empty() {
        return Err(AppError::validation("unique_key must not be empty"));
    }
    let params: Vec<&str> = req.parameters.iter().map(|p| p.trim()).filter(|p| !p.is_empty()).collect();
    if params.is_empty() {
        return Err(AppError::validation("parameters must name at least one parameter"));
    }

    let entry = store
        .directory_entry(unique_key)
        .await?
        .unwrap_or_else(|| MeterDirectoryEntry::fallback(unique_key));
    let record = MeterRecord::new(&entry, params, OffsetDateTime::now_utc());
    if !store.insert_record(&record).await? {
        return Err(AppError::Conflict(format!("Meter {unique_key} already exists")));
    }

    metrics::counter!("meter_registered_total").increment(1);
    tracing::info!(unique_key, parameters = record.parameters.len(), "registered meter record");
    Ok(record)
}
