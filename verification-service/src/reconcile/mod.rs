//! Merges a meter's stored parameters with the live telemetry snapshot into
//! the page of rows the dashboard shows.

use std::fmt;

use meter_client::domain::{ParameterEntry, ParameterStatus};
use serde::Serialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::telemetry::TelemetrySnapshot;

pub mod keys;

pub use keys::{derive_key, telemetry_key};

pub const PAGE_SIZE: usize = 10;
pub const NOT_AVAILABLE: &str = "N/A";
pub const LOADING: &str = "Loading...";

/// Search term and status filter applied to a parameter list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterQuery {
    /// Case-insensitive substring of `param_name`; empty matches everything.
    pub search: String,
    pub status: Option<ParameterStatus>,
}

impl ParameterQuery {
    pub fn matches(&self, param: &ParameterEntry) -> bool {
        let matches_search = self.search.is_empty()
            || param
                .param_name
                .to_lowercase()
                .contains(&self.search.to_lowercase());
        let matches_status = self.status.map_or(true, |s| s == param.status);
        matches_search && matches_status
    }
}

pub fn filter_parameters<'a>(params: &'a [ParameterEntry], query: &ParameterQuery) -> Vec<&'a ParameterEntry> {
    params.iter().filter(|p| query.matches(p)).collect()
}

pub fn page_count(filtered: usize) -> usize {
    filtered.div_ceil(PAGE_SIZE)
}

/// Clamp a requested page into `[1, page_count]` (page 1 when nothing matches).
pub fn clamp_page(page: usize, page_count: usize) -> usize {
    page.clamp(1, page_count.max(1))
}

/// Slice for a 1-based page. A page past the end yields an empty slice.
pub fn paginate<T>(items: &[T], page: usize) -> &[T] {
    let start = page.saturating_sub(1).saturating_mul(PAGE_SIZE);
    if start >= items.len() {
        return &[];
    }
    let end = (start + PAGE_SIZE).min(items.len());
    &items[start..end]
}

/// Most recent `updated_at` across all parameters of a meter.
pub fn last_updated(params: &[ParameterEntry]) -> Option<OffsetDateTime> {
    params.iter().filter_map(|p| p.updated_at).max()
}

/// RFC 3339 rendering of an optional timestamp, `"N/A"` when absent.
pub fn display_timestamp(ts: Option<OffsetDateTime>) -> String {
    ts.and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

/// Live value bound to a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum RealTimeValue {
    /// No snapshot has been fetched yet.
    Loading,
    /// Snapshot is present but has no usable value for the key.
    Missing,
    Value(f64),
}

impl fmt::Display for RealTimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RealTimeValue::Loading => f.write_str(LOADING),
            RealTimeValue::Missing => f.write_str(NOT_AVAILABLE),
            RealTimeValue::Value(v) => write!(f, "{v:.2}"),
        }
    }
}

/// Look up the live value for a parameter. `None` means the snapshot is
/// still loading.
pub fn real_time_value(snapshot: Option<&TelemetrySnapshot>, unique_key: &str, param_name: &str) -> RealTimeValue {
    let Some(snapshot) = snapshot else {
        return RealTimeValue::Loading;
    };
    match snapshot.number(&telemetry_key(unique_key, param_name)) {
        Some(v) => RealTimeValue::Value(v),
        None => RealTimeValue::Missing,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterRow {
    /// 1-based position within the filtered list.
    pub serial: usize,
    pub param_name: String,
    pub status: ParameterStatus,
    pub value: RealTimeValue,
    pub display_value: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterPage {
    pub unique_key: String,
    pub page: usize,
    pub page_count: usize,
    pub page_size: usize,
    pub total: usize,
    pub filtered: usize,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_updated: Option<OffsetDateTime>,
    pub telemetry_loading: bool,
    pub rows: Vec<ParameterRow>,
}

impl ParameterPage {
    pub fn last_updated_display(&self) -> String {
        display_timestamp(self.last_updated)
    }
}

/// Filter, clamp the requested page, slice it, and bind live values.
pub fn build_page(
    unique_key: &str,
    params: &[ParameterEntry],
    query: &ParameterQuery,
    requested_page: usize,
    snapshot: Option<&TelemetrySnapshot>,
) -> ParameterPage {
    let filtered = filter_parameters(params, query);
    let page_count = page_count(filtered.len());
    let page = clamp_page(requested_page, page_count);
    let offset = (page - 1) * PAGE_SIZE;

    let rows = paginate(&filtered, page)
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let value = real_time_value(snapshot, unique_key, &p.param_name);
            ParameterRow {
                serial: offset + i + 1,
                param_name: p.param_name.clone(),
                status: p.status,
                value,
                display_value: value.to_string(),
                updated_at: p.updated_at,
            }
        })
        .collect();

    ParameterPage {
        unique_key: unique_key.to_string(),
        page,
        page_count,
        page_size: PAGE_SIZE,
        total: params.len(),
        filtered: filtered.len(),
        last_updated: last_updated(params),
        telemetry_loading: snapshot.is_none(),
        rows,
    }
}
