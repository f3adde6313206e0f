use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::MeterDirectoryEntry;

/// Verification state of a single meter parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ParameterStatus {
    #[serde(rename = "Verified")]
    Verified,
    #[default]
    #[serde(rename = "Not Verified")]
    NotVerified,
    #[serde(rename = "Not Sure")]
    NotSure,
    #[serde(rename = "Not Used")]
    NotUsed,
}

impl ParameterStatus {
    pub const ALL: [ParameterStatus; 4] = [
        ParameterStatus::Verified,
        ParameterStatus::NotVerified,
        ParameterStatus::NotSure,
        ParameterStatus::NotUsed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterStatus::Verified => "Verified",
            ParameterStatus::NotVerified => "Not Verified",
            ParameterStatus::NotSure => "Not Sure",
            ParameterStatus::NotUsed => "Not Used",
        }
    }
}

impl fmt::Display for ParameterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid parameter status '{0}'")]
pub struct ParseStatusError(pub String);

impl FromStr for ParameterStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ParameterStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseStatusError(s.to_string()))
    }
}

/// One parameter of a meter, as stored inside the record document.
///
/// Timestamps are optional on read so that documents written before
/// per-parameter stamping still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterEntry {
    pub param_name: String,
    #[serde(default)]
    pub status: ParameterStatus,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

impl ParameterEntry {
    pub fn new(param_name: impl Into<String>, now: OffsetDateTime) -> Self {
        Self {
            param_name: param_name.into(),
            status: ParameterStatus::default(),
            created_at: Some(now),
            updated_at: Some(now),
        }
    }
}

/// Mutable per-meter state: parameter list plus a free-text comment.
#[derive(Debug, Clone, PartialEq)]
pub struct MeterRecord {
    pub unique_key: String,
    pub meter_name: String,
    pub location: String,
    pub parameters: Vec<ParameterEntry>,
    pub comment: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl MeterRecord {
    /// New record for a directory entry, seeded with default-status parameters.
    pub fn new<I, S>(entry: &MeterDirectoryEntry, param_names: I, now: OffsetDateTime) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut record = Self {
            unique_key: entry.unique_key.clone(),
            meter_name: entry.meter_name.clone(),
            location: entry.location.clone(),
            parameters: Vec::new(),
            comment: String::new(),
            created_at: now,
            updated_at: now,
        };
        for name in param_names {
            record.add_parameter(name, now);
        }
        record
    }

    pub fn parameter(&self, param_name: &str) -> Option<&ParameterEntry> {
        self.parameters.iter().find(|p| p.param_name == param_name)
    }

    pub fn parameter_mut(&mut self, param_name: &str) -> Option<&mut ParameterEntry> {
        self.parameters.iter_mut().find(|p| p.param_name == param_name)
    }

    /// Appends a parameter unless one with the same name exists.
    /// Returns whether the list changed.
    pub fn add_parameter(&mut self, param_name: impl Into<String>, now: OffsetDateTime) -> bool {
        let param_name = param_name.into();
        if self.parameter(&param_name).is_some() {
            return false;
        }
        self.parameters.push(ParameterEntry::new(param_name, now));
        true
    }
}

/// Directory fields joined with the record state, as served to the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterDetail {
    pub unique_key: String,
    pub meter_name: String,
    pub location: String,
    pub comment: String,
    pub parameters: Vec<ParameterEntry>,
}

impl MeterDetail {
    pub fn new(entry: MeterDirectoryEntry, record: Option<MeterRecord>) -> Self {
        let (comment, parameters) = match record {
            Some(r) => (r.comment, r.parameters),
            None => (String::new(), Vec::new()),
        };
        Self {
            unique_key: entry.unique_key,
            meter_name: entry.meter_name,
            location: entry.location,
            comment,
            parameters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn status_uses_display_names_on_the_wire() {
        let json = serde_json::to_string(&ParameterStatus::NotVerified).unwrap();
        assert_eq!(json, "\"Not Verified\"");

        let parsed: ParameterStatus = serde_json::from_str("\"Not Used\"").unwrap();
        assert_eq!(parsed, ParameterStatus::NotUsed);

        assert!(serde_json::from_str::<ParameterStatus>("\"NotVerified\"").is_err());
    }

    #[test]
    fn status_from_str_rejects_unknown_values() {
        assert_eq!("Not Sure".parse::<ParameterStatus>(), Ok(ParameterStatus::NotSure));
        assert!("verified".parse::<ParameterStatus>().is_err());
    }

    #[test]
    fn legacy_parameter_without_timestamps_loads_with_default_status() {
        let entry: ParameterEntry = serde_json::from_str(r#"{"paramName":"KW_TOTAL"}"#).unwrap();
        assert_eq!(entry.status, ParameterStatus::NotVerified);
        assert_eq!(entry.updated_at, None);
    }

    #[test]
    fn add_parameter_keeps_names_unique() {
        let now = datetime!(2025-08-16 10:00:00 UTC);
        let entry = MeterDirectoryEntry::fallback("U1");
        let mut record = MeterRecord::new(&entry, ["A", "B", "A"], now);
        assert_eq!(record.parameters.len(), 2);
        assert!(!record.add_parameter("B", now));
        assert!(record.add_parameter("C", now));
        assert_eq!(record.parameters.len(), 3);
    }

    #[test]
    fn detail_without_record_has_empty_state() {
        let detail = MeterDetail::new(MeterDirectoryEntry::fallback("U9"), None);
        assert_eq!(detail.meter_name, "U9");
        assert_eq!(detail.location, "Not Available");
        assert!(detail.parameters.is_empty());
        assert!(detail.comment.is_empty());
    }
}
