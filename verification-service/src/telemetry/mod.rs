//! Live telemetry: a flat key/value snapshot pulled from external polling
//! endpoints. Used for display-only correlation; never persisted.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::UpstreamError;

pub mod http_client;
pub mod poller;

pub use http_client::HttpTelemetryClient;
pub use poller::{TelemetryPoller, TelemetryState};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TelemetrySnapshot(Map<String, Value>);

impl TelemetrySnapshot {
    pub fn new(values: Map<String, Value>) -> Self {
        Self(values)
    }

    /// Numeric reading for `key`. Numeric strings are accepted; anything
    /// else reads as absent.
    pub fn number(&self, key: &str) -> Option<f64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            _ => None,
        }
    }

    /// Overlay `other` on top of this snapshot; its keys win on conflict.
    pub fn merge(&mut self, other: TelemetrySnapshot) {
        self.0.extend(other.0);
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Value)> for TelemetrySnapshot {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Anything that can produce a fresh snapshot.
#[async_trait::async_trait]
pub trait TelemetryFetch: Send + Sync {
    async fn fetch(&self) -> Result<TelemetrySnapshot, UpstreamError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(value: Value) -> TelemetrySnapshot {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn number_accepts_numbers_and_numeric_strings_only() {
        let snap = snapshot(json!({
            "U1_KW": 12.5,
            "U1_PF": " 0.98 ",
            "Time": "10:00:00",
            "U1_FLAG": true,
        }));
        assert_eq!(snap.number("U1_KW"), Some(12.5));
        assert_eq!(snap.number("U1_PF"), Some(0.98));
        assert_eq!(snap.number("Time"), None);
        assert_eq!(snap.number("U1_FLAG"), None);
        assert_eq!(snap.number("U1_MISSING"), None);
    }

    #[test]
    fn merge_lets_later_sources_win() {
        let mut first = snapshot(json!({"A_X": 1, "A_Y": 2}));
        first.merge(snapshot(json!({"A_Y": 3, "B_Z": 4})));
        assert_eq!(first.len(), 3);
        assert_eq!(first.number("A_Y"), Some(3.0));
        assert_eq!(first.keys().collect::<Vec<_>>(), vec!["A_X", "A_Y", "B_Z"]);
    }
}
