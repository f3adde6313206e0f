use serde::Deserialize;
use std::{fs, path::Path, time::Duration};

pub const MIN_POLL_INTERVAL_MS: u64 = 5_000;
pub const MAX_POLL_INTERVAL_MS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub kind: StoreKind,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub uri: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Upstream snapshot endpoints, merged in order (later keys win).
    pub sources: Vec<String>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl TelemetryConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImportConfig {
    pub source_url: String,
    #[serde(default = "default_key_segments")]
    pub key_segments: usize,
    #[serde(default = "default_skip_keys")]
    pub skip_keys: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub database: Option<DatabaseConfig>,
    pub http: HttpConfig,
    pub telemetry: TelemetryConfig,
    pub import: ImportConfig,
    pub metrics: Option<MetricsConfig>,
}

fn default_poll_interval_ms() -> u64 {
    MIN_POLL_INTERVAL_MS
}

fn default_request_timeout_ms() -> u64 {
    4_000
}

fn default_key_segments() -> usize {
    2
}

fn default_skip_keys() -> Vec<String> {
    ["Time", "timestamp", "UNIXtimestamp"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("VERIFICATION_CONFIG").unwrap_or_else(|_| "verification-config.toml".to_string());
        Self::from_path(&path)
    }

    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config {}: {e}", path.display()))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let interval = self.telemetry.poll_interval_ms;
        if !(MIN_POLL_INTERVAL_MS..=MAX_POLL_INTERVAL_MS).contains(&interval) {
            anyhow::bail!(
                "telemetry.poll_interval_ms must be within {MIN_POLL_INTERVAL_MS}..={MAX_POLL_INTERVAL_MS}, got {interval}"
            );
        }
        if self.telemetry.sources.is_empty() {
            anyhow::bail!("telemetry.sources must list at least one endpoint");
        }
        if self.import.key_segments == 0 {
            anyhow::bail!("import.key_segments must be at least 1");
        }
        if self.store.kind == StoreKind::Postgres && self.database.is_none() {
            anyhow::bail!("store.kind = \"postgres\" requires a [database] section");
        }
        Ok(())
    }

    /// Database section, required by the tools that always talk to Postgres.
    pub fn database(&self) -> anyhow::Result<&DatabaseConfig> {
        self.database
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("missing [database] section"))
    }
}
