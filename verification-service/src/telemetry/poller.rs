use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use time::OffsetDateTime;
use tokio::{sync::RwLock, task::JoinHandle, time::MissedTickBehavior};

use super::{TelemetryFetch, TelemetrySnapshot};
use crate::error::UpstreamError;

/// Latest telemetry as seen by the dashboard.
///
/// `snapshot` is `None` until the first successful fetch; that is the
/// loading state and is distinct from a key simply being absent.
#[derive(Debug, Clone, Default)]
pub struct TelemetryState {
    pub snapshot: Option<Arc<TelemetrySnapshot>>,
    pub last_fetched_at: Option<OffsetDateTime>,
    pub last_error: Option<String>,
    applied_token: u64,
}

impl TelemetryState {
    pub fn is_loading(&self) -> bool {
        self.snapshot.is_none()
    }

    pub fn snapshot(&self) -> Option<&TelemetrySnapshot> {
        self.snapshot.as_deref()
    }
}

/// Periodically refreshes the telemetry snapshot.
///
/// Every tick starts an independent fetch, so a slow request may still be in
/// flight when the next one starts. Each fetch carries a token taken from a
/// monotonically increasing counter and its result is applied only if no
/// later-issued fetch has been applied already.
pub struct TelemetryPoller {
    fetcher: Arc<dyn TelemetryFetch>,
    interval: Duration,
    next_token: AtomicU64,
    state: RwLock<TelemetryState>,
}

impl TelemetryPoller {
    pub fn new(fetcher: Arc<dyn TelemetryFetch>, interval: Duration) -> Self {
        Self {
            fetcher,
            interval,
            next_token: AtomicU64::new(1),
            state: RwLock::new(TelemetryState::default()),
        }
    }

    pub async fn state(&self) -> TelemetryState {
        self.state.read().await.clone()
    }

    /// Reserve the token for a fetch about to be issued.
    pub fn issue_token(&self) -> u64 {
        self.next_token.fetch_add(1, Ordering::Relaxed)
    }

    /// Fetch once and apply the result. Returns whether the state changed.
    pub async fn poll_once(&self) -> bool {
        let token = self.issue_token();
        let result = self.fetcher.fetch().await;
        self.apply(token, result).await
    }

    /// Apply a completed fetch. Results older than the last applied one are
    /// dropped; failures keep the previous snapshot.
    pub async fn apply(&self, token: u64, result: Result<TelemetrySnapshot, UpstreamError>) -> bool {
        let mut state = self.state.write().await;
        if token <= state.applied_token {
            tracing::debug!(token, applied = state.applied_token, "discarding superseded telemetry fetch");
            return false;
        }

        match result {
            Ok(snapshot) => {
                metrics::counter!("telemetry_fetch_total").increment(1);
                state.applied_token = token;
                state.snapshot = Some(Arc::new(snapshot));
                state.last_fetched_at = Some(OffsetDateTime::now_utc());
                state.last_error = None;
                true
            }
            Err(e) => {
                metrics::counter!("telemetry_fetch_failed_total").increment(1);
                tracing::warn!(error = %e, "telemetry fetch failed, keeping last snapshot");
                state.last_error = Some(e.to_string());
                false
            }
        }
    }

    /// Start polling: one fetch immediately, then one per interval.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let poller = Arc::clone(&self);
                tokio::spawn(async move {
                    poller.poll_once().await;
                });
            }
        })
    }
}
