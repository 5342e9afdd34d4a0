/**
 * Configuration for [`crate::Agent::instrument`].
 *
 * Mirrors the source agent's constructor options (spec §6): the ingest
 * URL and API key are required, everything else has a default derived
 * from the environment.
 */
use std::sync::Arc;

use actmetrics_core::constants::DEFAULT_SEND_INTERVAL_MS;
use actmetrics_core::Event;

/// Invoked once, from a background task, when the synthetic `timeout`
/// event is about to fire. Its return value replaces the default
/// `{duration}` metrics bag entirely (spec §4.5); if the returned event
/// carries an `eventType` key, that overrides the default `"timeout"`
/// event type too.
pub type TimeoutCallback = Arc<dyn Fn() -> Event + Send + Sync>;

pub struct Options {
    /// New-Relic-Insights-compatible ingest endpoint URL.
    pub url: String,
    /// `X-Insert-Key` sent with every batch.
    pub api_key: String,
    /// How often the send queue flushes on its own, absent an
    /// `immediate` send. Defaults to
    /// [`DEFAULT_SEND_INTERVAL_MS`], overridable by
    /// `NEW_RELIC_SEND_INTERVAL_MS`.
    pub send_interval_ms: Option<u64>,
    /// Skips the synthetic timeout event entirely, regardless of the
    /// `DISABLE_ACTION_TIMEOUT_METRIC` environment variable.
    pub disable_action_timeout_metric: bool,
    /// Called just before the timeout event is sent.
    pub action_timeout_metrics_cb: Option<TimeoutCallback>,
}

impl Options {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            send_interval_ms: None,
            disable_action_timeout_metric: false,
            action_timeout_metrics_cb: None,
        }
    }

    pub(crate) fn resolved_send_interval_ms(&self) -> u64 {
        self.send_interval_ms.unwrap_or_else(|| {
            actmetrics_core::env::env_u64_or("NEW_RELIC_SEND_INTERVAL_MS", DEFAULT_SEND_INTERVAL_MS)
        })
    }
}

impl From<(&str, &str)> for Options {
    fn from((url, api_key): (&str, &str)) -> Self {
        Self::new(url, api_key)
    }
}
