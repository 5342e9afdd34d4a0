/**
 * SDK-wide constants.
 *
 * Mirrors `hawk_core::protocol::constants` in spirit: values baked into
 * every batch and used to identify and bound what we send.
 */

/// Default truncation length for ordinary string values.
/// Overridable per field name (see `error_metric_max_string_length`).
pub const DEFAULT_MAX_STRING_LENGTH: usize = 100;

/// Truncation length for the `message` / `errorMessage` / `error` keys.
/// Overridable via `NEW_RELIC_ERROR_METRIC_MAX_STRING_LENGTH`.
pub const DEFAULT_ERROR_METRIC_MAX_STRING_LENGTH: usize = 1500;

/// Keys that get the (larger) error truncation length instead of the
/// default string truncation length.
pub const ERROR_TRUNCATION_KEYS: [&str; 3] = ["message", "errorMessage", "error"];

/// Suffix appended to any string truncated by the flattener.
pub const TRUNCATION_SUFFIX: &str = "...";

/// Maximum number of events per ingest POST (platform ceiling is ~1MB
/// per request; this is the source SDK's conservative chunk size).
pub const MAX_EVENTS_PER_BATCH: usize = 50;

/// Default flush interval in milliseconds (production).
pub const DEFAULT_SEND_INTERVAL_MS: u64 = 10_000;

/// `User-Agent` header sent on every ingest POST. Also the loop-breaker
/// value: the HTTP probe never emits a record for a request carrying
/// this exact header value.
pub const INGEST_USER_AGENT: &str = concat!("actmetrics-rust/", env!("CARGO_PKG_VERSION"));

/// Buffer subtracted from `timeUntilTimeout()` before arming the
/// deadline timer, so the `timeout` event and its flush have a chance
/// to land before the platform kills the process.
pub const DEADLINE_BUFFER_MS: i64 = 5_000;
