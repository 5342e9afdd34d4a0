/**
 * The send queue — a shared, process-wide batcher.
 *
 * Mirrors `hawk_core`'s worker/channel split (spec §4.4), re-expressed
 * for an async runtime: the dedicated OS thread + `crossbeam-channel`
 * become a `tokio::spawn`ed ticker task + a `Mutex`-guarded deque, and
 * the condvar-based `FlushSignal` becomes plain `.await` on the future
 * returned by an `immediate` send (no separate signal type needed —
 * `flush_once` is awaitable directly).
 *
 * Events are flattened at enqueue time, not at flush time: flattening
 * is pure and batch-independent, so doing it once up front means a
 * malformed event can be rejected (and reported to an `immediate`
 * caller) before it ever touches the shared queue, and the flush path
 * only ever deals with wire-ready data.
 *
 * Process-wide singleton behind a `Mutex<Option<Arc<Inner>>>` rather
 * than a bare `OnceLock`, so the test harness can `stop()` and then
 * `start()` again within the same process (spec §4.4: "lazily
 * initialized by the first Agent, torn down by the test harness").
 */
use std::collections::{BTreeMap, VecDeque};
use std::io::Write;
use std::sync::{Arc, Mutex};

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::constants::{INGEST_USER_AGENT, MAX_EVENTS_PER_BATCH};
use crate::flatten::{flatten_event, FlattenConfig, FlattenError};
use crate::types::{Event, FlatValue};

type FlatEvent = BTreeMap<String, FlatValue>;

static GLOBAL_QUEUE: Mutex<Option<Arc<Inner>>> = Mutex::new(None);

struct Inner {
    url: String,
    api_key: String,
    flatten_cfg: FlattenConfig,
    http: reqwest::Client,
    queue: Mutex<VecDeque<FlatEvent>>,
    ticker: Mutex<Option<tokio::task::AbortHandle>>,
}

/// A cheap, cloneable reference to the shared send queue. Returned by
/// [`start`]; `Agent` holds one and calls [`QueueHandle::send`] for
/// every outgoing event.
#[derive(Clone)]
pub struct QueueHandle(Arc<Inner>);

impl QueueHandle {
    /// Flattens and enqueues `event`. If `immediate`, awaits a full
    /// flush cycle (at least the batch containing this event) before
    /// returning.
    ///
    /// Returns `Err` only for a `FlattenError` — the one metrics
    /// failure spec §7 allows to surface past this boundary, and only
    /// because `immediate` callers explicitly asked to wait on the
    /// outcome. Transport failures are never returned; they are logged
    /// and the batch is discarded (spec §4.4, §7).
    pub async fn send(&self, event: &Event, immediate: bool) -> Result<(), FlattenError> {
        let flat = flatten_event(event, &self.0.flatten_cfg)?;
        self.0.queue.lock().unwrap().push_back(flat);
        if immediate {
            Inner::flush_once(self.0.clone()).await;
        }
        Ok(())
    }
}

/// `sendQueue.start(url, apiKey, interval?)`. Re-entry is a no-op: the
/// first caller's endpoint and interval win, and the ticker is not
/// restarted. Requires a running Tokio runtime (the ticker is spawned
/// on it).
pub fn start(url: impl Into<String>, api_key: impl Into<String>, interval_ms: u64) -> QueueHandle {
    let mut guard = GLOBAL_QUEUE.lock().unwrap();
    if let Some(existing) = guard.as_ref() {
        return QueueHandle(existing.clone());
    }

    let inner = Arc::new(Inner {
        url: url.into(),
        api_key: api_key.into(),
        flatten_cfg: FlattenConfig {
            max_string_length: crate::constants::DEFAULT_MAX_STRING_LENGTH,
            error_max_string_length: crate::env::env_u64_or(
                "NEW_RELIC_ERROR_METRIC_MAX_STRING_LENGTH",
                crate::constants::DEFAULT_ERROR_METRIC_MAX_STRING_LENGTH as u64,
            ) as usize,
        },
        http: reqwest::Client::new(),
        queue: Mutex::new(VecDeque::new()),
        ticker: Mutex::new(None),
    });

    let ticker_target = inner.clone();
    let abort_handle = tokio::spawn(async move {
        Inner::run_ticker(ticker_target, interval_ms).await;
    })
    .abort_handle();
    *inner.ticker.lock().unwrap() = Some(abort_handle);

    *guard = Some(inner.clone());
    QueueHandle(inner)
}

/// `sendQueue.stop()`. Cancels the ticker and drops every un-shipped
/// event, logging the drop count. Idempotent — calling `stop()` with
/// no active queue is a no-op.
pub fn stop() {
    let mut guard = GLOBAL_QUEUE.lock().unwrap();
    let Some(inner) = guard.take() else {
        return;
    };
    if let Some(handle) = inner.ticker.lock().unwrap().take() {
        handle.abort();
    }
    let dropped = {
        let mut q = inner.queue.lock().unwrap();
        let n = q.len();
        q.clear();
        n
    };
    if dropped > 0 {
        eprintln!("[actmetrics] send queue stopped — dropping {dropped} unsent event(s)");
    }
}

impl Inner {
    async fn run_ticker(self: Arc<Self>, interval_ms: u64) {
        let mut ticker = tokio::time::interval(std::time::Duration::from_millis(interval_ms.max(1)));
        // The first tick fires immediately; skip it so we don't flush
        // a still-empty queue the instant the agent starts.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            Self::flush_once(self.clone()).await;
        }
    }

    /// Drains up to `MAX_EVENTS_PER_BATCH` events from the head of the
    /// queue and POSTs them. If more remain afterward, schedules
    /// another flush as a detached task rather than looping inline, so
    /// an `immediate` caller's `.await` only waits for its own batch.
    fn flush_once(self: Arc<Self>) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
        Box::pin(async move {
            let batch: Vec<FlatEvent> = {
                let mut q = self.queue.lock().unwrap();
                let n = q.len().min(MAX_EVENTS_PER_BATCH);
                q.drain(..n).collect()
            };

            if batch.is_empty() {
                return;
            }

            self.post_batch(&batch).await;

            let remaining = self.queue.lock().unwrap().len();
            if remaining > 0 {
                let cont = self.clone();
                tokio::spawn(async move { Self::flush_once(cont).await });
            }
        })
    }

    /// Serializes, gzips, and POSTs one batch. Best-effort: any
    /// failure (serialization, transport, non-200 response) is logged
    /// and the batch is discarded. Never propagates an error to the
    /// caller — this is the boundary spec §7 calls out as the one
    /// place a failure must not escape even on the `immediate` path.
    async fn post_batch(&self, batch: &[FlatEvent]) {
        let body = match serde_json::to_vec(batch) {
            Ok(body) => body,
            Err(err) => {
                eprintln!("[actmetrics] failed to serialize batch of {} event(s): {err}", batch.len());
                return;
            }
        };

        let mut encoder = GzEncoder::new(Vec::with_capacity(body.len()), Compression::default());
        if let Err(err) = encoder.write_all(&body) {
            eprintln!("[actmetrics] failed to gzip batch: {err}");
            return;
        }
        let gzipped = match encoder.finish() {
            Ok(g) => g,
            Err(err) => {
                eprintln!("[actmetrics] failed to finish gzip stream: {err}");
                return;
            }
        };

        let result = self
            .http
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::CONTENT_ENCODING, "gzip")
            .header("X-Insert-Key", &self.api_key)
            .header(reqwest::header::USER_AGENT, INGEST_USER_AGENT)
            .body(gzipped)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                let body = response.text().await.unwrap_or_default();
                eprintln!("[actmetrics] ingest accepted {} event(s): {body}", batch.len());
            }
            Ok(response) => {
                let status = response.status();
                eprintln!(
                    "[actmetrics] ingest rejected batch of {} event(s) with HTTP {status} — discarding",
                    batch.len()
                );
            }
            Err(err) => {
                eprintln!(
                    "[actmetrics] failed to deliver batch of {} event(s): {err} — discarding",
                    batch.len()
                );
            }
        }
    }
}

/// Legacy-named alias kept for call sites that read more naturally as
/// "the send queue" than "a handle to it".
pub type SendQueue = QueueHandle;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventValue;
    use std::time::Duration;
    use serial_test::serial;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_event(activation_id: &str) -> Event {
        let mut e = BTreeMap::new();
        e.insert("eventType".to_string(), EventValue::Str("http".to_string()));
        e.insert("timestamp".to_string(), EventValue::Int(crate::env::now_ms()));
        e.insert("activationId".to_string(), EventValue::Str(activation_id.to_string()));
        e
    }

    #[tokio::test]
    #[serial]
    async fn immediate_send_delivers_a_single_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(header("Content-Encoding", "gzip"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let handle = start(server.uri(), "key-123", 10_000);
        handle.send(&sample_event("A1"), true).await.unwrap();

        server.verify().await;
        stop();
    }

    #[tokio::test]
    #[serial]
    async fn batch_of_51_splits_into_two_posts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;

        let handle = start(server.uri(), "key-123", 10_000);
        for i in 0..51 {
            handle.send(&sample_event(&i.to_string()), false).await.unwrap();
        }
        // Trigger the flush via one immediate send rather than waiting
        // on the timer tick.
        handle.send(&sample_event("last"), true).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        server.verify().await;
        stop();
    }

    #[tokio::test]
    #[serial]
    async fn unsupported_property_is_rejected_before_enqueue() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(200)).mount(&server).await;

        let handle = start(server.uri(), "key-123", 10_000);
        let mut bad = sample_event("A1");
        bad.insert("callback".to_string(), EventValue::Unsupported);

        let result = handle.send(&bad, true).await;
        assert!(result.is_err());

        stop();
    }

    #[tokio::test]
    #[serial]
    async fn stop_drops_unsent_events_and_is_idempotent() {
        let server = MockServer::start().await;
        let handle = start(server.uri(), "key-123", 10_000);
        handle.send(&sample_event("A1"), false).await.unwrap();

        stop();
        stop(); // idempotent
    }
}
