/**
 * Per-request timing state and the final event it collapses into
 * (spec §4.2's nine timing anchors and the derived `duration*` fields).
 *
 * One [`RequestRecorder`] is created per outgoing request and threaded
 * through the connector (DNS/TCP/TLS anchors) and both `TimingBody`
 * wrappers (request-finished / first-byte / response-end anchors plus
 * byte counts). Exactly one of "response completed" or "errored" fires
 * [`RequestRecorder::trigger`], which is guarded to run at most once —
 * mirroring the source probe's single `triggerMetrics()` call per
 * request regardless of how many listeners could have fired it.
 */
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use actmetrics_core::{Event, EventValue};

use crate::normalize::RequestAttributes;

#[derive(Debug, Clone, Default)]
pub struct ResponseAttributes {
    pub status_code: u16,
    pub status_text: String,
    pub content_type: Option<String>,
    pub local_ip: Option<String>,
    pub server_ip: Option<String>,
    pub server_request_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ErrorAttributes {
    pub message: String,
    pub code: Option<String>,
}

#[derive(Default)]
struct TimingState {
    socket_available: Option<Instant>,
    dns_lookup: Option<Instant>,
    tcp_connected: Option<Instant>,
    tls_handshaken: Option<Instant>,
    request_finished: Option<Instant>,
    first_byte: Option<Instant>,
    response_end: Option<Instant>,
    request_body_bytes: u64,
    response_body_bytes: u64,
    response: Option<ResponseAttributes>,
    error: Option<ErrorAttributes>,
}

/// Callback invoked exactly once per request with the finished record.
pub type RecordSink = dyn Fn(HttpRecord) + Send + Sync + 'static;

pub struct RequestRecorder {
    request_start: Instant,
    request: RequestAttributes,
    state: Mutex<TimingState>,
    emitted: AtomicBool,
    sink: std::sync::Arc<RecordSink>,
    /// `false` for the loop-breaker path (spec §4.2: a request whose
    /// `User-Agent` matches the ingest transport's own is never
    /// reported, so the probe can't observe its own metric uploads).
    emit: bool,
}

impl RequestRecorder {
    pub fn new(request: RequestAttributes, sink: std::sync::Arc<RecordSink>, emit: bool) -> Self {
        Self {
            request_start: Instant::now(),
            request,
            state: Mutex::new(TimingState::default()),
            emitted: AtomicBool::new(false),
            sink,
            emit,
        }
    }

    pub fn mark_socket_available(&self) {
        self.state.lock().unwrap().socket_available.get_or_insert(Instant::now());
    }
    pub fn mark_dns_lookup(&self) {
        self.state.lock().unwrap().dns_lookup.get_or_insert(Instant::now());
    }
    pub fn mark_tcp_connected(&self) {
        self.state.lock().unwrap().tcp_connected.get_or_insert(Instant::now());
    }
    pub fn mark_tls_handshaken(&self) {
        self.state.lock().unwrap().tls_handshaken.get_or_insert(Instant::now());
    }
    pub fn mark_request_finished(&self) {
        self.state.lock().unwrap().request_finished.get_or_insert(Instant::now());
    }
    pub fn mark_first_byte(&self) {
        self.state.lock().unwrap().first_byte.get_or_insert(Instant::now());
    }
    pub fn add_request_bytes(&self, n: u64) {
        self.state.lock().unwrap().request_body_bytes += n;
    }
    pub fn add_response_bytes(&self, n: u64) {
        self.state.lock().unwrap().response_body_bytes += n;
    }

    pub fn set_response_attrs(&self, attrs: ResponseAttributes) {
        self.state.lock().unwrap().response = Some(attrs);
    }

    /// Marks the response body exhausted and fires the record.
    pub fn complete(&self) {
        self.state.lock().unwrap().response_end.get_or_insert(Instant::now());
        self.trigger();
    }

    /// Records an error (connect failure, timeout, mid-stream I/O
    /// error) and fires the record immediately.
    pub fn fail(&self, message: impl Into<String>, code: Option<&'static str>) {
        let mut state = self.state.lock().unwrap();
        state.error = Some(ErrorAttributes {
            message: message.into(),
            code: code.map(|c| c.to_string()),
        });
        drop(state);
        self.trigger();
    }

    fn trigger(&self) {
        if self.emitted.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            return;
        }
        let state = self.state.lock().unwrap();
        let now = Instant::now();
        let record = HttpRecord {
            request: self.request.clone(),
            response: state.response.clone(),
            error: state.error.clone(),
            request_body_bytes: state.request_body_bytes,
            response_body_bytes: state.response_body_bytes,
            duration_blocked_ms: elapsed_ms(self.request_start, state.socket_available),
            duration_dns_ms: elapsed_between_ms(state.socket_available, state.dns_lookup),
            duration_connect_ms: elapsed_between_ms(state.dns_lookup, state.tcp_connected),
            duration_ssl_ms: elapsed_between_ms(state.tcp_connected, state.tls_handshaken),
            duration_send_ms: elapsed_between_ms(
                state.tls_handshaken.or(state.tcp_connected),
                state.request_finished,
            ),
            duration_wait_ms: elapsed_between_ms(state.request_finished, state.first_byte),
            duration_receive_ms: elapsed_between_ms(state.first_byte, state.response_end.or(Some(now))),
            duration_ms: elapsed_ms(self.request_start, state.response_end.or(Some(now))),
        };
        drop(state);
        if self.emit {
            (self.sink)(record);
        }
    }
}

/// `None` when `end` was never recorded — the corresponding timing
/// attribute is omitted from the emitted event rather than reported as
/// zero (spec §4.2).
fn elapsed_ms(start: Instant, end: Option<Instant>) -> Option<i64> {
    end.map(|e| e.saturating_duration_since(start).as_millis() as i64)
}

fn elapsed_between_ms(start: Option<Instant>, end: Option<Instant>) -> Option<i64> {
    match (start, end) {
        (Some(s), Some(e)) => Some(e.saturating_duration_since(s).as_millis() as i64),
        _ => None,
    }
}

/// The finished per-request record, ready to fold into an `Event` and
/// hand to the agent's `send("http", ..., false)`.
#[derive(Debug, Clone)]
pub struct HttpRecord {
    pub request: RequestAttributes,
    pub response: Option<ResponseAttributes>,
    pub error: Option<ErrorAttributes>,
    pub request_body_bytes: u64,
    pub response_body_bytes: u64,
    /// Each `duration_*_ms` field is `None` when either endpoint it
    /// spans was never recorded (e.g. `duration_ssl_ms` on a plain
    /// `http:` request) rather than a misleading zero (spec §4.2).
    pub duration_blocked_ms: Option<i64>,
    pub duration_dns_ms: Option<i64>,
    pub duration_connect_ms: Option<i64>,
    pub duration_ssl_ms: Option<i64>,
    pub duration_send_ms: Option<i64>,
    pub duration_wait_ms: Option<i64>,
    pub duration_receive_ms: Option<i64>,
    pub duration_ms: Option<i64>,
}

impl HttpRecord {
    pub fn to_event(&self) -> Event {
        let mut map: BTreeMap<String, EventValue> = BTreeMap::new();
        map.insert("protocol".into(), EventValue::Str(self.request.protocol.clone()));
        map.insert("host".into(), EventValue::Str(self.request.host.clone()));
        map.insert("port".into(), EventValue::Int(self.request.port as i64));
        map.insert("path".into(), EventValue::Str(self.request.path.clone()));
        map.insert("url".into(), EventValue::Str(self.request.url.clone()));
        map.insert("method".into(), EventValue::Str(self.request.method.clone()));
        map.insert("domain".into(), EventValue::Str(self.request.domain.clone()));

        map.insert("requestBodySize".into(), EventValue::UInt(self.request_body_bytes));
        map.insert("responseBodySize".into(), EventValue::UInt(self.response_body_bytes));

        if let Some(v) = self.duration_ms {
            map.insert("duration".into(), EventValue::Int(v));
        }
        if let Some(v) = self.duration_blocked_ms {
            map.insert("durationBlocked".into(), EventValue::Int(v));
        }
        if let Some(v) = self.duration_dns_ms {
            map.insert("durationDNS".into(), EventValue::Int(v));
        }
        if let Some(v) = self.duration_connect_ms {
            map.insert("durationConnect".into(), EventValue::Int(v));
        }
        if let Some(v) = self.duration_ssl_ms {
            map.insert("durationSSL".into(), EventValue::Int(v));
        }
        if let Some(v) = self.duration_send_ms {
            map.insert("durationSend".into(), EventValue::Int(v));
        }
        if let Some(v) = self.duration_wait_ms {
            map.insert("durationWait".into(), EventValue::Int(v));
        }
        if let Some(v) = self.duration_receive_ms {
            map.insert("durationReceive".into(), EventValue::Int(v));
        }

        if let Some(resp) = &self.response {
            map.insert("responseCode".into(), EventValue::Int(resp.status_code as i64));
            map.insert("responseStatus".into(), EventValue::Str(resp.status_text.clone()));
            if let Some(ct) = &resp.content_type {
                map.insert("contentType".into(), EventValue::Str(ct.clone()));
            }
            if let Some(ip) = &resp.local_ip {
                map.insert("localIPAddress".into(), EventValue::Str(ip.clone()));
            }
            if let Some(ip) = &resp.server_ip {
                map.insert("serverIPAddress".into(), EventValue::Str(ip.clone()));
            }
            if let Some(id) = &resp.server_request_id {
                map.insert("serverRequestId".into(), EventValue::Str(id.clone()));
            }
        }

        if let Some(err) = &self.error {
            map.insert("error".into(), EventValue::Bool(true));
            map.insert("errorMessage".into(), EventValue::Str(err.message.clone()));
            if let Some(code) = &err.code {
                map.insert("errorCode".into(), EventValue::Str(code.clone()));
            }
        }

        map
    }
}
