/**
 * `InstrumentedClient` — the explicit transport constructor spec §9
 * calls for in languages that can't monkeypatch a process-wide HTTP
 * stack: rather than swapping out whatever client the function author
 * already uses, the probe is a client in its own right, handed
 * requests directly.
 */
use std::sync::Arc;

use actmetrics_core::constants::INGEST_USER_AGENT;
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use thiserror::Error;

use crate::body::{Kind, TimingBody};
use crate::connector::dial;
use crate::metrics::{RecordSink, RequestRecorder, ResponseAttributes};
use crate::normalize::RequestAttributes;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("DNS/TCP/TLS dial failed: {0}")]
    Dial(#[from] std::io::Error),
    #[error("HTTP/1 connection error: {0}")]
    Hyper(#[from] hyper::Error),
    #[error("request URI is missing a host")]
    MissingHost,
}

/// An HTTP/1 client that dials a fresh connection per request and
/// reports one timing record per request to its `sink`.
pub struct InstrumentedClient {
    sink: Arc<RecordSink>,
}

impl InstrumentedClient {
    pub fn new(sink: Arc<RecordSink>) -> Self {
        Self { sink }
    }

    pub async fn request(&self, req: Request<Bytes>) -> Result<Response<TimingBody<Incoming>>, ProbeError> {
        let (parts, body_bytes) = req.into_parts();
        let request_attrs = RequestAttributes::from_parts(&parts.uri, &parts.method);
        if request_attrs.host.is_empty() {
            return Err(ProbeError::MissingHost);
        }

        let emit = parts
            .headers
            .get(http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            != Some(INGEST_USER_AGENT);

        let recorder = Arc::new(RequestRecorder::new(request_attrs.clone(), self.sink.clone(), emit));

        let io = match dial(
            &request_attrs.host,
            request_attrs.port,
            request_attrs.is_https(),
            &recorder,
        )
        .await
        {
            Ok(io) => io,
            Err(err) => {
                let (message, code) = classify_io_error(&err);
                recorder.fail(message, code);
                return Err(ProbeError::Dial(err));
            }
        };

        let (mut sender, conn) = match hyper::client::conn::http1::handshake(TokioIo::new(io)).await {
            Ok(pair) => pair,
            Err(err) => {
                recorder.fail(err.to_string(), None);
                return Err(ProbeError::Hyper(err));
            }
        };
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let mut parts = parts;
        if !parts.headers.contains_key(http::header::HOST) {
            let host_header = if (request_attrs.is_https() && request_attrs.port == 443)
                || (!request_attrs.is_https() && request_attrs.port == 80)
            {
                request_attrs.host.clone()
            } else {
                format!("{}:{}", request_attrs.host, request_attrs.port)
            };
            if let Ok(value) = http::HeaderValue::from_str(&host_header) {
                parts.headers.insert(http::header::HOST, value);
            }
        }

        let request_body = TimingBody::new(Full::new(body_bytes), recorder.clone(), Kind::Request);
        let outgoing = Request::from_parts(parts, request_body);

        let response = match sender.send_request(outgoing).await {
            Ok(resp) => resp,
            Err(err) => {
                let (message, code) = classify_hyper_error(&err);
                recorder.fail(message, code);
                return Err(ProbeError::Hyper(err));
            }
        };

        let (resp_parts, incoming) = response.into_parts();
        recorder.set_response_attrs(ResponseAttributes {
            status_code: resp_parts.status.as_u16(),
            status_text: resp_parts
                .status
                .canonical_reason()
                .unwrap_or_default()
                .to_string(),
            content_type: resp_parts
                .headers
                .get(http::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string()),
            local_ip: None,
            server_ip: None,
            server_request_id: resp_parts
                .headers
                .get("x-request-id")
                .or_else(|| resp_parts.headers.get("x-correlation-id"))
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string()),
        });

        let response_body = TimingBody::new(incoming, recorder, Kind::Response);
        Ok(Response::from_parts(resp_parts, response_body))
    }
}

fn classify_io_error(err: &std::io::Error) -> (String, Option<&'static str>) {
    use std::io::ErrorKind;
    match err.kind() {
        ErrorKind::TimedOut => ("Connection timed out".to_string(), Some("110")),
        ErrorKind::ConnectionRefused => ("Connection refused".to_string(), Some("ECONNREFUSED")),
        ErrorKind::NotFound => (err.to_string(), Some("ENOTFOUND")),
        _ => (err.to_string(), None),
    }
}

fn classify_hyper_error(err: &hyper::Error) -> (String, Option<&'static str>) {
    (err.to_string(), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use std::sync::Mutex;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sink_collecting(records: Arc<Mutex<Vec<crate::metrics::HttpRecord>>>) -> Arc<RecordSink> {
        Arc::new(move |record| records.lock().unwrap().push(record))
    }

    #[tokio::test]
    async fn reports_one_record_with_timing_and_byte_counts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hello"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hi there"))
            .mount(&server)
            .await;

        let records = Arc::new(Mutex::new(Vec::new()));
        let client = InstrumentedClient::new(sink_collecting(records.clone()));

        let uri: http::Uri = format!("{}/hello", server.uri()).parse().unwrap();
        let req = Request::get(uri).body(Bytes::new()).unwrap();

        let response = client.request(req).await.unwrap();
        assert_eq!(response.status(), 200);
        let (_, body) = response.into_parts();
        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(&collected[..], b"hi there");

        let recs = records.lock().unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].response.as_ref().unwrap().status_code, 200);
        assert_eq!(recs[0].response_body_bytes, 8);
    }

    #[tokio::test]
    async fn loop_breaker_skips_requests_from_the_ingest_transport() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(200)).mount(&server).await;

        let records = Arc::new(Mutex::new(Vec::new()));
        let client = InstrumentedClient::new(sink_collecting(records.clone()));

        let uri: http::Uri = server.uri().parse().unwrap();
        let req = Request::post(uri)
            .header(http::header::USER_AGENT, INGEST_USER_AGENT)
            .body(Bytes::new())
            .unwrap();

        let response = client.request(req).await.unwrap();
        let (_, body) = response.into_parts();
        let _ = body.collect().await.unwrap();

        assert!(records.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn dial_failure_against_an_unroutable_host_reports_an_error_record() {
        let records = Arc::new(Mutex::new(Vec::new()));
        let client = InstrumentedClient::new(sink_collecting(records.clone()));

        let req = Request::get("http://127.0.0.1:1/").body(Bytes::new()).unwrap();
        let result = client.request(req).await;

        assert!(result.is_err());
        let recs = records.lock().unwrap();
        assert_eq!(recs.len(), 1);
        assert!(recs[0].error.is_some());
    }
}
