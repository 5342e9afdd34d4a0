//! Per-activation metrics agent for serverless function runtimes.
//!
//! [`instrument`] wraps a single activation's entry point: it builds
//! an [`Agent`], binds it to the task via the activation context
//! (spec §4.3), arms the deadline timer (spec §4.5), runs the
//! function body, and tears everything down again. Inside that scope,
//! the free functions [`send`], [`add`], [`get`], and
//! [`activation_finished`] reach the current activation's agent
//! without it being threaded through every call site — the same
//! convenience the source SDK gets from a process-wide global, scoped
//! here to one task instead of one process.
//!
//! ```ignore
//! actmetrics::instrument(
//!     actmetrics::Options::new("https://insights-collector.example.com/v1/accounts/1/events", "api-key"),
//!     |agent, _http_client| async move {
//!         agent.add([("coldStart".into(), true.into())].into_iter().collect());
//!         // ... the activation's actual work ...
//!     },
//! ).await;
//! ```

mod agent;
mod context;
mod options;

pub use agent::{Agent, AgentError};
pub use context::{activation_finished, add, current, get, send};
pub use options::{Options, TimeoutCallback};

use std::sync::Arc;

use actmetrics_core::env;
use actmetrics_probe::InstrumentedClient;

/// Runs `main` as one instrumented activation: builds an [`Agent`] from
/// `options`, optionally wires up the HTTP probe, binds both to this
/// task for the duration of `main`, and finishes the activation
/// (cancelling the deadline timer) once `main` returns.
///
/// `main` receives the `Agent` directly — most call sites won't need
/// it and can use the free functions instead, but a handle is handy
/// for passing an [`InstrumentedClient`] deeper into request-building
/// code explicitly.
pub async fn instrument<F, Fut, T>(options: Options, main: F) -> T
where
    F: FnOnce(Arc<Agent>, Option<InstrumentedClient>) -> Fut,
    Fut: std::future::Future<Output = T>,
{
    let agent = Agent::new(&options);
    let http_client = build_http_client(agent.clone());

    let result = context::scope(agent.clone(), main(agent.clone(), http_client)).await;
    agent.activation_finished();
    result
}

fn build_http_client(agent: Arc<Agent>) -> Option<InstrumentedClient> {
    if env::env_flag_enabled("DISABLE_ALL_INSTRUMENTATION")
        || env::env_flag_enabled("OPENWHISK_NEWRELIC_DISABLE_ALL_INSTRUMENTATION")
        || env::env_flag_enabled("DISABLE_HTTP_INSTRUMENTATION")
        || env::env_flag_enabled("OPENWHISK_NEWRELIC_DISABLE_HTTP_INSTRUMENTATION")
    {
        return None;
    }

    Some(InstrumentedClient::new(Arc::new(move |record| {
        let agent = agent.clone();
        tokio::spawn(async move {
            agent.record_http(record).await;
        });
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Request;
    use http_body_util::BodyExt;
    use serial_test::serial;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    #[serial]
    async fn instrument_merges_defaults_and_flushes_a_custom_event() {
        std::env::set_var("__OW_ACTIVATION_ID", "act-1");

        let ingest = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&ingest)
            .await;

        let options = Options::new(ingest.uri(), "key");
        instrument(options, |agent, _client| async move {
            let mut event = actmetrics_core::Event::new();
            event.insert("widgetsSold".to_string(), actmetrics_core::EventValue::Int(3));
            agent.send("custom", event, true).await.unwrap();
        })
        .await;

        ingest.verify().await;
        std::env::remove_var("__OW_ACTIVATION_ID");
        actmetrics_core::queue::stop();
    }

    #[tokio::test]
    #[serial]
    async fn http_probe_event_reaches_the_ingest_endpoint() {
        let ingest = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&ingest)
            .await;

        let target = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
            .mount(&target)
            .await;

        let mut options = Options::new(ingest.uri(), "key");
        options.send_interval_ms = Some(20);

        instrument(options, |_agent, client| async move {
            let client = client.expect("instrumentation enabled");
            let uri: http::Uri = format!("{}/ping", target.uri()).parse().unwrap();
            let req = Request::get(uri).body(bytes::Bytes::new()).unwrap();
            let response = client.request(req).await.unwrap();
            let (_, body) = response.into_parts();
            let _ = body.collect().await.unwrap();
        })
        .await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        ingest.verify().await;
        actmetrics_core::queue::stop();
    }
}
