/**
 * Minimal test harness for the per-activation metrics agent.
 *
 * Replace URL/API_KEY with a real New-Relic-Insights-compatible
 * ingest endpoint and account insert key, then run:
 *
 *   cargo run -p actmetrics_example
 *   cargo run -p actmetrics_example -- --probe   # also issue a probed HTTP call
 */
use http::Request;
use http_body_util::BodyExt;

const URL: &str = "https://insights-collector.example.com/v1/accounts/PASTE_ACCOUNT_ID/events";
const API_KEY: &str = "PASTE_YOUR_INSERT_KEY_HERE";

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    let run_probe = args.iter().any(|a| a == "--probe");

    let options = actmetrics::Options::new(URL, API_KEY);

    actmetrics::instrument(options, |agent, http_client| async move {
        println!("[example] activation started");

        agent.add([("coldStart".to_string(), true.into())].into_iter().collect());

        let mut event = actmetrics_core::Event::new();
        event.insert("widgetsSold".to_string(), 3i64.into());
        agent.send("custom", event, false).await.expect("event should flatten cleanly");
        println!("[example] queued a custom event");

        if run_probe {
            if let Some(client) = http_client {
                println!("[example] issuing a probed HTTP request...");
                let req = Request::get("http://example.com/").body(bytes::Bytes::new()).unwrap();
                match client.request(req).await {
                    Ok(response) => {
                        let (parts, body) = response.into_parts();
                        let _ = body.collect().await;
                        println!("[example] probed request finished with status {}", parts.status);
                    }
                    Err(err) => println!("[example] probed request failed: {err}"),
                }
            } else {
                println!("[example] HTTP instrumentation is disabled via environment variable");
            }
        }

        println!("[example] activation finished — events flush on the send queue's own schedule");
    })
    .await;
}
