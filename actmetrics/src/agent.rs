/**
 * The per-activation agent — spec §4.5's façade over the flattener,
 * send queue, and HTTP probe.
 *
 * One `Agent` is built per activation by [`crate::instrument`]. It
 * owns the activation's default metrics (identity + container info,
 * merged under every event per spec §3), the shared [`SendQueue`]
 * handle, the optional [`InstrumentedClient`], and the deadline timer.
 */
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use actmetrics_core::constants::DEADLINE_BUFFER_MS;
use actmetrics_core::{env, queue, Event, EventValue};
use actmetrics_core::container::ContainerInfo;
use actmetrics_core::env::ActivationIdentity;
use actmetrics_core::queue::QueueHandle;
use actmetrics_probe::HttpRecord;
use thiserror::Error;
use tokio::task::AbortHandle;

use crate::options::Options;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("event contains a property that cannot be represented on the wire: {0}")]
    Flatten(#[from] actmetrics_core::flatten::FlattenError),
}

pub struct Agent {
    /// `None` when the agent is disabled (spec §4.5(2), §7): a missing
    /// or blank `url`/`apiKey` is logged once here at construction, and
    /// every subsequent `send()` becomes a silent no-op rather than
    /// starting the queue or reaching the network.
    queue: Option<QueueHandle>,
    default_metrics: Mutex<BTreeMap<String, EventValue>>,
    deadline_ms: Option<i64>,
    timeout_task: Mutex<Option<AbortHandle>>,
    finished: AtomicBool,
}

impl Agent {
    pub(crate) fn new(options: &Options) -> Arc<Self> {
        let disabled = options.url.trim().is_empty() || options.api_key.trim().is_empty();

        let queue = if disabled {
            eprintln!("[actmetrics] missing url or apiKey — agent is disabled, all events will be dropped");
            None
        } else {
            Some(queue::start(options.url.clone(), options.api_key.clone(), options.resolved_send_interval_ms()))
        };

        let mut default_metrics = ActivationIdentity::from_env().as_default_metrics();
        default_metrics.extend(ContainerInfo::probe().as_default_metrics());

        let deadline_ms = env::read_deadline();

        let agent = Arc::new(Self {
            queue,
            default_metrics: Mutex::new(default_metrics),
            deadline_ms,
            timeout_task: Mutex::new(None),
            finished: AtomicBool::new(false),
        });

        if !disabled {
            agent.clone().maybe_start_timeout_timer(options);
        }
        agent
    }

    fn maybe_start_timeout_timer(self: Arc<Self>, options: &Options) {
        if options.disable_action_timeout_metric || env::env_flag_enabled("DISABLE_ACTION_TIMEOUT_METRIC") {
            return;
        }
        let Some(deadline_ms) = self.deadline_ms else {
            return;
        };

        let fire_in_ms = env::time_until_timeout(deadline_ms) - DEADLINE_BUFFER_MS;
        if fire_in_ms <= 0 {
            return;
        }

        let cb = options.action_timeout_metrics_cb.clone();
        let agent = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(fire_in_ms as u64)).await;
            if agent.finished.load(Ordering::SeqCst) {
                return;
            }

            // Default bag is the duration computed when the timer was
            // armed; a callback's returned event replaces it entirely,
            // and an `eventType` key inside it overrides the default
            // `"timeout"` type (spec §4.5).
            let mut event_type = "timeout".to_string();
            let event: Event = match cb {
                Some(cb) => {
                    let mut bag = cb();
                    if let Some(EventValue::Str(custom_type)) = bag.remove("eventType") {
                        event_type = custom_type;
                    }
                    bag
                }
                None => {
                    let mut bag = BTreeMap::new();
                    bag.insert("duration".to_string(), EventValue::Int(fire_in_ms));
                    bag
                }
            };
            let _ = agent.send(&event_type, event, true).await;
        })
        .abort_handle();

        *self.timeout_task.lock().unwrap() = Some(handle);
    }

    /// `agent.send(type, event, immediate)` — spec §4.5: merges
    /// `{eventType, timestamp}`, then the activation's default metrics,
    /// then the caller's event (caller wins on key collision), then
    /// hands the result to the send queue.
    pub async fn send(&self, event_type: &str, event: Event, immediate: bool) -> Result<(), AgentError> {
        let Some(queue) = &self.queue else {
            return Ok(());
        };

        let mut merged: Event = BTreeMap::new();
        merged.insert("eventType".to_string(), EventValue::Str(event_type.to_string()));
        merged.insert("timestamp".to_string(), EventValue::Int(env::now_ms()));
        merged.extend(self.default_metrics.lock().unwrap().clone());
        merged.extend(event);

        queue.send(&merged, immediate).await?;
        Ok(())
    }

    /// `agent.add(partialEvent)` — merges `partial` into the default
    /// metrics carried on every future event from this activation.
    pub fn add(&self, partial: Event) {
        self.default_metrics.lock().unwrap().extend(partial);
    }

    /// `agent.get()` — a snapshot of the current default metrics.
    pub fn get(&self) -> Event {
        self.default_metrics.lock().unwrap().clone()
    }

    /// `agent.activationFinished()` — cancels the pending timeout
    /// timer. Idempotent; safe to call more than once or after the
    /// timer has already fired.
    pub fn activation_finished(&self) {
        self.finished.store(true, Ordering::SeqCst);
        if let Some(handle) = self.timeout_task.lock().unwrap().take() {
            handle.abort();
        }
    }

    /// Folds a finished HTTP timing record into this activation's
    /// outgoing event stream. Called from the sink closure handed to
    /// [`actmetrics_probe::InstrumentedClient`] — never by user code
    /// directly.
    pub(crate) async fn record_http(&self, record: HttpRecord) {
        if let Err(err) = self.send("http", record.to_event(), false).await {
            eprintln!("[actmetrics] dropped an http metric event: {err}");
        }
    }
}
