/**
 * Activation context — continuation-local storage binding the
 * currently-running activation's [`Agent`] to whatever code is running
 * on this task (spec §4.3).
 *
 * `tokio::task_local!` is the async-Rust analogue of the source SDK's
 * continuation-local storage: a value bound for the duration of a
 * `.scope(...)` future and visible to every `.await` point nested
 * inside it, without being threaded through every function signature.
 * The one place this differs from true CLS is that the binding does
 * NOT cross a `tokio::spawn` boundary — a detached task needs the
 * `Agent` handle passed to it explicitly, the same way CLS doesn't
 * survive a hop onto a brand new OS thread.
 */
use std::sync::Arc;

use actmetrics_core::Event;

use crate::agent::{Agent, AgentError};

tokio::task_local! {
    static CURRENT_AGENT: Arc<Agent>;
}

pub(crate) async fn scope<F, T>(agent: Arc<Agent>, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    CURRENT_AGENT.scope(agent, fut).await
}

/// The `Agent` bound to the activation currently running on this task,
/// if any (i.e. if called from within [`Agent::instrument`]).
pub fn current() -> Option<Arc<Agent>> {
    CURRENT_AGENT.try_with(|agent| agent.clone()).ok()
}

/// `agent.send(type, event, immediate)` against the current
/// activation's agent. Logs and returns `Ok(())` with no effect if
/// called outside an instrumented activation — mirrors the source
/// SDK's behavior of degrading to a no-op rather than panicking when
/// called before `init`.
pub async fn send(event_type: &str, event: Event, immediate: bool) -> Result<(), AgentError> {
    match current() {
        Some(agent) => agent.send(event_type, event, immediate).await,
        None => {
            eprintln!("[actmetrics] send(\"{event_type}\") called outside an instrumented activation — ignoring");
            Ok(())
        }
    }
}

/// `agent.add(partialEvent)` against the current activation's agent.
/// A no-op outside an instrumented activation.
pub fn add(partial: Event) {
    match current() {
        Some(agent) => agent.add(partial),
        None => {
            eprintln!("[actmetrics] add() called outside an instrumented activation — ignoring");
        }
    }
}

/// Snapshot of the current activation's default metrics, or an empty
/// event if called outside an instrumented activation.
pub fn get() -> Event {
    current().map(|agent| agent.get()).unwrap_or_default()
}

/// `agent.activationFinished()` against the current activation's
/// agent. A no-op outside an instrumented activation.
pub fn activation_finished() {
    if let Some(agent) = current() {
        agent.activation_finished();
    }
}
