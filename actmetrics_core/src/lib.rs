/*!
 * actmetrics core — the internal engine shared by every activation.
 *
 * This crate provides the event model, the pure flattener, the
 * environment/deadline reader, the (Linux-only) container probes, and
 * the process-wide send queue that batches, gzips, and ships events to
 * the ingest endpoint.
 *
 * End users should depend on the `actmetrics` facade crate instead,
 * which wires this engine to the HTTP probe and the per-activation
 * scope.
 *
 * # Module structure
 *
 * - `constants` — shared limits (batch size, truncation lengths, ingest
 *   user agent).
 * - `types` — `EventValue`, `Event`, `ErrorValue`, `FlatValue`.
 * - `flatten` — the pure `flatten_event` transform and `FlattenError`.
 * - `env` — activation identity + deadline, read once from the process
 *   environment.
 * - `container` — best-effort cgroup memory limit and `/etc/os-release`
 *   reads (Linux only, errors swallowed).
 * - `queue` — the shared, process-wide send queue and its gzip+HTTP
 *   flush.
 */

pub mod constants;
pub mod container;
pub mod env;
pub mod flatten;
pub mod queue;
pub mod types;

pub use flatten::{flatten_event, FlattenError};
pub use queue::{QueueHandle, SendQueue};
pub use types::{ErrorValue, Event, EventValue, FlatValue};
