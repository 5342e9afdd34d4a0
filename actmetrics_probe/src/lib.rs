//! Transparent HTTP request instrumentation (spec §4.2).
//!
//! The source probe monkeypatches Node's global `http`/`https` module
//! so every outgoing request is observed implicitly. Rust has no
//! equivalent seam to patch, and spec §9 anticipates exactly this:
//! languages that forbid implicit global patching get an explicit
//! transport constructor instead. [`InstrumentedClient`] is that
//! constructor — callers that want their outgoing calls observed make
//! them through it rather than through a bare `reqwest`/`hyper` client.
//!
//! Each [`InstrumentedClient`] is constructed with a `sink` closure
//! invoked once per finished request with the completed
//! [`metrics::HttpRecord`]; the `actmetrics` facade supplies a sink
//! that folds the record into the activation's outgoing event stream.

pub mod body;
pub mod client;
pub mod connector;
pub mod metrics;
pub mod normalize;

pub use client::{InstrumentedClient, ProbeError};
pub use metrics::{HttpRecord, RecordSink};
