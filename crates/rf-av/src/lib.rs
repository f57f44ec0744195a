//! rf-av: external-tool concerns for the ripforge pipelines.
//!
//! Tool discovery ([`ToolRegistry`]), the single-command process worker
//! ([`worker::ProcessWorker`]), the pure command builder ([`builder`]),
//! and the probe-output parsers ([`probe`]).

pub mod builder;
pub mod probe;
pub mod tools;
pub mod worker;

pub use tools::{ToolInfo, ToolRegistry};
pub use worker::{ProcessWorker, WorkerCommand, WorkerEvent};
