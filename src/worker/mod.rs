//! Worker invocation: spawning stage worker processes and decoding their
//! result protocol.
//!
//! Each pipeline stage is computed by an external Python script. The
//! coordinator talks to it over the simplest contract a worker can satisfy:
//! free-form progress text on stdout, then one structured JSON record as the
//! final line. Failures are reported by a non-zero exit code with diagnostics
//! on stderr.
//!
//! The [`StageExecutor`] trait is the capability seam: the real
//! [`PythonExecutor`] spawns OS processes, while tests substitute in-process
//! fakes.

mod cancel;
mod invoker;
mod protocol;
mod types;

pub use cancel::{CancellationToken, wire_signals};
pub use invoker::PythonExecutor;
pub use protocol::parse_result;
pub use types::{ResultRecord, ResultStatus, StageExecutor, WorkerError};
