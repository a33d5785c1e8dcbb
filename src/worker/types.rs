#![allow(dead_code)]

//! Core types and traits for worker invocation.

use crate::stage::Stage;
use crate::worker::CancellationToken;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Terminal failures of a worker invocation.
///
/// `SpawnFailed` and `ExecutionFailed` are deliberately distinct: the first
/// means the environment or deployment is broken (the worker never ran), the
/// second means the worker ran and reported a defect of its own.
#[derive(Debug, Clone, Error)]
pub enum WorkerError {
    /// The worker process could not be started at all.
    #[error("failed to start worker: {message}")]
    SpawnFailed { message: String },

    /// The worker ran and exited with a non-zero code.
    #[error("worker exited with code {exit_code:?}: {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    /// The invocation was cancelled by an explicit caller action.
    #[error("worker cancelled after {elapsed:?}")]
    Cancelled {
        elapsed: Duration,
        partial_output: Option<String>,
    },
}

impl WorkerError {
    /// Create a spawn failure.
    pub fn spawn_failed(message: impl Into<String>) -> Self {
        Self::SpawnFailed {
            message: message.into(),
        }
    }

    /// Create an execution failure.
    pub fn execution_failed(exit_code: Option<i32>, stdout: String, stderr: String) -> Self {
        Self::ExecutionFailed {
            exit_code,
            stdout,
            stderr,
        }
    }

    /// Diagnostic text most useful to a human, if any was captured.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            WorkerError::SpawnFailed { message } => Some(message),
            WorkerError::ExecutionFailed { stderr, stdout, .. } => {
                if !stderr.is_empty() {
                    Some(stderr)
                } else if !stdout.is_empty() {
                    Some(stdout)
                } else {
                    None
                }
            }
            WorkerError::Cancelled { partial_output, .. } => partial_output.as_deref(),
        }
    }
}

/// Status reported by a worker's result record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Error,
}

/// Structured result decoded from a worker's output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Stage the worker computed.
    pub stage: Stage,

    /// Status the worker reported (or the lenient-fallback success).
    pub status: ResultStatus,

    /// Stage-specific payload fields, passed through opaquely.
    pub payload: serde_json::Map<String, serde_json::Value>,

    /// Full raw stdout, kept for diagnostics.
    pub raw: String,
}

impl ResultRecord {
    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }

    /// The worker's human-readable message, if it provided one.
    pub fn message(&self) -> Option<&str> {
        self.payload.get("message").and_then(|v| v.as_str())
    }

    /// Flatten into the caller-facing JSON shape: the payload fields plus
    /// the `status` field, exactly as the worker printed them.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = self.payload.clone();
        map.insert(
            "status".to_string(),
            serde_json::json!(match self.status {
                ResultStatus::Success => "success",
                ResultStatus::Error => "error",
            }),
        );
        serde_json::Value::Object(map)
    }
}

/// Capability interface over the untyped worker boundary.
///
/// One operation: invoke the worker for a stage with its serialized argument
/// and await the terminal outcome. Implemented by [`super::PythonExecutor`]
/// for real processes and by in-process fakes in tests.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    /// Run the worker for `stage` to its terminal outcome.
    ///
    /// `arg` is the single serialized parameter object, if the stage takes
    /// one. Cancelling `cancel` terminates the worker process.
    async fn invoke(
        &self,
        stage: Stage,
        arg: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ResultRecord, WorkerError>;
}

#[async_trait]
impl StageExecutor for Box<dyn StageExecutor> {
    async fn invoke(
        &self,
        stage: Stage,
        arg: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ResultRecord, WorkerError> {
        (**self).invoke(stage, arg, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WorkerError::spawn_failed("no such file");
        assert!(err.to_string().contains("failed to start"));

        let err = WorkerError::execution_failed(Some(3), String::new(), "traceback".into());
        assert!(err.to_string().contains("3"));
        assert!(err.to_string().contains("traceback"));
    }

    #[test]
    fn test_diagnostics_prefers_stderr() {
        let err = WorkerError::execution_failed(Some(1), "out".into(), "err".into());
        assert_eq!(err.diagnostics(), Some("err"));

        let err = WorkerError::execution_failed(Some(1), "out".into(), String::new());
        assert_eq!(err.diagnostics(), Some("out"));

        let err = WorkerError::execution_failed(Some(1), String::new(), String::new());
        assert_eq!(err.diagnostics(), None);
    }

    #[test]
    fn test_record_to_json_flattens_status() {
        let mut payload = serde_json::Map::new();
        payload.insert("rmse".into(), serde_json::json!(1.2));

        let record = ResultRecord {
            stage: Stage::Train,
            status: ResultStatus::Success,
            payload,
            raw: String::new(),
        };

        let json = record.to_json();
        assert_eq!(json["status"], "success");
        assert_eq!(json["rmse"], 1.2);
    }

    #[test]
    fn test_record_message() {
        let mut payload = serde_json::Map::new();
        payload.insert("message".into(), serde_json::json!("done"));

        let record = ResultRecord {
            stage: Stage::Ingest,
            status: ResultStatus::Success,
            payload,
            raw: String::new(),
        };

        assert_eq!(record.message(), Some("done"));
        assert!(record.is_success());
    }
}
