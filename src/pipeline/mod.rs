#![allow(dead_code)]

//! Stage orchestration: gate, invoke, record.
//!
//! The pipeline ties the pieces together for one stage invocation:
//! serialize parameters, pass the gate and claim the running flag atomically,
//! check required input artifacts, hand off to the worker executor, and on a
//! successful result mark the stage complete. Failures of any kind leave
//! previously completed stages untouched.

use crate::artifact::{ArtifactLocator, LocateError};
use crate::stage::{Stage, StageParams};
use crate::worker::{CancellationToken, PythonExecutor, ResultRecord, StageExecutor, WorkerError};
use crate::workflow::{GateError, RunningGuard, SessionTracker};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

/// Failures of a stage invocation, from gate rejection to worker defects.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Rejected synchronously by the gate; nothing was spawned.
    #[error(transparent)]
    Gate(#[from] GateError),

    /// A required generated input is missing; nothing was spawned.
    #[error("stage '{stage}' requires generated input '{artifact}'; run its producing stage first")]
    MissingInput { stage: Stage, artifact: String },

    /// Stage parameters could not be serialized for the worker.
    #[error("failed to serialize stage parameters: {0}")]
    Params(#[from] serde_json::Error),

    /// The worker failed to start, failed during execution, or was cancelled.
    #[error(transparent)]
    Worker(#[from] WorkerError),

    /// An artifact name not present in the registry was consulted.
    #[error(transparent)]
    Locate(#[from] LocateError),

    /// The background invocation task itself died.
    #[error("invocation task failed: {message}")]
    Join { message: String },
}

impl PipelineError {
    /// True for rejections that happen before any process is spawned.
    pub fn is_synchronous_rejection(&self) -> bool {
        matches!(
            self,
            PipelineError::Gate(_)
                | PipelineError::MissingInput { .. }
                | PipelineError::Params(_)
                | PipelineError::Locate(_)
        )
    }
}

/// Coordinator for the four-stage pipeline.
///
/// Holds the session tracker, the worker executor, and the artifact
/// registry. Cheap to share: all state is behind `Arc`.
#[derive(Clone)]
pub struct Pipeline {
    tracker: Arc<SessionTracker>,
    executor: Arc<dyn StageExecutor>,
    locator: Arc<ArtifactLocator>,
}

impl Pipeline {
    pub fn new(executor: Arc<dyn StageExecutor>, locator: Arc<ArtifactLocator>) -> Self {
        Self {
            tracker: Arc::new(SessionTracker::new()),
            executor,
            locator,
        }
    }

    /// Pipeline over real Python workers, per configuration.
    pub fn from_config(config: &crate::config::PipelineConfig) -> Self {
        Self::new(
            Arc::new(PythonExecutor::from_config(config)),
            Arc::new(ArtifactLocator::from_config(config)),
        )
    }

    /// The session-scoped progress tracker.
    pub fn tracker(&self) -> &Arc<SessionTracker> {
        &self.tracker
    }

    /// The artifact registry this pipeline consults.
    pub fn locator(&self) -> &Arc<ArtifactLocator> {
        &self.locator
    }

    /// Everything that must succeed before a process may be spawned.
    ///
    /// On success the stage's running flag is held by the returned guard;
    /// every error path before that leaves no trace in the tracker.
    fn preflight(
        &self,
        stage: Stage,
        params: &StageParams,
    ) -> Result<(RunningGuard, Option<String>), PipelineError> {
        let arg = params.to_arg()?;
        let guard = Arc::clone(&self.tracker).begin(stage)?;

        if let Some(name) = stage.required_input() {
            let artifact = self.locator.resolve(name)?;
            if !artifact.is_found() {
                // guard drops here, releasing the running flag
                return Err(PipelineError::MissingInput {
                    stage,
                    artifact: name.to_string(),
                });
            }
        }

        Ok((guard, arg))
    }

    /// Invoke a stage and await its terminal outcome.
    pub async fn run_stage(
        &self,
        stage: Stage,
        params: &StageParams,
        cancel: &CancellationToken,
    ) -> Result<ResultRecord, PipelineError> {
        let (guard, arg) = self.preflight(stage, params)?;
        execute(
            Arc::clone(&self.executor),
            Arc::clone(&self.tracker),
            guard,
            arg,
            cancel.clone(),
        )
        .await
    }

    /// Start a stage invocation without awaiting it.
    ///
    /// Gate and input rejections still happen synchronously, before any
    /// process starts. The returned handle may be dropped: the invocation
    /// keeps running and its outcome still lands in the tracker; only an
    /// explicit [`InvocationHandle::cancel`] terminates the worker.
    pub fn spawn_stage(
        &self,
        stage: Stage,
        params: &StageParams,
    ) -> Result<InvocationHandle, PipelineError> {
        let (guard, arg) = self.preflight(stage, params)?;
        let cancel = CancellationToken::new();

        let join = tokio::spawn(execute(
            Arc::clone(&self.executor),
            Arc::clone(&self.tracker),
            guard,
            arg,
            cancel.clone(),
        ));

        Ok(InvocationHandle {
            stage,
            cancel,
            join,
        })
    }
}

/// Drive one claimed invocation to its terminal outcome and record it.
async fn execute(
    executor: Arc<dyn StageExecutor>,
    tracker: Arc<SessionTracker>,
    guard: RunningGuard,
    arg: Option<String>,
    cancel: CancellationToken,
) -> Result<ResultRecord, PipelineError> {
    let stage = guard.stage();
    let result = executor.invoke(stage, arg.as_deref(), &cancel).await;

    match result {
        Ok(record) => {
            if record.is_success() {
                tracker.mark_complete(stage);
            } else {
                tracing::warn!(%stage, message = ?record.message(), "worker reported an error");
            }
            drop(guard);
            Ok(record)
        }
        Err(err) => {
            tracing::warn!(%stage, %err, "stage invocation failed");
            drop(guard);
            Err(err.into())
        }
    }
}

/// Handle to an in-flight stage invocation.
///
/// Dropping the handle detaches the invocation; it is never an implicit
/// cancel.
#[derive(Debug)]
pub struct InvocationHandle {
    stage: Stage,
    cancel: CancellationToken,
    join: JoinHandle<Result<ResultRecord, PipelineError>>,
}

impl InvocationHandle {
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Explicitly cancel: the worker process is terminated and the
    /// invocation resolves to a `Cancelled` outcome.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Await the terminal outcome.
    pub async fn wait(self) -> Result<ResultRecord, PipelineError> {
        match self.join.await {
            Ok(result) => result,
            Err(e) => Err(PipelineError::Join {
                message: e.to_string(),
            }),
        }
    }
}
