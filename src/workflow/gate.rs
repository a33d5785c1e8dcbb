//! Pure stage gating.
//!
//! The gate is a side-effect-free predicate over a state snapshot. Callers
//! must consult it before spawning anything; [`SessionTracker::begin`]
//! (in [`super::state`]) evaluates it atomically with claiming the running
//! flag.
//!
//! [`SessionTracker::begin`]: super::state::SessionTracker::begin

use crate::stage::Stage;
use crate::workflow::state::WorkflowSnapshot;
use thiserror::Error;

/// Synchronous gate rejections. No process is spawned and no state changes
/// when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    /// A predecessor stage has not completed.
    #[error("stage '{stage}' requires stage '{missing}' to complete first")]
    NotReady { stage: Stage, missing: Stage },

    /// An invocation for this stage is already in flight.
    #[error("stage '{stage}' is already running")]
    AlreadyRunning { stage: Stage },
}

/// True iff every predecessor of `stage` is completed and `stage` itself is
/// not currently running.
pub fn allowed(state: &WorkflowSnapshot, stage: Stage) -> bool {
    check(state, stage).is_ok()
}

/// Like [`allowed`], but reporting which condition failed.
pub fn check(state: &WorkflowSnapshot, stage: Stage) -> Result<(), GateError> {
    if let Some(missing) = stage.predecessor().filter(|p| !state.is_complete(*p)) {
        return Err(GateError::NotReady { stage, missing });
    }
    if state.is_running(stage) {
        return Err(GateError::AlreadyRunning { stage });
    }
    Ok(())
}
