//! Session-scoped workflow state.
//!
//! Progress lives for the whole session, not for any single caller context:
//! an invocation that keeps running while the user looks elsewhere still
//! lands its result here, and a re-query observes exactly what continuous
//! observation would have.

use crate::stage::Stage;
use crate::workflow::gate::{self, GateError};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// View of workflow progress at one instant.
///
/// Membership only: completed stages carry no ordering beyond the fixed
/// dependency chain, and are never removed once present.
#[derive(Debug, Clone, Default)]
pub struct WorkflowSnapshot {
    completed: HashSet<Stage>,
    running: HashSet<Stage>,
}

impl WorkflowSnapshot {
    pub fn is_complete(&self, stage: Stage) -> bool {
        self.completed.contains(&stage)
    }

    pub fn is_running(&self, stage: Stage) -> bool {
        self.running.contains(&stage)
    }

    /// Completed stages in dependency order.
    pub fn completed(&self) -> Vec<Stage> {
        Stage::ALL
            .into_iter()
            .filter(|s| self.completed.contains(s))
            .collect()
    }

    /// Running stages in dependency order.
    pub fn running(&self) -> Vec<Stage> {
        Stage::ALL
            .into_iter()
            .filter(|s| self.running.contains(s))
            .collect()
    }
}

/// Source of truth for completed and in-flight stages, shared by `Arc`
/// across every consumer for the lifetime of the session.
///
/// All mutation goes through [`mark_complete`](Self::mark_complete) and the
/// running-flag operations; changes are visible to all dependents as soon as
/// the lock is released.
#[derive(Debug, Default)]
pub struct SessionTracker {
    inner: Mutex<WorkflowSnapshot>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, WorkflowSnapshot> {
        // A panicking holder can only have observed consistent state; the
        // snapshot stays valid, so poison is recoverable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record a stage as completed. Idempotent.
    pub fn mark_complete(&self, stage: Stage) {
        let newly = self.lock().completed.insert(stage);
        if newly {
            tracing::info!(%stage, "stage completed");
        }
    }

    pub fn is_complete(&self, stage: Stage) -> bool {
        self.lock().is_complete(stage)
    }

    /// Toggle a stage's running flag.
    pub fn set_running(&self, stage: Stage, running: bool) {
        let mut state = self.lock();
        if running {
            state.running.insert(stage);
        } else {
            state.running.remove(&stage);
        }
    }

    pub fn is_running(&self, stage: Stage) -> bool {
        self.lock().is_running(stage)
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> WorkflowSnapshot {
        self.lock().clone()
    }

    /// Atomically gate-check a stage and claim its running flag.
    ///
    /// The gate evaluation and the flag update happen under one lock, so two
    /// concurrent callers for the same stage cannot both pass: exactly one
    /// receives the guard, the other a [`GateError::AlreadyRunning`]. The
    /// returned guard releases the flag when dropped, on every exit path.
    pub fn begin(self: Arc<Self>, stage: Stage) -> Result<RunningGuard, GateError> {
        let mut state = self.lock();
        gate::check(&state, stage)?;
        state.running.insert(stage);
        drop(state);

        Ok(RunningGuard {
            tracker: self,
            stage,
        })
    }
}

/// Holds a stage's running flag for the duration of one invocation.
#[derive(Debug)]
pub struct RunningGuard {
    tracker: Arc<SessionTracker>,
    stage: Stage,
}

impl RunningGuard {
    pub fn stage(&self) -> Stage {
        self.stage
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.tracker.set_running(self.stage, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_tracker_is_empty() {
        let tracker = SessionTracker::new();
        for stage in Stage::ALL {
            assert!(!tracker.is_complete(stage));
            assert!(!tracker.is_running(stage));
        }
    }

    #[test]
    fn test_mark_complete_is_idempotent() {
        let tracker = SessionTracker::new();
        tracker.mark_complete(Stage::Train);
        tracker.mark_complete(Stage::Train);

        assert!(tracker.is_complete(Stage::Train));
        assert_eq!(tracker.snapshot().completed(), vec![Stage::Train]);
    }

    #[test]
    fn test_completion_is_monotonic() {
        let tracker = SessionTracker::new();
        tracker.mark_complete(Stage::Ingest);
        tracker.mark_complete(Stage::Train);

        // Re-completing an earlier stage never clears downstream stages.
        tracker.mark_complete(Stage::Ingest);
        assert!(tracker.is_complete(Stage::Train));
    }

    #[test]
    fn test_set_running_toggles() {
        let tracker = SessionTracker::new();
        tracker.set_running(Stage::Predict, true);
        assert!(tracker.is_running(Stage::Predict));

        tracker.set_running(Stage::Predict, false);
        assert!(!tracker.is_running(Stage::Predict));
    }

    #[test]
    fn test_begin_claims_and_guard_releases() {
        let tracker = Arc::new(SessionTracker::new());

        let guard = Arc::clone(&tracker).begin(Stage::Ingest).unwrap();
        assert_eq!(guard.stage(), Stage::Ingest);
        assert!(tracker.is_running(Stage::Ingest));

        drop(guard);
        assert!(!tracker.is_running(Stage::Ingest));
    }

    #[test]
    fn test_begin_rejects_second_claim() {
        let tracker = Arc::new(SessionTracker::new());

        let _guard = Arc::clone(&tracker).begin(Stage::Ingest).unwrap();
        let second = Arc::clone(&tracker).begin(Stage::Ingest);

        assert!(matches!(second, Err(GateError::AlreadyRunning { .. })));
    }

    #[test]
    fn test_begin_rejects_unmet_dependency() {
        let tracker = Arc::new(SessionTracker::new());

        let result = Arc::clone(&tracker).begin(Stage::Train);
        assert!(matches!(result, Err(GateError::NotReady { .. })));
        assert!(!tracker.is_running(Stage::Train));
    }

    #[test]
    fn test_concurrent_begin_yields_one_holder() {
        let tracker = Arc::new(SessionTracker::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || match Arc::clone(&tracker).begin(Stage::Ingest) {
                    Ok(guard) => {
                        // While held, nobody else may pass the gate.
                        let overlapping = Arc::clone(&tracker).begin(Stage::Ingest).is_ok();
                        drop(guard);
                        (true, overlapping)
                    }
                    Err(_) => (false, false),
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.iter().any(|(won, _)| *won));
        assert!(results.iter().all(|(_, overlapping)| !overlapping));
    }

    #[test]
    fn test_snapshot_is_detached_copy() {
        let tracker = SessionTracker::new();
        let before = tracker.snapshot();

        tracker.mark_complete(Stage::Ingest);

        assert!(!before.is_complete(Stage::Ingest));
        assert!(tracker.snapshot().is_complete(Stage::Ingest));
    }
}
