//! Workflow progress tracking and stage gating.
//!
//! This module owns the session-scoped view of pipeline progress:
//! - which stages have completed (monotonic, membership only)
//! - which stages have an invocation in flight
//! - whether a given stage may be invoked right now
//!
//! The tracker is shared by `Arc` across every consumer so that progress
//! survives caller context changes; it is never persisted across sessions.

pub mod gate;
pub mod state;

pub use gate::{GateError, allowed};
pub use state::{RunningGuard, SessionTracker, WorkflowSnapshot};
