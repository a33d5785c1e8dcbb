//! CLI support for demandflow
//!
//! This module provides the caller-facing response envelopes printed by the
//! binary: decoded worker records, error envelopes, artifact availability,
//! and the workflow status view. Command wiring lives in `main.rs`.

mod output;

pub use output::{ArtifactAvailability, ErrorEnvelope, StatusView, stage_failure_message};
