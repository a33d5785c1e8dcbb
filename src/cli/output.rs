//! Caller-facing response envelopes.
//!
//! Shapes match what embedding callers and scripts consume: a decoded worker
//! record flattens to the worker's own JSON, failures wrap in a uniform
//! error envelope, artifact queries answer with availability rather than
//! errors.

use crate::artifact::Artifact;
use crate::pipeline::PipelineError;
use crate::stage::Stage;
use crate::workflow::{WorkflowSnapshot, allowed};
use serde::Serialize;

/// Uniform failure envelope for invoke-stage operations.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub status: &'static str,
    pub message: String,
    pub error: String,
}

impl ErrorEnvelope {
    /// Envelope for a failed stage invocation.
    pub fn for_stage(stage: Stage, err: &PipelineError) -> Self {
        Self {
            status: "error",
            message: stage_failure_message(stage).to_string(),
            error: err.to_string(),
        }
    }

    /// Envelope for failures not tied to a stage.
    pub fn new(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status: "error",
            message: message.into(),
            error: error.into(),
        }
    }
}

/// Human summary used in error envelopes, one per stage.
pub fn stage_failure_message(stage: Stage) -> &'static str {
    match stage {
        Stage::Ingest => "Data preprocessing failed",
        Stage::Train => "Model training failed",
        Stage::Predict => "Prediction generation failed",
        Stage::Route => "Route optimization failed",
    }
}

/// Answer to an artifact-availability query.
///
/// `not_found` is an ordinary answer meaning "nothing generated yet"; it
/// shares the envelope with the found case so callers render both the same
/// way.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactAvailability {
    pub status: &'static str,
    pub message: String,
    pub has_artifact: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_generated: Option<String>,
}

impl From<&Artifact> for ArtifactAvailability {
    fn from(artifact: &Artifact) -> Self {
        match &artifact.resolved {
            Some(path) => Self {
                status: "success",
                message: format!("Artifact '{}' is available", artifact.name),
                has_artifact: true,
                url: Some(path.display().to_string()),
                last_generated: artifact.modified.map(|t| t.to_rfc3339()),
            },
            None => Self {
                status: "not_found",
                message: format!(
                    "No '{}' available. Run the producing stage first.",
                    artifact.name
                ),
                has_artifact: false,
                url: None,
                last_generated: None,
            },
        }
    }
}

/// Workflow progress view for the status command.
#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub completed: Vec<Stage>,
    pub running: Vec<Stage>,

    /// First stage that is not yet complete and would pass the gate now.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<Stage>,
}

impl From<&WorkflowSnapshot> for StatusView {
    fn from(snapshot: &WorkflowSnapshot) -> Self {
        let next = Stage::ALL
            .into_iter()
            .find(|s| !snapshot.is_complete(*s) && allowed(snapshot, *s));

        Self {
            completed: snapshot.completed(),
            running: snapshot.running(),
            next,
        }
    }
}
