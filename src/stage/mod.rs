//! The fixed four-stage pipeline and per-stage parameters.
//!
//! Stages form a straight dependency chain: ingest → train → predict →
//! route. Each stage is computed by an external Python worker script that
//! receives at most one argument, a JSON-serialized parameter object.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One node of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Ingest and preprocess the raw sales data.
    Ingest,
    /// Train the forecasting model on preprocessed data.
    Train,
    /// Generate demand predictions from the trained model.
    Predict,
    /// Optimize delivery routes from the predictions.
    Route,
}

impl Stage {
    /// All stages in dependency order.
    pub const ALL: [Stage; 4] = [Stage::Ingest, Stage::Train, Stage::Predict, Stage::Route];

    /// The stage that must complete before this one may run.
    pub fn predecessor(self) -> Option<Stage> {
        match self {
            Stage::Ingest => None,
            Stage::Train => Some(Stage::Ingest),
            Stage::Predict => Some(Stage::Train),
            Stage::Route => Some(Stage::Predict),
        }
    }

    /// Default worker script filename for this stage.
    pub fn default_script(self) -> &'static str {
        match self {
            Stage::Ingest => "app.py",
            Stage::Train => "model.py",
            Stage::Predict => "pred.py",
            Stage::Route => "route.py",
        }
    }

    /// Named artifact that must already exist before this stage is invoked.
    ///
    /// Training reads the preprocessed dataset from disk rather than from the
    /// ingest worker's output, so its presence is checked before spawning.
    pub fn required_input(self) -> Option<&'static str> {
        match self {
            Stage::Train => Some("processed-data"),
            _ => None,
        }
    }

    /// Stable lowercase name, also used as the config key.
    pub fn name(self) -> &'static str {
        match self {
            Stage::Ingest => "ingest",
            Stage::Train => "train",
            Stage::Predict => "predict",
            Stage::Route => "route",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Stage {
    type Err = ParamsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            // "preprocess" is the legacy name for the ingest stage
            "ingest" | "preprocess" => Ok(Stage::Ingest),
            "train" => Ok(Stage::Train),
            "predict" => Ok(Stage::Predict),
            "route" => Ok(Stage::Route),
            other => Err(ParamsError::UnknownStage {
                name: other.to_string(),
            }),
        }
    }
}

/// Errors building stage parameters.
#[derive(Debug, Error)]
pub enum ParamsError {
    #[error("unknown stage '{name}' (expected ingest, train, predict, or route)")]
    UnknownStage { name: String },

    #[error("stage '{stage}' does not take parameters")]
    UnexpectedParams { stage: Stage },

    #[error("invalid parameters for stage '{stage}': {source}")]
    Invalid {
        stage: Stage,
        source: serde_json::Error,
    },
}

/// Parameters for the predict stage.
///
/// All fields are optional; the worker substitutes its own defaults for
/// anything missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictParams {
    pub category: Option<String>,
    pub store: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Parameters for the route stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteParams {
    #[serde(default = "default_demand_threshold")]
    pub demand_threshold: f64,

    #[serde(default = "default_top_stores")]
    pub top_stores: u32,
}

fn default_demand_threshold() -> f64 {
    10.0
}

fn default_top_stores() -> u32 {
    5
}

impl Default for RouteParams {
    fn default() -> Self {
        Self {
            demand_threshold: default_demand_threshold(),
            top_stores: default_top_stores(),
        }
    }
}

/// Typed parameters for a stage invocation.
#[derive(Debug, Clone)]
pub enum StageParams {
    /// Ingest and train take no parameters.
    None,
    Predict(PredictParams),
    Route(RouteParams),
}

impl StageParams {
    /// Build parameters for a stage from an optional raw JSON object.
    ///
    /// Ingest and train reject any parameters; predict and route decode the
    /// object against their schema (missing object means defaults).
    pub fn from_json(stage: Stage, raw: Option<serde_json::Value>) -> Result<Self, ParamsError> {
        match (stage, raw) {
            (Stage::Ingest | Stage::Train, None) => Ok(StageParams::None),
            (Stage::Ingest | Stage::Train, Some(_)) => {
                Err(ParamsError::UnexpectedParams { stage })
            }
            (Stage::Predict, raw) => {
                let value = raw.unwrap_or_else(|| serde_json::json!({}));
                let params = serde_json::from_value(value)
                    .map_err(|source| ParamsError::Invalid { stage, source })?;
                Ok(StageParams::Predict(params))
            }
            (Stage::Route, raw) => {
                let value = raw.unwrap_or_else(|| serde_json::json!({}));
                let params = serde_json::from_value(value)
                    .map_err(|source| ParamsError::Invalid { stage, source })?;
                Ok(StageParams::Route(params))
            }
        }
    }

    /// Serialize to the single JSON argument passed to the worker, if any.
    pub fn to_arg(&self) -> Result<Option<String>, serde_json::Error> {
        match self {
            StageParams::None => Ok(None),
            StageParams::Predict(p) => Ok(Some(serde_json::to_string(p)?)),
            StageParams::Route(p) => Ok(Some(serde_json::to_string(p)?)),
        }
    }
}
