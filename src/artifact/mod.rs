#![allow(dead_code)]

//! Resolution of generated artifacts by logical name.
//!
//! Workers write their outputs to well-known locations that have shifted
//! over versions, so each artifact is looked up through an ordered candidate
//! list: most specific convention first, legacy name last, first existing
//! path wins. "Nothing generated yet" is an ordinary answer here, never an
//! error.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;

/// Filesystem view used for resolution.
///
/// The locator only ever asks two questions of the filesystem, so tests can
/// substitute an in-memory store. Readers must tolerate stale or absent
/// observations; workers may be rewriting these files concurrently.
pub trait FileStore: Send + Sync {
    fn exists(&self, path: &Path) -> bool;
    fn modified(&self, path: &Path) -> Option<SystemTime>;
}

/// The real filesystem.
#[derive(Debug, Default)]
pub struct OsFileStore;

impl FileStore for OsFileStore {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn modified(&self, path: &Path) -> Option<SystemTime> {
        std::fs::metadata(path).and_then(|m| m.modified()).ok()
    }
}

/// Outcome of resolving one artifact.
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Logical name the artifact was requested by.
    pub name: String,

    /// Candidate paths, in the priority order that was searched.
    pub candidates: Vec<PathBuf>,

    /// First existing candidate, if any.
    pub resolved: Option<PathBuf>,

    /// Last-modified time of the resolved path.
    pub modified: Option<DateTime<Utc>>,

    /// Stable filename to use when the artifact is exported for download.
    pub download_name: String,
}

impl Artifact {
    pub fn is_found(&self) -> bool {
        self.resolved.is_some()
    }
}

/// Errors from the locator. Note that an artifact that has not been
/// generated yet is NOT an error; only asking for a name the registry does
/// not know is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocateError {
    #[error("unknown artifact '{name}' (known: {known})")]
    UnknownArtifact { name: String, known: String },
}

struct ArtifactSpec {
    name: String,
    candidates: Vec<PathBuf>,
    download_name: String,
}

/// Resolves named artifacts against an injectable filesystem.
pub struct ArtifactLocator {
    specs: Vec<ArtifactSpec>,
    store: Box<dyn FileStore>,
}

impl ArtifactLocator {
    /// Create an empty locator over a filesystem view.
    pub fn new(store: Box<dyn FileStore>) -> Self {
        Self {
            specs: Vec::new(),
            store,
        }
    }

    /// Register an artifact with its candidates in priority order.
    pub fn with_artifact(
        mut self,
        name: impl Into<String>,
        candidates: Vec<PathBuf>,
        download_name: impl Into<String>,
    ) -> Self {
        self.specs.push(ArtifactSpec {
            name: name.into(),
            candidates,
            download_name: download_name.into(),
        });
        self
    }

    /// The standard registry of worker outputs.
    pub fn from_config(config: &crate::config::PipelineConfig) -> Self {
        Self::new(Box::new(OsFileStore))
            .with_artifact(
                "route-map",
                vec![
                    config.processed_dir.join("delivery_route_maptiler_osrm_co2.html"),
                    config.processed_dir.join("delivery_route_simple.html"),
                ],
                "delivery_route_map.html",
            )
            .with_artifact(
                "processed-data",
                vec![config.processed_dir.join("m5_preprocessed_sample.csv")],
                "m5_preprocessed_sample.csv",
            )
            .with_artifact(
                "model",
                vec![config.models_dir.join("lgbm_model.txt")],
                "lgbm_model.txt",
            )
    }

    /// Known artifact names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.specs.iter().map(|s| s.name.as_str()).collect()
    }

    /// Resolve an artifact by logical name.
    ///
    /// Candidates are tried in fixed priority order and the first existing
    /// path wins; if none exists the returned artifact simply has no
    /// resolved path.
    pub fn resolve(&self, name: &str) -> Result<Artifact, LocateError> {
        let spec = self
            .specs
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| LocateError::UnknownArtifact {
                name: name.to_string(),
                known: self.names().join(", "),
            })?;

        let resolved = spec
            .candidates
            .iter()
            .find(|path| self.store.exists(path))
            .cloned();

        let modified = resolved
            .as_deref()
            .and_then(|path| self.store.modified(path))
            .map(DateTime::<Utc>::from);

        if let Some(ref path) = resolved {
            tracing::debug!(name, path = %path.display(), "artifact resolved");
        } else {
            tracing::debug!(name, "artifact not generated yet");
        }

        Ok(Artifact {
            name: spec.name.clone(),
            candidates: spec.candidates.clone(),
            resolved,
            modified,
            download_name: spec.download_name.clone(),
        })
    }
}
