#![allow(dead_code)]

//! Configuration loading with multi-layer merge

use crate::stage::Stage;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Resolved coordinator configuration.
///
/// All paths are absolute, rooted at the project directory. Workers run with
/// the project root as working directory, so relative paths inside worker
/// scripts resolve the same way they would when run by hand.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Python interpreter used for workers and the dependency probe.
    pub python_bin: String,

    /// Project root; working directory and `PYTHONPATH` for workers.
    pub root_dir: PathBuf,

    /// Directory holding the worker scripts.
    pub workers_dir: PathBuf,

    /// Raw data upload directory.
    pub uploads_dir: PathBuf,

    /// Worker data directory (`<workers>/data`).
    pub data_dir: PathBuf,

    /// Generated output directory (`<data>/processed`).
    pub processed_dir: PathBuf,

    /// Trained model directory (`<workers>/models`).
    pub models_dir: PathBuf,

    /// Dependency-probe script filename.
    pub dependency_check: String,

    /// Worker script filename per stage.
    scripts: HashMap<Stage, String>,
}

impl PipelineConfig {
    /// Load configuration from the standard hierarchy.
    ///
    /// Load order (later overrides earlier):
    /// 1. Built-in defaults
    /// 2. ~/.config/demandflow/config.toml
    /// 3. .demandflow/config.toml (project)
    pub fn load(project_dir: Option<&Path>) -> Result<Self> {
        let root = project_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut file = ConfigFile::default();

        if let Some(user_path) = Self::user_config_path() {
            if user_path.exists() {
                let user_file = ConfigFile::read(&user_path)
                    .with_context(|| format!("loading {}", user_path.display()))?;
                file.merge(user_file);
            }
        }

        let project_path = root.join(".demandflow/config.toml");
        if project_path.exists() {
            let project_file = ConfigFile::read(&project_path)
                .with_context(|| format!("loading {}", project_path.display()))?;
            file.merge(project_file);
        }

        Ok(file.resolve(&root))
    }

    /// Built-in defaults rooted at `root`.
    pub fn with_root(root: &Path) -> Self {
        ConfigFile::default().resolve(root)
    }

    /// Get the user config path (~/.config/demandflow/config.toml).
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("demandflow/config.toml"))
    }

    /// Absolute path of a stage's worker script.
    pub fn script_path(&self, stage: Stage) -> PathBuf {
        let name = self
            .scripts
            .get(&stage)
            .map(String::as_str)
            .unwrap_or_else(|| stage.default_script());
        self.workers_dir.join(name)
    }

    /// Absolute path of the dependency-probe script.
    pub fn dependency_check_path(&self) -> PathBuf {
        self.workers_dir.join(&self.dependency_check)
    }
}

/// On-disk configuration shape; every field optional so layers can overlay.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    python_bin: Option<String>,
    workers_dir: Option<String>,
    uploads_dir: Option<String>,
    dependency_check: Option<String>,

    #[serde(default)]
    scripts: HashMap<String, String>,
}

impl ConfigFile {
    fn read(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let file: Self =
            toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
        Ok(file)
    }

    /// Merge another layer into this one (other takes precedence).
    fn merge(&mut self, other: Self) {
        if other.python_bin.is_some() {
            self.python_bin = other.python_bin;
        }
        if other.workers_dir.is_some() {
            self.workers_dir = other.workers_dir;
        }
        if other.uploads_dir.is_some() {
            self.uploads_dir = other.uploads_dir;
        }
        if other.dependency_check.is_some() {
            self.dependency_check = other.dependency_check;
        }
        for (stage, script) in other.scripts {
            self.scripts.insert(stage, script);
        }
    }

    fn resolve(self, root: &Path) -> PipelineConfig {
        let workers_dir = root.join(expand(self.workers_dir.as_deref().unwrap_or("python")));
        let uploads_dir = root.join(expand(self.uploads_dir.as_deref().unwrap_or("uploads")));
        let data_dir = workers_dir.join("data");
        let processed_dir = data_dir.join("processed");
        let models_dir = workers_dir.join("models");

        let mut scripts = HashMap::new();
        for stage in Stage::ALL {
            let name = self
                .scripts
                .get(stage.name())
                .cloned()
                .unwrap_or_else(|| stage.default_script().to_string());
            scripts.insert(stage, name);
        }

        PipelineConfig {
            python_bin: self.python_bin.unwrap_or_else(|| "python3".to_string()),
            root_dir: root.to_path_buf(),
            workers_dir,
            uploads_dir,
            data_dir,
            processed_dir,
            models_dir,
            dependency_check: self
                .dependency_check
                .unwrap_or_else(|| "check_dependencies.py".to_string()),
            scripts,
        }
    }
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}
