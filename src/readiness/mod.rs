//! Environment readiness probes.
//!
//! Each leaf probe answers one boolean question about the deployment:
//! interpreter dependencies installed, worker scripts present, data
//! directories present. Every leaf is evaluated on every check, even after
//! an earlier one has failed, so the report always shows exactly which
//! checks are unsatisfied. A false leaf is an expected state, not an error.

use crate::config::PipelineConfig;
use crate::stage::Stage;
use serde::Serialize;
use std::process::Stdio;
use tokio::process::Command;

/// One probe per worker script.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ScriptProbes {
    pub ingest: bool,
    pub train: bool,
    pub predict: bool,
    pub route: bool,
}

impl ScriptProbes {
    /// Group-level AND.
    pub fn all(&self) -> bool {
        self.ingest && self.train && self.predict && self.route
    }
}

/// One probe per required data directory.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DirectoryProbes {
    pub uploads: bool,
    pub data: bool,
    pub models: bool,
}

impl DirectoryProbes {
    /// Group-level AND.
    pub fn all(&self) -> bool {
        self.uploads && self.data && self.models
    }
}

/// All leaf probes, grouped.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Checks {
    /// The coordinator itself; constant true while it can answer at all.
    pub server: bool,

    /// Python runtime with worker dependencies installed.
    pub python: bool,

    pub scripts: ScriptProbes,
    pub directories: DirectoryProbes,
}

/// Readiness verdict: the leaf tree plus the derived top-level `ready`.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessReport {
    pub status: &'static str,
    pub timestamp: String,
    pub system: &'static str,
    pub version: &'static str,
    pub checks: Checks,
    pub ready: bool,
    pub message: &'static str,
}

impl ReadinessReport {
    fn from_checks(checks: Checks) -> Self {
        let ready =
            checks.server && checks.python && checks.scripts.all() && checks.directories.all();

        Self {
            status: if ready { "healthy" } else { "warning" },
            timestamp: chrono::Utc::now().to_rfc3339(),
            system: "demandflow",
            version: env!("CARGO_PKG_VERSION"),
            checks,
            ready,
            message: if ready {
                "all systems operational, ready for forecasting"
            } else {
                "some components need attention, check the leaves above"
            },
        }
    }
}

/// Evaluates the readiness report against the configured environment.
pub struct ReadinessChecker {
    config: PipelineConfig,
}

impl ReadinessChecker {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Evaluate every leaf and aggregate. No short-circuiting.
    pub async fn check(&self) -> ReadinessReport {
        let python = self.probe_python().await;

        let scripts = ScriptProbes {
            ingest: self.config.script_path(Stage::Ingest).exists(),
            train: self.config.script_path(Stage::Train).exists(),
            predict: self.config.script_path(Stage::Predict).exists(),
            route: self.config.script_path(Stage::Route).exists(),
        };

        let directories = DirectoryProbes {
            uploads: self.config.uploads_dir.exists(),
            data: self.config.data_dir.exists(),
            models: self.config.models_dir.exists(),
        };

        let report = ReadinessReport::from_checks(Checks {
            server: true,
            python,
            scripts,
            directories,
        });

        tracing::debug!(ready = report.ready, "readiness evaluated");
        report
    }

    /// Run the dependency-check worker; exit 0 means the runtime is usable.
    ///
    /// A probe that cannot execute at all (missing script, spawn error)
    /// degrades this one leaf to false without affecting the others.
    async fn probe_python(&self) -> bool {
        let script = self.config.dependency_check_path();
        if !script.exists() {
            return false;
        }

        Command::new(&self.config.python_bin)
            .arg(&script)
            .current_dir(&self.config.root_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Full deployment layout with `sh` standing in for the interpreter.
    fn ready_environment(dir: &TempDir) -> PipelineConfig {
        let root = dir.path();
        std::fs::create_dir_all(root.join("python/data")).unwrap();
        std::fs::create_dir_all(root.join("python/models")).unwrap();
        std::fs::create_dir_all(root.join("uploads")).unwrap();

        for name in ["app.py", "model.py", "pred.py", "route.py"] {
            std::fs::write(root.join("python").join(name), "").unwrap();
        }
        std::fs::write(root.join("python/check_dependencies.py"), "exit 0\n").unwrap();

        let mut config = PipelineConfig::with_root(root);
        config.python_bin = "sh".to_string();
        config
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_complete_environment_is_ready() {
        let dir = TempDir::new().unwrap();
        let checker = ReadinessChecker::new(ready_environment(&dir));

        let report = checker.check().await;

        assert!(report.ready);
        assert_eq!(report.status, "healthy");
        assert!(report.checks.python);
        assert!(report.checks.scripts.all());
        assert!(report.checks.directories.all());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_single_false_leaf_is_individually_visible() {
        let dir = TempDir::new().unwrap();
        let config = ready_environment(&dir);
        std::fs::remove_file(config.script_path(Stage::Predict)).unwrap();

        let report = ReadinessChecker::new(config).check().await;

        assert!(!report.ready);
        assert_eq!(report.status, "warning");
        // Only the one leaf is false; everything else was still evaluated.
        assert!(!report.checks.scripts.predict);
        assert!(report.checks.scripts.ingest);
        assert!(report.checks.scripts.train);
        assert!(report.checks.scripts.route);
        assert!(!report.checks.scripts.all());
        assert!(report.checks.python);
        assert!(report.checks.directories.all());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_dependency_probe_degrades_python_leaf_only() {
        let dir = TempDir::new().unwrap();
        let config = ready_environment(&dir);
        std::fs::write(config.dependency_check_path(), "exit 1\n").unwrap();

        let report = ReadinessChecker::new(config).check().await;

        assert!(!report.checks.python);
        assert!(report.checks.scripts.all());
        assert!(report.checks.directories.all());
        assert!(!report.ready);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unspawnable_probe_degrades_python_leaf_only() {
        let dir = TempDir::new().unwrap();
        let mut config = ready_environment(&dir);
        config.python_bin = "definitely_not_a_real_interpreter_12345".to_string();

        let report = ReadinessChecker::new(config).check().await;

        // The probe subprocess could not even start; the leaf is false and
        // the rest of the report is still complete.
        assert!(!report.checks.python);
        assert!(report.checks.scripts.all());
        assert!(report.checks.directories.all());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_probe_script_degrades_python_leaf() {
        let dir = TempDir::new().unwrap();
        let config = ready_environment(&dir);
        std::fs::remove_file(config.dependency_check_path()).unwrap();

        let report = ReadinessChecker::new(config).check().await;
        assert!(!report.checks.python);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_directory_leaf() {
        let dir = TempDir::new().unwrap();
        let config = ready_environment(&dir);
        std::fs::remove_dir_all(&config.uploads_dir).unwrap();

        let report = ReadinessChecker::new(config).check().await;

        assert!(!report.checks.directories.uploads);
        assert!(report.checks.directories.data);
        assert!(report.checks.directories.models);
        assert!(!report.ready);
    }

    #[test]
    fn test_report_serializes_as_nested_booleans() {
        let report = ReadinessReport::from_checks(Checks {
            server: true,
            python: false,
            scripts: ScriptProbes {
                ingest: true,
                train: true,
                predict: true,
                route: true,
            },
            directories: DirectoryProbes {
                uploads: true,
                data: true,
                models: true,
            },
        });

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["ready"], false);
        assert_eq!(json["checks"]["python"], false);
        assert_eq!(json["checks"]["server"], true);
        assert_eq!(json["checks"]["scripts"]["ingest"], true);
        assert_eq!(json["checks"]["directories"]["uploads"], true);
    }
}
