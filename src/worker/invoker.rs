//! Python worker process invoker.

use crate::process::{exit_code, kill_and_reap};
use crate::stage::Stage;
use crate::worker::CancellationToken;
use crate::worker::protocol::parse_result;
use crate::worker::types::{ResultRecord, StageExecutor, WorkerError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// Executor that runs stage workers as Python subprocesses.
///
/// Workers run with the project root as working directory, `PYTHONPATH`
/// pointing at it, and UTF-8 forced on their stdio. Stdout and stderr are
/// captured incrementally and independently while the worker runs; captured
/// lines are surfaced through tracing for live feedback but only the parsed
/// result at process exit is authoritative.
#[derive(Debug, Clone)]
pub struct PythonExecutor {
    /// Interpreter binary, e.g. `python3`.
    python_bin: String,

    /// Working directory for workers, also used for module resolution.
    working_dir: PathBuf,

    /// Worker script per stage.
    scripts: HashMap<Stage, PathBuf>,
}

impl PythonExecutor {
    /// Create an executor with no scripts registered.
    pub fn new(python_bin: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            python_bin: python_bin.into(),
            working_dir: working_dir.into(),
            scripts: HashMap::new(),
        }
    }

    /// Register the worker script for a stage.
    pub fn with_script(mut self, stage: Stage, script: impl Into<PathBuf>) -> Self {
        self.scripts.insert(stage, script.into());
        self
    }

    /// Build an executor from loaded configuration.
    pub fn from_config(config: &crate::config::PipelineConfig) -> Self {
        let mut executor = Self::new(config.python_bin.clone(), config.root_dir.clone());
        for stage in Stage::ALL {
            executor = executor.with_script(stage, config.script_path(stage));
        }
        executor
    }

    fn script_for(&self, stage: Stage) -> Result<&PathBuf, WorkerError> {
        self.scripts.get(&stage).ok_or_else(|| {
            WorkerError::spawn_failed(format!("no worker script registered for stage '{stage}'"))
        })
    }

    fn build_command(&self, script: &PathBuf, arg: Option<&str>) -> Command {
        let mut cmd = Command::new(&self.python_bin);
        cmd.arg(script);

        if let Some(arg) = arg {
            cmd.arg(arg);
        }

        cmd.current_dir(&self.working_dir);
        cmd.env("PYTHONPATH", &self.working_dir);
        cmd.env("PYTHONIOENCODING", "utf-8");

        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.stdin(Stdio::null());

        cmd
    }
}

#[async_trait]
impl StageExecutor for PythonExecutor {
    async fn invoke(
        &self,
        stage: Stage,
        arg: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ResultRecord, WorkerError> {
        let start = Instant::now();
        let script = self.script_for(stage)?;

        // A missing script is a deployment defect, reported before any
        // process is attempted.
        if !script.exists() {
            return Err(WorkerError::spawn_failed(format!(
                "worker script not found at {}",
                script.display()
            )));
        }

        tracing::info!(
            %stage,
            script = %script.display(),
            has_arg = arg.is_some(),
            "spawning worker"
        );

        let mut cmd = self.build_command(script, arg);
        let mut child = cmd.spawn().map_err(|e| {
            WorkerError::spawn_failed(format!(
                "failed to spawn '{} {}': {}",
                self.python_bin,
                script.display(),
                e
            ))
        })?;

        let stdout = child.stdout.take().expect("stdout piped");
        let stderr = child.stderr.take().expect("stderr piped");

        let mut stdout_reader = BufReader::new(stdout).lines();
        let mut stderr_reader = BufReader::new(stderr).lines();

        let mut stdout_lines: Vec<String> = Vec::new();
        let mut stderr_lines: Vec<String> = Vec::new();

        let mut stdout_done = false;
        let mut stderr_done = false;
        let mut cancel = cancel.clone();

        while !(stdout_done && stderr_done) {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(%stage, "cancelling worker");
                    kill_and_reap(&mut child).await;
                    let partial = if stdout_lines.is_empty() {
                        None
                    } else {
                        Some(stdout_lines.join("\n"))
                    };
                    return Err(WorkerError::Cancelled {
                        elapsed: start.elapsed(),
                        partial_output: partial,
                    });
                }
                line = stdout_reader.next_line(), if !stdout_done => {
                    match line {
                        Ok(Some(line)) => {
                            tracing::debug!(%stage, "worker stdout: {line}");
                            stdout_lines.push(line);
                        }
                        Ok(None) => stdout_done = true,
                        Err(e) => {
                            tracing::warn!(%stage, "worker stdout read error: {e}");
                            stdout_done = true;
                        }
                    }
                }
                line = stderr_reader.next_line(), if !stderr_done => {
                    match line {
                        Ok(Some(line)) => {
                            tracing::debug!(%stage, "worker stderr: {line}");
                            stderr_lines.push(line);
                        }
                        Ok(None) => stderr_done = true,
                        Err(e) => {
                            tracing::warn!(%stage, "worker stderr read error: {e}");
                            stderr_done = true;
                        }
                    }
                }
            }
        }

        let status = child.wait().await.map_err(|e| {
            WorkerError::spawn_failed(format!("failed to wait for worker: {e}"))
        })?;

        let stdout_text = stdout_lines.join("\n");
        let stderr_text = stderr_lines.join("\n");
        let code = exit_code(&status);

        tracing::info!(
            %stage,
            ?code,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "worker exited"
        );

        if status.success() {
            Ok(parse_result(stage, &stdout_text))
        } else {
            Err(WorkerError::execution_failed(code, stdout_text, stderr_text))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::types::ResultStatus;
    use std::io::Write;
    use tempfile::TempDir;

    /// Executor whose "python" is `sh`, running shell scripts as workers.
    fn sh_executor(dir: &TempDir) -> PythonExecutor {
        PythonExecutor::new("sh", dir.path())
    }

    fn write_script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{body}").unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invoke_parses_trailer() {
        let dir = TempDir::new().unwrap();
        let script = write_script(
            &dir,
            "train.sh",
            r#"echo "loading..."
echo '{"status":"success","rmse":1.2}'"#,
        );

        let executor = sh_executor(&dir).with_script(Stage::Train, script);
        let record = executor
            .invoke(Stage::Train, None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(record.status, ResultStatus::Success);
        assert_eq!(record.payload["rmse"], 1.2);
        assert!(record.raw.contains("loading..."));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invoke_passes_single_json_arg() {
        let dir = TempDir::new().unwrap();
        let script = write_script(
            &dir,
            "predict.sh",
            r#"printf '{"status":"success","got":%s}\n' "$#""#,
        );

        let executor = sh_executor(&dir).with_script(Stage::Predict, script);
        let record = executor
            .invoke(
                Stage::Predict,
                Some(r#"{"category":"HOBBIES"}"#),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        // Exactly one argument reached the worker.
        assert_eq!(record.payload["got"], 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_execution_failed() {
        let dir = TempDir::new().unwrap();
        let script = write_script(
            &dir,
            "broken.sh",
            r#"echo "partial output"
echo "Traceback: boom" >&2
exit 3"#,
        );

        let executor = sh_executor(&dir).with_script(Stage::Ingest, script);
        let err = executor
            .invoke(Stage::Ingest, None, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            WorkerError::ExecutionFailed {
                exit_code,
                stdout,
                stderr,
            } => {
                assert_eq!(exit_code, Some(3));
                assert!(stdout.contains("partial output"));
                assert!(stderr.contains("Traceback: boom"));
            }
            other => panic!("expected ExecutionFailed, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_script_is_spawn_failed() {
        let dir = TempDir::new().unwrap();
        let executor =
            sh_executor(&dir).with_script(Stage::Route, dir.path().join("does_not_exist.sh"));

        let err = executor
            .invoke(Stage::Route, None, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, WorkerError::SpawnFailed { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_interpreter_is_spawn_failed() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "ok.sh", "echo hi");

        let executor = PythonExecutor::new("definitely_not_a_real_interpreter_12345", dir.path())
            .with_script(Stage::Ingest, script);

        let err = executor
            .invoke(Stage::Ingest, None, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, WorkerError::SpawnFailed { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unregistered_stage_is_spawn_failed() {
        let dir = TempDir::new().unwrap();
        let executor = sh_executor(&dir);

        let err = executor
            .invoke(Stage::Train, None, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, WorkerError::SpawnFailed { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_lenient_fallback_on_free_form_output() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "chatty.sh", r#"echo "just logging, no JSON here""#);

        let executor = sh_executor(&dir).with_script(Stage::Ingest, script);
        let record = executor
            .invoke(Stage::Ingest, None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(record.status, ResultStatus::Success);
        assert!(record.message().unwrap().contains("just logging"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancel_kills_worker() {
        let dir = TempDir::new().unwrap();
        let script = write_script(
            &dir,
            "slow.sh",
            r#"echo "started"
sleep 30
echo '{"status":"success"}'"#,
        );

        let executor = sh_executor(&dir).with_script(Stage::Train, script);
        let cancel = CancellationToken::new();

        let invoke_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            executor
                .invoke(Stage::Train, None, &invoke_cancel)
                .await
        });

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        cancel.cancel();

        let err = task.await.unwrap().unwrap_err();
        match err {
            WorkerError::Cancelled { partial_output, .. } => {
                assert_eq!(partial_output.as_deref(), Some("started"));
            }
            other => panic!("expected Cancelled, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdout_and_stderr_interleave() {
        let dir = TempDir::new().unwrap();
        let script = write_script(
            &dir,
            "both.sh",
            r#"echo "progress 1"
echo "warning 1" >&2
echo "progress 2"
echo '{"status":"success","done":true}'"#,
        );

        let executor = sh_executor(&dir).with_script(Stage::Predict, script);
        let record = executor
            .invoke(Stage::Predict, None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(record.payload["done"], true);
        assert!(record.raw.contains("progress 1"));
        assert!(record.raw.contains("progress 2"));
        // stderr never contaminates the parsed stdout stream
        assert!(!record.raw.contains("warning 1"));
    }
}
