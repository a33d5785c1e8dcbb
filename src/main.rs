mod artifact;
mod cli;
mod config;
mod logging;
mod pipeline;
mod process;
mod readiness;
mod stage;
mod worker;
mod workflow;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cli::{ArtifactAvailability, ErrorEnvelope, StatusView};
use pipeline::Pipeline;
use stage::{Stage, StageParams};
use std::path::PathBuf;
use worker::CancellationToken;

#[derive(Parser)]
#[command(name = "demandflow")]
#[command(about = "Pipeline coordinator for demand forecasting and delivery routing workers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project directory (defaults to current)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Suppress normal output
    #[arg(long, global = true)]
    quiet: bool,

    /// Also write logs to the session log file
    #[arg(long, global = true)]
    log: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one or more stages through the pipeline, in order
    Run {
        /// Stages to run (ingest, train, predict, route)
        #[arg(required = true, value_parser = parse_stage)]
        stages: Vec<Stage>,

        /// Parameters for the predict stage, as a JSON object
        #[arg(long)]
        predict_params: Option<String>,

        /// Parameters for the route stage, as a JSON object
        #[arg(long)]
        route_params: Option<String>,
    },

    /// Show workflow progress for this session
    Status,

    /// Check environment readiness
    Doctor,

    /// Query availability of a generated artifact
    Artifact {
        /// Logical artifact name (route-map, processed-data, model)
        name: String,
    },

    /// Copy a generated artifact to a destination under its download name
    Export {
        /// Logical artifact name
        name: String,

        /// Destination directory or file path
        dest: PathBuf,
    },
}

fn parse_stage(s: &str) -> Result<Stage, String> {
    s.parse().map_err(|e: stage::ParamsError| e.to_string())
}

/// Build the typed parameters for one stage from the CLI flags.
fn params_for(
    stage: Stage,
    predict_params: Option<&str>,
    route_params: Option<&str>,
) -> Result<StageParams> {
    let raw = match stage {
        Stage::Predict => predict_params,
        Stage::Route => route_params,
        _ => None,
    };

    let value = raw
        .map(serde_json::from_str)
        .transpose()
        .with_context(|| format!("parsing parameters for stage '{stage}'"))?;

    StageParams::from_json(stage, value)
        .with_context(|| format!("building parameters for stage '{stage}'"))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_file = if cli.log {
        Some(logging::default_log_path()?)
    } else {
        None
    };
    let _log_guard = logging::init_logging(cli.debug, cli.quiet, log_file)?;

    let project_dir = cli.dir.as_deref();
    let config = config::PipelineConfig::load(project_dir)?;

    match cli.command {
        Commands::Run {
            stages,
            predict_params,
            route_params,
        } => {
            let pipeline = Pipeline::from_config(&config);

            // One cancel token for the whole run; Ctrl+C cancels the
            // in-flight invocation instead of orphaning the worker.
            let cancel = CancellationToken::new();
            tokio::spawn(worker::wire_signals(cancel.clone()));

            for stage in stages {
                let params =
                    params_for(stage, predict_params.as_deref(), route_params.as_deref())?;

                match pipeline.run_stage(stage, &params, &cancel).await {
                    Ok(record) => {
                        print_json(&record.to_json())?;
                        if !record.is_success() {
                            // Worker kept the protocol but reported failure;
                            // downstream stages would only be rejected.
                            std::process::exit(1);
                        }
                    }
                    Err(err) => {
                        print_json(&ErrorEnvelope::for_stage(stage, &err))?;
                        std::process::exit(1);
                    }
                }
            }

            if !cli.quiet {
                print_json(&StatusView::from(&pipeline.tracker().snapshot()))?;
            }
        }

        Commands::Status => {
            // Workflow state is session-scoped; a fresh process starts an
            // empty session.
            let pipeline = Pipeline::from_config(&config);
            print_json(&StatusView::from(&pipeline.tracker().snapshot()))?;
        }

        Commands::Doctor => {
            let checker = readiness::ReadinessChecker::new(config);
            let report = checker.check().await;
            print_json(&report)?;
            if !report.ready {
                std::process::exit(1);
            }
        }

        Commands::Artifact { name } => {
            let locator = artifact::ArtifactLocator::from_config(&config);
            match locator.resolve(&name) {
                Ok(artifact) => print_json(&ArtifactAvailability::from(&artifact))?,
                Err(err) => {
                    print_json(&ErrorEnvelope::new("Unknown artifact", err.to_string()))?;
                    std::process::exit(1);
                }
            }
        }

        Commands::Export { name, dest } => {
            let locator = artifact::ArtifactLocator::from_config(&config);
            let artifact = match locator.resolve(&name) {
                Ok(artifact) => artifact,
                Err(err) => {
                    print_json(&ErrorEnvelope::new("Unknown artifact", err.to_string()))?;
                    std::process::exit(1);
                }
            };

            let Some(source) = artifact.resolved.as_deref() else {
                print_json(&ErrorEnvelope::new(
                    format!("No '{name}' file found"),
                    "Run the producing stage first",
                ))?;
                std::process::exit(1);
            };

            let target = if dest.is_dir() {
                dest.join(&artifact.download_name)
            } else {
                dest
            };

            std::fs::copy(source, &target)
                .with_context(|| format!("copying {} to {}", source.display(), target.display()))?;

            print_json(&serde_json::json!({
                "status": "success",
                "message": format!("Exported '{name}'"),
                "path": target.display().to_string(),
            }))?;
        }
    }

    Ok(())
}
