use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::{error, info, warn};

use atomspace_core::SchemaDefinition;
use atomspace_server::cli::{CliArgs, Command};
use atomspace_server::pipeline::JobRequest;
use atomspace_server::startup::{build_app_state, spawn_background_tasks};
use atomspace_server::state::AppState;

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_config(profile: Option<&str>) -> Result<atomspace_core::Config> {
    atomspace_core::config::load_dotenv();
    if let Some(profile) = profile {
        std::env::set_var("ATOMSPACE_PROFILE", profile);
    }
    atomspace_core::Config::from_env().context("failed to load configuration")
}

async fn submit(
    state: &AppState,
    files: &[std::path::PathBuf],
    config: &std::path::Path,
    schema: &std::path::Path,
    writer_type: &str,
) -> Result<()> {
    let config_json = std::fs::read_to_string(config)
        .with_context(|| format!("failed to read {}", config.display()))?;
    let schema_json = std::fs::read_to_string(schema)
        .with_context(|| format!("failed to read {}", schema.display()))?;

    let session_id = state.sessions.create()?;
    for path in files {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("not a file path: {}", path.display()))?;
        let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        state.sessions.stage_file(&session_id, name, &bytes)?;
    }
    info!(session_id = %session_id, files = files.len(), "upload session ready");

    let request = match JobRequest::from_raw(&session_id, &config_json, &schema_json, writer_type) {
        Ok(request) => request,
        Err(e) => {
            if let Err(e) = state.sessions.cleanup(&session_id) {
                warn!(session_id = %session_id, error = %e, "failed to clean up upload session");
            }
            return Err(e.into());
        }
    };
    match state.pipeline.run(request).await {
        Ok(outcome) => print_json(&outcome),
        Err(e) => {
            if let Err(e) = state.sessions.cleanup(&session_id) {
                warn!(session_id = %session_id, error = %e, "failed to clean up upload session");
            }
            if let atomspace_server::pipeline::PipelineError::Loader { stdout, stderr, .. } = &e {
                error!(stdout = %stdout, stderr = %stderr, "loader output");
            }
            Err(e.into())
        }
    }
}

async fn run(args: CliArgs) -> Result<()> {
    let config = load_config(args.profile.as_deref())?;

    // Commands that need no running state.
    match &args.command {
        Command::Config => return print_json(&config.redacted_summary()),
        Command::ConvertSchema { schema } => {
            let raw = std::fs::read_to_string(schema)
                .with_context(|| format!("failed to read {}", schema.display()))?;
            let schema = SchemaDefinition::from_json_str(&raw)?;
            println!("{}", schema.to_groovy());
            return Ok(());
        }
        _ => {}
    }

    config.log_summary();
    let state = build_app_state(&config)?;
    let tasks = spawn_background_tasks(&state);

    let result = match args.command {
        Command::Submit {
            files,
            config,
            schema,
            writer_type,
        } => submit(&state, &files, &config, &schema, &writer_type).await,
        Command::History => print_json(&state.pipeline.history()?),
        Command::Select { job_id } => {
            state.pipeline.select_job(&job_id).await?;
            println!("Selected job {job_id}");
            Ok(())
        }
        Command::Delete { job_id } => print_json(&state.pipeline.delete_job(&job_id).await?),
        Command::Clear { yes } => {
            if !yes {
                bail!("refusing to clear history without --yes");
            }
            print_json(&state.pipeline.clear_history()?)
        }
        Command::Info { job_id } => print_json(&state.pipeline.graph_info(job_id.as_deref()).await?),
        Command::AnnotationSchema { job_id } => {
            match state.pipeline.annotation_schema(job_id.as_deref())? {
                Some(schema) => print_json(&schema),
                None => bail!("no job with a schema found"),
            }
        }
        Command::Health { wait } => {
            if let (Some(conn), true) = (&state.connection, wait > 0) {
                conn.wait_for_connection(Duration::from_secs(wait)).await;
            }
            print_json(&state.health().await)
        }
        Command::Config | Command::ConvertSchema { .. } => Ok(()),
    };

    tasks.stop(&state).await;
    result
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    run(CliArgs::parse()).await
}
