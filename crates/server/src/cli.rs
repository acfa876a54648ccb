use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Build knowledge-graph artifacts from uploaded tabular data.
///
/// Every command runs against the output directory named by the
/// configuration (`OUTPUT_DIR`, `config.yaml`, or their profiled variants).
#[derive(Parser, Debug)]
#[command(name = "atomspace-builder", about = "Tabular data to knowledge-graph job runner")]
pub struct CliArgs {
    /// Configuration profile (overrides ATOMSPACE_PROFILE)
    #[arg(long, global = true, env = "ATOMSPACE_PROFILE")]
    pub profile: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Upload files into a new session and run a job over them
    Submit {
        /// Data files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Loader mapping config (JSON)
        #[arg(long)]
        config: PathBuf,

        /// Graph schema (JSON)
        #[arg(long)]
        schema: PathBuf,

        /// Output format: metta, neo4j, mork or networkx
        #[arg(long, default_value = "metta")]
        writer_type: String,
    },

    /// Show the job history
    History,

    /// Make a job the one served to the annotation service
    Select { job_id: String },

    /// Delete a job and its output
    Delete { job_id: String },

    /// Delete every job and reset the history
    Clear {
        /// Required; clearing cannot be undone
        #[arg(long)]
        yes: bool,
    },

    /// Show graph statistics for a job (default: the selected job)
    Info {
        #[arg(long)]
        job_id: Option<String>,
    },

    /// Show the annotation form schema for a job (default: the selected job)
    AnnotationSchema {
        #[arg(long)]
        job_id: Option<String>,
    },

    /// Print the Groovy schema script for a JSON schema file
    ConvertSchema { schema: PathBuf },

    /// Report graph database and annotation service status
    Health {
        /// Seconds to wait for the graph database before reporting
        #[arg(long, default_value = "0")]
        wait: u64,
    },

    /// Print the effective configuration with secrets redacted
    Config,
}
