//! Server startup: shared state initialization and background task spawning.

use std::sync::Arc;

use anyhow::Context;
use atomspace_graph::{ConnectionManager, GraphDatabaseAdapter, Neo4jBulkLoader, Neo4jHttpBackend, RetrySettings};
use atomspace_loader::HugeGraphLoader;
use atomspace_notify::HttpAnnotationNotifier;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::background::spawn_session_sweeper;
use crate::history::JobHistoryStore;
use crate::pipeline::JobPipeline;
use crate::sessions::UploadSessionStore;
use crate::state::AppState;

/// Build the stores, adapters and pipeline described by `config`.
///
/// The graph database connection is only started when credentials are
/// configured; its retry worker runs in the background from here on.
pub fn build_app_state(config: &atomspace_core::Config) -> anyhow::Result<Arc<AppState>> {
    let sessions = Arc::new(
        UploadSessionStore::new(&config.storage.uploads_dir, config.sessions.ttl())
            .context("failed to initialize upload session store")?,
    );
    let history = Arc::new(
        JobHistoryStore::new(&config.storage.output_dir, &config.storage.uploads_dir)
            .context("failed to initialize job history store")?,
    );

    let loader = Arc::new(HugeGraphLoader::from_config(&config.loader));

    let notifier = Arc::new(
        HttpAnnotationNotifier::from_config(&config.annotation)
            .context("invalid annotation service configuration")?,
    );
    if !config.annotation.is_configured() {
        warn!("ANNOTATION_SERVICE_URL not set; job notifications are disabled");
    }

    let (connection, graph_db) = if config.neo4j.is_configured() {
        let backend = Arc::new(
            Neo4jHttpBackend::from_config(&config.neo4j).context("invalid Neo4j configuration")?,
        );
        let connection = ConnectionManager::spawn(backend, RetrySettings::from_config(&config.neo4j));
        let bulk_loader: Arc<dyn GraphDatabaseAdapter> =
            Neo4jBulkLoader::new(connection.clone(), &config.neo4j.import_dir);
        info!(url = %config.neo4j.url(), database = %config.neo4j.database, "graph database connection started");
        (Some(connection), Some(bulk_loader))
    } else {
        info!("NEO4J_PASSWORD not set; graph database sync disabled");
        (None, None)
    };

    let pipeline = JobPipeline::new(
        sessions.clone(),
        history.clone(),
        loader,
        graph_db,
        notifier.clone(),
    );

    Ok(Arc::new(AppState {
        config: config.clone(),
        sessions,
        history,
        pipeline,
        connection,
        notifier,
    }))
}

/// Handles for the tasks started by [`spawn_background_tasks`].
pub struct BackgroundTasks {
    pub shutdown: Arc<Notify>,
    pub sweeper: JoinHandle<()>,
}

impl BackgroundTasks {
    /// Stop the sweeper and the graph database worker.
    pub async fn stop(self, state: &AppState) {
        self.shutdown.notify_one();
        if let Err(e) = self.sweeper.await {
            warn!(error = %e, "session sweeper ended abnormally");
        }
        if let Some(connection) = &state.connection {
            connection.shutdown();
        }
    }
}

pub fn spawn_background_tasks(state: &Arc<AppState>) -> BackgroundTasks {
    let shutdown = Arc::new(Notify::new());
    let sweeper = spawn_session_sweeper(
        state.sessions.clone(),
        state.config.sessions.sweep_interval(),
        shutdown.clone(),
    );
    info!(
        interval_secs = state.config.sessions.sweep_interval_secs,
        "session sweeper started"
    );
    BackgroundTasks { shutdown, sweeper }
}
