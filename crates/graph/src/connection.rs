//! Supervised connection to the graph database.
//!
//! The database may come up after this process does. A single background
//! retry cycle drives the state machine
//!
//! ```text
//! Uninitialized -> Connecting -> Connected
//!                  Connecting -> Failed -> Connecting   (bounded, fixed delay)
//! Connected -> Uninitialized                            (unavailable during use)
//! ```
//!
//! and [`ConnectionManager::request_reconnect`] is the only way a new cycle
//! is started.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use atomspace_core::config::Neo4jConfig;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::backend::{GraphBackend, Row, Statement};
use crate::error::GraphError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Uninitialized,
    Connecting,
    Connected,
    Failed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct RetrySettings {
    /// Attempts per retry cycle.
    pub max_retries: u32,
    /// Fixed delay between attempts.
    pub retry_interval: Duration,
    /// Upper bound on one connect + probe attempt.
    pub connect_timeout: Duration,
    /// How long `execute(.., wait = true)` blocks for a connection.
    pub wait_timeout: Duration,
}

impl RetrySettings {
    pub fn from_config(config: &Neo4jConfig) -> Self {
        Self {
            max_retries: config.max_retries.max(1),
            retry_interval: Duration::from_secs(config.retry_interval_secs),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            wait_timeout: Duration::from_secs(config.wait_timeout_secs),
        }
    }
}

/// Snapshot returned by [`ConnectionManager::health_check`].
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionHealth {
    pub state: ConnectionState,
    pub connected: bool,
    pub retry_count: u32,
    pub max_retries: u32,
    pub worker_alive: bool,
    pub last_attempt: Option<DateTime<Utc>>,
    /// `"ok"` or the probe error; absent when not connected.
    pub probe_result: Option<String>,
}

#[derive(Debug)]
struct StateInner {
    state: ConnectionState,
    retry_count: u32,
    last_attempt: Option<DateTime<Utc>>,
}

struct Inner {
    backend: Arc<dyn GraphBackend>,
    settings: RetrySettings,
    state: Mutex<StateInner>,
    /// Mirrors `state == Connected` for lock-free reads.
    connected: AtomicBool,
    state_tx: watch::Sender<ConnectionState>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn transition(&self, next: ConnectionState) {
        let mut guard = self.state.lock().unwrap();
        if next == ConnectionState::Connecting {
            guard.retry_count += 1;
            guard.last_attempt = Some(Utc::now());
        }
        guard.state = next;
        self.connected
            .store(next == ConnectionState::Connected, Ordering::Release);
        self.state_tx.send_replace(next);
    }

    async fn attempt(&self) -> Result<(), GraphError> {
        let connect = async {
            self.backend.connect().await?;
            self.backend.probe().await
        };
        match tokio::time::timeout(self.settings.connect_timeout, connect).await {
            Ok(result) => result,
            Err(_) => Err(GraphError::Unavailable(format!(
                "connection attempt timed out after {:?}",
                self.settings.connect_timeout
            ))),
        }
    }

    async fn retry_cycle(self: Arc<Self>) {
        self.state.lock().unwrap().retry_count = 0;
        let max = self.settings.max_retries;

        for attempt in 1..=max {
            self.transition(ConnectionState::Connecting);
            match self.attempt().await {
                Ok(()) => {
                    self.transition(ConnectionState::Connected);
                    info!(attempt, "graph database connected");
                    return;
                }
                Err(e) => {
                    self.transition(ConnectionState::Failed);
                    warn!(attempt, max_retries = max, error = %e, "graph database connection attempt failed");
                }
            }
            if attempt < max {
                tokio::time::sleep(self.settings.retry_interval).await;
            }
        }

        error!(
            max_retries = max,
            "graph database unreachable, giving up until the next reconnect request"
        );
    }
}

/// Shared handle; clones refer to the same connection state.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// Build the manager and start the first retry cycle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(backend: Arc<dyn GraphBackend>, settings: RetrySettings) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Uninitialized);
        let manager = Self {
            inner: Arc::new(Inner {
                backend,
                settings,
                state: Mutex::new(StateInner {
                    state: ConnectionState::Uninitialized,
                    retry_count: 0,
                    last_attempt: None,
                }),
                connected: AtomicBool::new(false),
                state_tx,
                worker: Mutex::new(None),
            }),
        };
        manager.request_reconnect();
        manager
    }

    pub fn settings(&self) -> &RetrySettings {
        &self.inner.settings
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.lock().unwrap().state
    }

    /// Start a retry cycle unless already connected or one is running.
    /// Returns whether a new cycle was started.
    pub fn request_reconnect(&self) -> bool {
        if self.is_connected() {
            return false;
        }
        let mut worker = self.inner.worker.lock().unwrap();
        if worker.as_ref().is_some_and(|h| !h.is_finished()) {
            return false;
        }
        let inner = Arc::clone(&self.inner);
        *worker = Some(tokio::spawn(inner.retry_cycle()));
        true
    }

    pub fn worker_alive(&self) -> bool {
        self.inner
            .worker
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Wait up to `timeout` for the connection, restarting the retry cycle
    /// if it is not running.
    pub async fn wait_for_connection(&self, timeout: Duration) -> bool {
        if self.is_connected() {
            return true;
        }
        self.request_reconnect();
        let mut rx = self.inner.state_tx.subscribe();
        let connected = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|s| *s == ConnectionState::Connected)).await,
            Ok(Ok(_))
        );
        connected
    }

    /// Run `op` against the backend.
    ///
    /// When not connected, `wait = true` blocks up to the configured wait
    /// timeout and `wait = false` fails immediately with `NotReady`. An
    /// unavailable error from `op` drops the connection back to
    /// `Uninitialized`; the operation itself is not retried.
    pub async fn execute<T, F, Fut>(&self, op: F, wait: bool) -> Result<T, GraphError>
    where
        F: FnOnce(Arc<dyn GraphBackend>) -> Fut,
        Fut: Future<Output = Result<T, GraphError>>,
    {
        if !self.is_connected() {
            if !wait {
                self.request_reconnect();
                return Err(GraphError::NotReady(format!("connection is {}", self.state())));
            }
            let timeout = self.inner.settings.wait_timeout;
            if !self.wait_for_connection(timeout).await {
                return Err(GraphError::NotReady(format!(
                    "no connection within {timeout:?}"
                )));
            }
        }

        let result = op(Arc::clone(&self.inner.backend)).await;
        if let Err(ref e) = result {
            if e.is_unavailable() {
                warn!(error = %e, "graph database became unavailable, resetting connection");
                self.inner.transition(ConnectionState::Uninitialized);
            }
        }
        result
    }

    /// Like [`execute`](Self::execute) without waiting, returning `default`
    /// on any failure.
    pub async fn execute_safe<T, F, Fut>(&self, op: F, default: T) -> T
    where
        F: FnOnce(Arc<dyn GraphBackend>) -> Fut,
        Fut: Future<Output = Result<T, GraphError>>,
    {
        match self.execute(op, false).await {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "graph query failed, using default");
                default
            }
        }
    }

    /// Convenience wrapper running a single statement.
    pub async fn run(&self, statement: Statement, wait: bool) -> Result<Vec<Row>, GraphError> {
        self.execute(
            |backend| async move { backend.run(&statement).await },
            wait,
        )
        .await
    }

    pub async fn health_check(&self) -> ConnectionHealth {
        let (state, retry_count, last_attempt) = {
            let guard = self.inner.state.lock().unwrap();
            (guard.state, guard.retry_count, guard.last_attempt)
        };
        let connected = self.is_connected();
        let probe_result = if connected {
            let probe = tokio::time::timeout(
                self.inner.settings.connect_timeout,
                self.inner.backend.probe(),
            )
            .await;
            Some(match probe {
                Ok(Ok(())) => "ok".to_string(),
                Ok(Err(e)) => e.to_string(),
                Err(_) => "probe timed out".to_string(),
            })
        } else {
            None
        };

        ConnectionHealth {
            state,
            connected,
            retry_count,
            max_retries: self.inner.settings.max_retries,
            worker_alive: self.worker_alive(),
            last_attempt,
            probe_result,
        }
    }

    /// Abort any running retry cycle.
    pub fn shutdown(&self) {
        if let Some(handle) = self.inner.worker.lock().unwrap().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;
    use std::time::Instant;

    /// Backend whose first `failures` connects fail.
    struct FlakyBackend {
        failures: u32,
        connects: AtomicU32,
        connect_delay: Duration,
    }

    impl FlakyBackend {
        fn new(failures: u32) -> Arc<Self> {
            Arc::new(Self {
                failures,
                connects: AtomicU32::new(0),
                connect_delay: Duration::ZERO,
            })
        }

        fn always_failing(connect_delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                failures: u32::MAX,
                connects: AtomicU32::new(0),
                connect_delay,
            })
        }
    }

    #[async_trait]
    impl GraphBackend for FlakyBackend {
        async fn connect(&self) -> Result<(), GraphError> {
            tokio::time::sleep(self.connect_delay).await;
            let n = self.connects.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(GraphError::Unavailable("connection refused".into()))
            } else {
                Ok(())
            }
        }

        async fn probe(&self) -> Result<(), GraphError> {
            Ok(())
        }

        async fn run(&self, _statement: &Statement) -> Result<Vec<Row>, GraphError> {
            Ok(vec![])
        }
    }

    fn settings(max_retries: u32, interval_ms: u64) -> RetrySettings {
        RetrySettings {
            max_retries,
            retry_interval: Duration::from_millis(interval_ms),
            connect_timeout: Duration::from_secs(1),
            wait_timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn connects_after_transient_failures() {
        let backend = FlakyBackend::new(2);
        let manager = ConnectionManager::spawn(backend.clone(), settings(5, 10));

        assert!(manager.wait_for_connection(Duration::from_secs(2)).await);
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(backend.connects.load(Ordering::SeqCst), 3);

        let health = manager.health_check().await;
        assert!(health.connected);
        assert_eq!(health.retry_count, 3);
        assert_eq!(health.probe_result.as_deref(), Some("ok"));
        assert!(health.last_attempt.is_some());
    }

    #[tokio::test]
    async fn wait_times_out_when_backend_never_answers() {
        let manager =
            ConnectionManager::spawn(FlakyBackend::always_failing(Duration::ZERO), settings(1000, 10));

        let started = Instant::now();
        let connected = manager.wait_for_connection(Duration::from_millis(250)).await;
        let elapsed = started.elapsed();

        assert!(!connected);
        assert!(elapsed >= Duration::from_millis(250), "returned early: {elapsed:?}");
        assert!(elapsed < Duration::from_secs(2), "overshot: {elapsed:?}");
        manager.shutdown();
    }

    #[tokio::test]
    async fn wait_returns_immediately_when_connected() {
        let manager = ConnectionManager::spawn(FlakyBackend::new(0), settings(3, 10));
        assert!(manager.wait_for_connection(Duration::from_secs(2)).await);

        let started = Instant::now();
        assert!(manager.wait_for_connection(Duration::from_secs(5)).await);
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn only_one_retry_cycle_runs_at_a_time() {
        let backend = FlakyBackend::always_failing(Duration::from_millis(50));
        let manager = ConnectionManager::spawn(backend.clone(), settings(2, 10));

        for _ in 0..10 {
            assert!(!manager.request_reconnect());
        }
        assert!(manager.worker_alive());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(backend.connects.load(Ordering::SeqCst), 2);
        assert!(!manager.worker_alive());
        assert_eq!(manager.state(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn exhausted_cycle_restarts_on_wait() {
        let backend = FlakyBackend::new(2);
        let manager = ConnectionManager::spawn(backend.clone(), settings(2, 10));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!manager.is_connected());
        assert!(!manager.worker_alive());

        assert!(manager.wait_for_connection(Duration::from_secs(2)).await);
        assert_eq!(backend.connects.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fail_fast_execute_reports_not_ready() {
        let manager =
            ConnectionManager::spawn(FlakyBackend::always_failing(Duration::ZERO), settings(1000, 10));

        let err = manager
            .execute(|_| async { Ok::<_, GraphError>(1) }, false)
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::NotReady(_)));

        let value = manager
            .execute_safe(|_| async { Ok::<_, GraphError>(1) }, 7)
            .await;
        assert_eq!(value, 7);
        manager.shutdown();
    }

    #[tokio::test]
    async fn waiting_execute_gives_up_after_wait_timeout() {
        let manager =
            ConnectionManager::spawn(FlakyBackend::always_failing(Duration::ZERO), settings(1000, 10));

        let started = Instant::now();
        let err = manager
            .execute(|_| async { Ok::<_, GraphError>(()) }, true)
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::NotReady(_)));
        assert!(started.elapsed() >= Duration::from_millis(200));
        manager.shutdown();
    }

    #[tokio::test]
    async fn unavailable_during_use_resets_without_retrying() {
        let manager = ConnectionManager::spawn(FlakyBackend::new(0), settings(3, 10));
        assert!(manager.wait_for_connection(Duration::from_secs(2)).await);

        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let err = manager
            .execute(
                move |_| async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(GraphError::Unavailable("gone".into()))
                },
                true,
            )
            .await
            .unwrap_err();

        assert!(err.is_unavailable());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!manager.is_connected());
        assert_eq!(manager.state(), ConnectionState::Uninitialized);
    }

    #[tokio::test]
    async fn query_errors_keep_the_connection() {
        let manager = ConnectionManager::spawn(FlakyBackend::new(0), settings(3, 10));
        assert!(manager.wait_for_connection(Duration::from_secs(2)).await);

        let err = manager
            .execute(
                |_| async {
                    Err::<(), _>(GraphError::Query {
                        code: "Neo.ClientError.Statement.SyntaxError".into(),
                        message: "bad".into(),
                    })
                },
                false,
            )
            .await
            .unwrap_err();
        assert!(!err.is_unavailable());
        assert!(manager.is_connected());
    }
}
