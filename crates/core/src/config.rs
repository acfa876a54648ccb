use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_f64(profile: &str, key: &str, default: f64) -> f64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── YAML overlay ──────────────────────────────────────────────

/// Optional `config.yaml` values. Anything set here replaces the built-in
/// default; environment variables still win over the file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub paths: FilePaths,
    #[serde(default)]
    pub uploads: FileUploads,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilePaths {
    pub hugegraph_loader: Option<String>,
    pub output_dir: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileUploads {
    /// Session lifetime in hours.
    pub session_timeout: Option<f64>,
}

impl FileConfig {
    /// Read the YAML file at `path`. A missing file yields the empty overlay.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_yaml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

/// Errors raised while loading the YAML overlay.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub storage: StorageConfig,
    pub loader: LoaderConfig,
    pub sessions: SessionConfig,
    pub neo4j: Neo4jConfig,
    pub annotation: AnnotationConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    ///
    /// Profile is read from `ATOMSPACE_PROFILE`. When set (e.g. `PROD`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    /// The YAML overlay is read from `ATOMSPACE_CONFIG` (default `config.yaml`).
    pub fn from_env() -> Result<Self, ConfigError> {
        let profile = env_or("ATOMSPACE_PROFILE", "").to_uppercase();
        let file_path = PathBuf::from(env_or("ATOMSPACE_CONFIG", "config.yaml"));
        let file = FileConfig::load(&file_path)?;
        Ok(Self::for_profile(&profile, &file))
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str, file: &FileConfig) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            storage: StorageConfig::from_env_profiled(p, file),
            loader: LoaderConfig::from_env_profiled(p, file),
            sessions: SessionConfig::from_env_profiled(p, file),
            neo4j: Neo4jConfig::from_env_profiled(p),
            annotation: AnnotationConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  storage:     output_dir={}", self.storage.output_dir.display());
        tracing::info!("  loader:      path={}, graph={}", self.loader.loader_path.display(), self.loader.graph);
        tracing::info!("  sessions:    timeout_hours={}, sweep_secs={}", self.sessions.timeout_hours, self.sessions.sweep_interval_secs);
        tracing::info!("  neo4j:       url={}, db={}", self.neo4j.url(), self.neo4j.database);
        tracing::info!("  annotation:  url={}", self.annotation.url.as_deref().unwrap_or("(none)"));
    }

    /// Return a redacted view safe for display (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "storage": {
                "output_dir": self.storage.output_dir,
                "uploads_dir": self.storage.uploads_dir,
            },
            "loader": {
                "loader_path": self.loader.loader_path,
                "host": self.loader.host,
                "port": self.loader.port,
                "graph": self.loader.graph,
            },
            "sessions": {
                "timeout_hours": self.sessions.timeout_hours,
                "sweep_interval_secs": self.sessions.sweep_interval_secs,
            },
            "neo4j": {
                "host": self.neo4j.host,
                "port": self.neo4j.port,
                "username": self.neo4j.username,
                "password": "***",
                "database": self.neo4j.database,
                "configured": self.neo4j.is_configured(),
            },
            "annotation": {
                "configured": self.annotation.is_configured(),
                "timeout_secs": self.annotation.timeout_secs,
            },
        })
    }
}

// ── Storage ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory holding one sub-directory per job plus the history files.
    pub output_dir: PathBuf,
    /// Staging root for upload sessions.
    pub uploads_dir: PathBuf,
}

impl StorageConfig {
    fn from_env_profiled(p: &str, file: &FileConfig) -> Self {
        let default_output = file.paths.output_dir.as_deref().unwrap_or("./output");
        let output_dir = PathBuf::from(profiled_env_or(p, "OUTPUT_DIR", default_output));
        let uploads_dir = profiled_env_opt(p, "UPLOADS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| output_dir.join("uploads"));
        Self {
            output_dir,
            uploads_dir,
        }
    }
}

// ── HugeGraph loader ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    pub loader_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub graph: String,
}

impl LoaderConfig {
    fn from_env_profiled(p: &str, file: &FileConfig) -> Self {
        let default_path = file
            .paths
            .hugegraph_loader
            .as_deref()
            .unwrap_or("./bin/hugegraph-loader.sh");
        Self {
            loader_path: PathBuf::from(profiled_env_or(p, "HUGEGRAPH_LOADER_PATH", default_path)),
            host: profiled_env_or(p, "HUGEGRAPH_HOST", "localhost"),
            port: profiled_env_u16(p, "HUGEGRAPH_PORT", 8080),
            graph: profiled_env_or(p, "HUGEGRAPH_GRAPH", "hugegraph"),
        }
    }
}

// ── Upload sessions ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub timeout_hours: f64,
    pub sweep_interval_secs: u64,
}

impl SessionConfig {
    fn from_env_profiled(p: &str, file: &FileConfig) -> Self {
        let default_hours = file.uploads.session_timeout.unwrap_or(24.0);
        Self {
            timeout_hours: profiled_env_f64(p, "UPLOAD_SESSION_TIMEOUT_HOURS", default_hours),
            sweep_interval_secs: profiled_env_u64(p, "UPLOAD_SWEEP_INTERVAL_SECS", 300),
        }
    }

    pub fn ttl(&self) -> Duration {
        secs_or_default(
            "UPLOAD_SESSION_TIMEOUT_HOURS",
            self.timeout_hours * 3600.0,
            Duration::from_secs(24 * 3600),
        )
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

// ── Neo4j ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Neo4jConfig {
    pub host: String,
    /// HTTP port of the transactional endpoint.
    pub port: u16,
    pub use_ssl: bool,
    pub username: String,
    pub password: Option<String>,
    pub database: String,
    /// Directory mounted as the database's `import/` folder.
    pub import_dir: PathBuf,
    pub max_retries: u32,
    pub retry_interval_secs: u64,
    pub connect_timeout_secs: u64,
    pub wait_timeout_secs: u64,
}

impl Neo4jConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "NEO4J_HOST", "localhost"),
            port: profiled_env_u16(p, "NEO4J_PORT", 7474),
            use_ssl: profiled_env_or(p, "NEO4J_USE_SSL", "false") == "true",
            username: profiled_env_or(p, "NEO4J_USERNAME", "neo4j"),
            password: profiled_env_opt(p, "NEO4J_PASSWORD"),
            database: profiled_env_or(p, "NEO4J_DATABASE", "neo4j"),
            import_dir: PathBuf::from(profiled_env_or(p, "NEO4J_IMPORT_DIR", "./neo4j/import")),
            max_retries: profiled_env_u32(p, "NEO4J_MAX_RETRIES", 5),
            retry_interval_secs: profiled_env_u64(p, "NEO4J_RETRY_INTERVAL_SECS", 5),
            connect_timeout_secs: profiled_env_u64(p, "NEO4J_CONNECT_TIMEOUT_SECS", 10),
            wait_timeout_secs: profiled_env_u64(p, "NEO4J_WAIT_TIMEOUT_SECS", 30),
        }
    }

    pub fn url(&self) -> String {
        let scheme = if self.use_ssl { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    pub fn is_configured(&self) -> bool {
        self.password.is_some()
    }
}

// ── Annotation service ────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationConfig {
    pub url: Option<String>,
    pub timeout_secs: f64,
}

impl AnnotationConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            url: profiled_env_opt(p, "ANNOTATION_SERVICE_URL"),
            timeout_secs: profiled_env_f64(p, "ANNOTATION_SERVICE_TIMEOUT", 300.0),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some()
    }

    pub fn timeout(&self) -> Duration {
        secs_or_default("ANNOTATION_SERVICE_TIMEOUT", self.timeout_secs, Duration::from_secs(300))
    }
}

/// Negative, non-finite or out-of-range seconds fall back to `default`.
fn secs_or_default(setting: &str, secs: f64, default: Duration) -> Duration {
    match Duration::try_from_secs_f64(secs) {
        Ok(duration) => duration,
        Err(e) => {
            tracing::warn!(setting, value = secs, error = %e, "invalid duration, using default");
            default
        }
    }
}
