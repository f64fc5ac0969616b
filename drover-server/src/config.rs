use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use drover_engine::{InMemoryWorkerRegistry, WorkerDetails};

use crate::auth::TokenMap;

/// Server configuration loaded from file and/or environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub db_path: PathBuf,
    /// Transport timeout for each outbound dispatch call.
    pub dispatch_timeout: Duration,
    pub tokens: Vec<TokenEntry>,
    pub workers: Vec<WorkerEntry>,
}

/// One API token: the identity it authenticates and the SHA-256 hex
/// digest of the secret.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenEntry {
    pub identity: String,
    pub token_sha256: String,
}

/// One registered back-end worker, with the permission grants it
/// carries per identity.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerEntry {
    pub id: String,
    pub endpoint: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_response_shape")]
    pub response_shape: String,
    #[serde(default)]
    pub grants: Vec<GrantEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GrantEntry {
    pub identity: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

fn default_response_shape() -> String {
    "json".to_string()
}

/// Raw TOML file structure for `~/.config/drover/config.toml`.
#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    bind: Option<String>,
    db_path: Option<PathBuf>,
    dispatch_timeout_secs: Option<u64>,
    #[serde(default)]
    tokens: Vec<TokenEntry>,
    #[serde(default)]
    workers: Vec<WorkerEntry>,
}

/// Default config file location.
fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .expect("could not determine config directory")
        .join("drover")
        .join("config.toml")
}

impl ServerConfig {
    /// Load configuration from file and environment variables.
    ///
    /// Priority: environment variables override file values. File path
    /// can be overridden by `config_path`.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let path = config_path.cloned().unwrap_or_else(default_config_path);

        let file_config = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<ConfigFile>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        } else {
            ConfigFile::default()
        };

        Self::from_file_and_env(file_config)
    }

    /// Build config from parsed file values and current environment.
    fn from_file_and_env(file_config: ConfigFile) -> Result<Self> {
        let ConfigFile {
            bind,
            db_path,
            dispatch_timeout_secs,
            tokens,
            workers,
        } = file_config;

        let bind = std::env::var("DROVER_BIND").ok().or(bind);
        let db_path = std::env::var("DROVER_DB_PATH")
            .ok()
            .map(PathBuf::from)
            .or(db_path);
        let dispatch_timeout_secs = std::env::var("DROVER_DISPATCH_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .or(dispatch_timeout_secs);

        Self::build(bind, db_path, dispatch_timeout_secs, tokens, workers)
    }

    /// Build config from resolved option values (after file + env merging).
    fn build(
        bind: Option<String>,
        db_path: Option<PathBuf>,
        dispatch_timeout_secs: Option<u64>,
        tokens: Vec<TokenEntry>,
        workers: Vec<WorkerEntry>,
    ) -> Result<Self> {
        let bind = bind
            .unwrap_or_else(|| "127.0.0.1:8372".to_string())
            .parse::<SocketAddr>()
            .context("invalid bind address (expected host:port)")?;
        let db_path = db_path.unwrap_or_else(drover_data::db::default_db_path);
        let dispatch_timeout = Duration::from_secs(dispatch_timeout_secs.unwrap_or(10));

        for token in &tokens {
            if token.identity.is_empty() {
                bail!("token entry with empty identity");
            }
            if token.token_sha256.len() != 64
                || !token.token_sha256.bytes().all(|b| b.is_ascii_hexdigit())
            {
                bail!("token for '{}' is not a SHA-256 hex digest", token.identity);
            }
        }

        let mut seen = HashSet::new();
        for worker in &workers {
            if worker.id.is_empty() {
                bail!("worker entry with empty id");
            }
            if !seen.insert(worker.id.as_str()) {
                bail!("duplicate worker id '{}'", worker.id);
            }
        }

        Ok(Self {
            bind,
            db_path,
            dispatch_timeout,
            tokens,
            workers,
        })
    }

    /// Build the in-memory worker registry the engine consumes.
    pub fn build_registry(&self) -> InMemoryWorkerRegistry {
        let registry = InMemoryWorkerRegistry::new();
        for worker in &self.workers {
            registry.insert_worker(WorkerDetails {
                backend_id: worker.id.clone(),
                endpoint: worker.endpoint.clone(),
                enabled: worker.enabled,
                response_shape: worker.response_shape.clone(),
            });
            for grant in &worker.grants {
                registry.grant(&worker.id, &grant.identity, grant.permissions.iter().cloned());
            }
        }
        registry
    }

    /// Build the bearer-token lookup used by the HTTP handlers.
    pub fn token_map(&self) -> TokenMap {
        let mut map = TokenMap::new();
        for token in &self.tokens {
            map.insert(&token.identity, &token.token_sha256);
        }
        map
    }
}
