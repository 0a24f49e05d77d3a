// Configuration loading and parsing (sync.toml, credentials.toml).

use serde::Deserialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::wins::IntensityScale;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub connection: ConnectionConfig,
    pub reconcile: ReconcileConfig,
    pub celebration: IntensityScale,
    pub credentials: CredentialsConfig,
}

// ---------------------------------------------------------------------------
// sync.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire sync.toml file.
#[derive(Debug, Clone, Deserialize)]
struct SyncFile {
    server: ServerConfig,
    connection: ConnectionConfig,
    reconcile: ReconcileConfig,
    celebration: IntensityScale,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Origin of the backend, e.g. `http://127.0.0.1:8080`.
    pub base_url: String,
    /// Path of the push subscription endpoint.
    #[serde(default = "default_events_path")]
    pub events_path: String,
}

fn default_events_path() -> String {
    "/api/events".to_string()
}

impl ServerConfig {
    /// Full URL of the push endpoint.
    pub fn events_url(&self) -> String {
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            self.events_path
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    /// Fixed delay between a transport failure and the next attempt.
    pub retry_delay_ms: u64,
}

impl ConnectionConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            retry_delay_ms: 3000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileConfig {
    /// How long a fetch may run before the loading indicator is shown.
    pub loading_delay_ms: u64,
}

impl ReconcileConfig {
    pub fn loading_delay(&self) -> Duration {
        Duration::from_millis(self.loading_delay_ms)
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        ReconcileConfig {
            loading_delay_ms: 70,
        }
    }
}

// ---------------------------------------------------------------------------
// credentials.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CredentialsConfig {
    /// Session token from a previous login. Without it the client subscribes
    /// anonymously and only receives broadcast events.
    pub session_token: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/sync.toml` and (optionally)
/// `config/credentials.toml`, relative to the given `base_dir`.
///
/// This does not auto-copy defaults. Prefer `load_config()` which handles
/// default initialization automatically.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    // --- sync.toml (required) ---
    let sync_path = config_dir.join("sync.toml");
    let sync_text = read_file(&sync_path)?;
    let sync_file: SyncFile = toml::from_str(&sync_text).map_err(|e| ConfigError::ParseError {
        path: sync_path.clone(),
        source: e,
    })?;

    // --- credentials.toml (optional) ---
    let credentials_path = config_dir.join("credentials.toml");
    let credentials = if credentials_path.exists() {
        let cred_text = read_file(&credentials_path)?;
        toml::from_str(&cred_text).map_err(|e| ConfigError::ParseError {
            path: credentials_path.clone(),
            source: e,
        })?
    } else {
        CredentialsConfig::default()
    };

    let config = Config {
        server: sync_file.server,
        connection: sync_file.connection,
        reconcile: sync_file.reconcile,
        celebration: sync_file.celebration,
        credentials,
    };

    validate(&config)?;

    Ok(config)
}

/// Files under `config/` that ship with a ready-to-use default in
/// `defaults/`. `credentials.toml` only ships as a `.example` template and is
/// never seeded.
const SEEDED_FILES: &[&str] = &["sync.toml"];

/// Seed each missing file of `SEEDED_FILES` into `config/` from `defaults/`.
/// Returns the paths written; files already present are left alone.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    let mut seeded = Vec::new();
    for name in SEEDED_FILES {
        let target = config_dir.join(name);
        if target.exists() {
            continue;
        }
        let source = defaults_dir.join(name);
        if !source.is_file() {
            return Err(seed_error(format!(
                "{} is missing and there is no {} to seed it from",
                target.display(),
                source.display()
            )));
        }
        if seed_file(&source, &target)? {
            seeded.push(target);
        }
    }

    if !seeded.is_empty() {
        let files: Vec<_> = seeded
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect();
        info!(dir = %config_dir.display(), ?files, "Seeded sync config from defaults");
    }

    if !config_dir.join("credentials.toml").exists() {
        info!(
            "No config/credentials.toml, subscribing anonymously \
             (see defaults/credentials.toml.example)"
        );
    }

    Ok(seeded)
}

/// Copy `source` to `target` unless `target` already exists. Returns whether
/// anything was written.
fn seed_file(source: &Path, target: &Path) -> Result<bool, ConfigError> {
    if let Some(dir) = target.parent() {
        std::fs::create_dir_all(dir)
            .map_err(|e| seed_error(format!("failed to create {}: {e}", dir.display())))?;
    }

    let mut dest = match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(target)
    {
        Ok(dest) => dest,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => {
            return Err(seed_error(format!(
                "failed to create {}: {e}",
                target.display()
            )))
        }
    };

    let content = std::fs::read(source)
        .map_err(|e| seed_error(format!("failed to read {}: {e}", source.display())))?;
    dest.write_all(&content)
        .map_err(|e| seed_error(format!("failed to write {}: {e}", target.display())))?;
    Ok(true)
}

fn seed_error(message: String) -> ConfigError {
    ConfigError::DefaultsCopyError { message }
}

/// Convenience wrapper: loads config relative to the current working directory.
/// Ensures default config files are copied before loading.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    let base = &config.server.base_url;
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(ConfigError::ValidationError {
            field: "server.base_url".into(),
            message: format!("must be an http(s) URL, got {base:?}"),
        });
    }

    if !config.server.events_path.starts_with('/') {
        return Err(ConfigError::ValidationError {
            field: "server.events_path".into(),
            message: "must start with '/'".into(),
        });
    }

    if config.connection.retry_delay_ms == 0 {
        return Err(ConfigError::ValidationError {
            field: "connection.retry_delay_ms".into(),
            message: "must be greater than 0".into(),
        });
    }

    let scale = &config.celebration;
    if scale.ceiling_amount <= scale.floor_amount {
        return Err(ConfigError::ValidationError {
            field: "celebration.ceiling_amount".into(),
            message: format!(
                "must be greater than floor_amount ({}), got {}",
                scale.floor_amount, scale.ceiling_amount
            ),
        });
    }

    if scale.ceiling_intensity < scale.floor_intensity {
        return Err(ConfigError::ValidationError {
            field: "celebration.ceiling_intensity".into(),
            message: format!(
                "must be at least floor_intensity ({}), got {}",
                scale.floor_intensity, scale.ceiling_intensity
            ),
        });
    }

    if config
        .credentials
        .session_token
        .as_deref()
        .is_some_and(|t| t.trim().is_empty())
    {
        return Err(ConfigError::ValidationError {
            field: "credentials.session_token".into(),
            message: "must not be blank; remove the key to connect anonymously".into(),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
