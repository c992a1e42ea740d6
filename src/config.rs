//! Configuration management for the Eventdeck engine
//!
//! Strongly-typed configuration loaded from environment variables, with
//! validation and defaults suitable for local development.
//!
//! # Example
//! ```no_run
//! use eventdeck::Config;
//! let config = Config::from_env().expect("failed to load config");
//! println!("Listening on {}:{}", config.api.host, config.api.port);
//! ```

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Event store backend selection
    pub store: StoreConfig,
    /// API server configuration
    pub api: ApiConfig,
    /// Recommendation engine configuration
    pub recommendation: RecommendationConfig,
    /// Log output configuration
    pub logging: LoggingConfig,
    /// Prometheus exporter port (only used with the `metrics` feature)
    pub metrics_port: u16,
    /// Where the variables came from, reported by `log_summary`
    pub env_source: EnvSource,
}

/// Origin of the environment variables read by [`Config::from_env`]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EnvSource {
    /// Process environment only
    #[default]
    Environment,
    /// A `.env` file found by dotenvy
    DotEnv(PathBuf),
    /// An FFOLDER directory; `loaded` counts the variables it set
    Folder { path: PathBuf, loaded: usize },
    /// FFOLDER was set but could not be read
    FolderUnreadable { path: PathBuf, error: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Postgres,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "mem" => Ok(StoreBackend::Memory),
            "postgres" | "postgresql" | "pg" => Ok(StoreBackend::Postgres),
            other => Err(format!("unknown store backend '{}'", other)),
        }
    }
}

/// Event store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// JSON seed for the memory backend
    pub seed_file: Option<PathBuf>,
    /// Apply embedded migrations on startup (postgres backend)
    pub run_migrations: bool,
    pub database: DatabaseConfig,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum connections in pool
    pub max_connections: u32,
    /// Minimum connections to keep open
    pub min_connections: u32,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Idle timeout for connections
    pub idle_timeout: Duration,
    /// Maximum lifetime for connections
    pub max_lifetime: Duration,
    /// Enable statement caching
    pub statement_cache_size: usize,
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Port to listen on
    pub port: u16,
    /// Host to bind to
    pub host: String,
    /// Request timeout
    pub request_timeout: Duration,
    /// Requests served concurrently before callers queue
    pub max_concurrent_requests: usize,
    /// Enable CORS
    pub cors_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
            request_timeout: Duration::from_secs(30),
            max_concurrent_requests: 512,
            cors_enabled: true,
        }
    }
}

/// Recommendation engine configuration
#[derive(Debug, Clone)]
pub struct RecommendationConfig {
    /// Limit used when the caller does not pass one
    pub default_limit: usize,
    /// Upper bound for caller-supplied limits
    pub max_limit: usize,
    /// Characters of latitude/longitude compared for location matches
    pub location_prefix_len: usize,
    /// Budget for fetching the snapshot from the store
    pub fetch_timeout: Duration,
    /// Requests slower than this are logged as warnings
    pub slow_threshold_ms: u64,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            default_limit: crate::recommendation::engine::DEFAULT_LIMIT,
            max_limit: 100,
            location_prefix_len: crate::recommendation::engine::DEFAULT_LOCATION_PREFIX_LEN,
            fetch_timeout: Duration::from_millis(5000),
            slow_threshold_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Log output configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Also write daily-rotated log files here when set
    pub dir: Option<PathBuf>,
    pub file_prefix: String,
}

type Vars = HashMap<String, String>;

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Prefer loading env from a directory of files (FFOLDER) for platforms that mount secrets as files.
        // Each file name is the env var name and its contents is the value.
        // Tracing is not up yet, so the outcome is kept for `log_summary`.
        let env_source = match std::env::var("FFOLDER") {
            Ok(folder) => {
                let path = PathBuf::from(folder);
                match load_env_folder(&path) {
                    Ok(loaded) => EnvSource::Folder { path, loaded },
                    Err(e) => EnvSource::FolderUnreadable {
                        path,
                        error: e.to_string(),
                    },
                }
            }
            // A missing .env file is fine
            Err(_) => dotenvy::dotenv()
                .map(EnvSource::DotEnv)
                .unwrap_or_default(),
        };

        let vars: Vars = std::env::vars().collect();
        let mut config = Self::from_vars(&vars)?;
        config.env_source = env_source;
        Ok(config)
    }

    /// Build and validate configuration from an explicit variable map
    pub fn from_vars(vars: &Vars) -> Result<Self> {
        let config = Self {
            store: StoreConfig::from_vars(vars)?,
            api: ApiConfig::from_vars(vars)?,
            recommendation: RecommendationConfig::from_vars(vars)?,
            logging: LoggingConfig::from_vars(vars)?,
            metrics_port: parsed_or(vars, "METRICS_PORT", 9000)?,
            env_source: EnvSource::Environment,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.store.backend == StoreBackend::Postgres && self.store.database.url.is_empty() {
            return Err(Error::InvalidConfig {
                key: "DATABASE_URL",
                message: "Database URL cannot be empty for the postgres backend".into(),
            });
        }

        if self.store.database.max_connections < self.store.database.min_connections {
            return Err(Error::InvalidConfig {
                key: "DB_MAX_CONNECTIONS",
                message: "max_connections must be >= min_connections".into(),
            });
        }

        let rec = &self.recommendation;
        if rec.default_limit == 0 || rec.default_limit > rec.max_limit {
            return Err(Error::InvalidConfig {
                key: "REC_DEFAULT_LIMIT",
                message: format!(
                    "default limit {} must be between 1 and REC_MAX_LIMIT ({})",
                    rec.default_limit, rec.max_limit
                )
                .into(),
            });
        }

        if rec.location_prefix_len == 0 {
            return Err(Error::InvalidConfig {
                key: "REC_LOCATION_PREFIX_LEN",
                message: "prefix length must be at least 1".into(),
            });
        }

        if self.api.max_concurrent_requests == 0 {
            return Err(Error::InvalidConfig {
                key: "API_MAX_CONCURRENT_REQUESTS",
                message: "must be at least 1".into(),
            });
        }

        Ok(())
    }

    /// Log configuration summary (without sensitive data)
    pub fn log_summary(&self) {
        info!("Configuration loaded:");
        match self.env_source {
            EnvSource::Environment => info!("  Source: process environment"),
            EnvSource::DotEnv(ref path) => info!("  Source: {}", path.display()),
            EnvSource::Folder { ref path, loaded } => {
                info!("  Source: FFOLDER={} ({} variables set)", path.display(), loaded)
            }
            EnvSource::FolderUnreadable {
                ref path,
                ref error,
            } => warn!("  Source: failed to read FFOLDER {}: {}", path.display(), error),
        }
        info!("  Store:");
        info!("    Backend: {:?}", self.store.backend);
        match self.store.backend {
            StoreBackend::Postgres => {
                info!("    Database URL: {}", mask_url(&self.store.database.url));
                info!(
                    "    Pool Size: {}-{}",
                    self.store.database.min_connections, self.store.database.max_connections
                );
            }
            StoreBackend::Memory => {
                if let Some(ref seed) = self.store.seed_file {
                    info!("    Seed File: {}", seed.display());
                }
            }
        }
        info!("  API:");
        info!("    Listening on: {}:{}", self.api.host, self.api.port);
        info!("    Request Timeout: {:?}", self.api.request_timeout);
        info!("  Recommendation:");
        info!(
            "    Limits: default={} max={}",
            self.recommendation.default_limit, self.recommendation.max_limit
        );
        info!(
            "    Fetch Timeout: {:?}",
            self.recommendation.fetch_timeout
        );
    }
}

impl StoreConfig {
    fn from_vars(vars: &Vars) -> Result<Self> {
        Ok(Self {
            backend: parsed_or(vars, "STORE_BACKEND", StoreBackend::Memory)?,
            seed_file: get(vars, "SEED_FILE").map(PathBuf::from),
            run_migrations: parsed_or(vars, "DB_RUN_MIGRATIONS", true)?,
            database: DatabaseConfig::from_vars(vars)?,
        })
    }
}

impl DatabaseConfig {
    fn from_vars(vars: &Vars) -> Result<Self> {
        let url = get(vars, "DATABASE_URL").unwrap_or_else(|| {
            let user = get(vars, "USER").unwrap_or_else(|| "postgres".to_string());
            format!("postgres://{}@localhost/eventdeck_dev", user)
        });

        Ok(Self {
            url,
            max_connections: parsed_or(vars, "DB_MAX_CONNECTIONS", 20)?,
            min_connections: parsed_or(vars, "DB_MIN_CONNECTIONS", 2)?,
            connect_timeout: Duration::from_secs(parsed_or(vars, "DB_CONNECT_TIMEOUT_SECS", 30)?),
            idle_timeout: Duration::from_secs(parsed_or(vars, "DB_IDLE_TIMEOUT_SECS", 600)?),
            max_lifetime: Duration::from_secs(parsed_or(vars, "DB_MAX_LIFETIME_SECS", 3600)?),
            statement_cache_size: parsed_or(vars, "DB_STATEMENT_CACHE_SIZE", 100)?,
        })
    }
}

impl ApiConfig {
    fn from_vars(vars: &Vars) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            port: parsed_or(vars, "API_PORT", defaults.port)?,
            host: get(vars, "API_HOST").unwrap_or(defaults.host),
            request_timeout: Duration::from_secs(parsed_or(
                vars,
                "API_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),
            max_concurrent_requests: parsed_or(
                vars,
                "API_MAX_CONCURRENT_REQUESTS",
                defaults.max_concurrent_requests,
            )?,
            cors_enabled: parsed_or(vars, "API_CORS_ENABLED", defaults.cors_enabled)?,
        })
    }
}

impl RecommendationConfig {
    fn from_vars(vars: &Vars) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            default_limit: parsed_or(vars, "REC_DEFAULT_LIMIT", defaults.default_limit)?,
            max_limit: parsed_or(vars, "REC_MAX_LIMIT", defaults.max_limit)?,
            location_prefix_len: parsed_or(
                vars,
                "REC_LOCATION_PREFIX_LEN",
                defaults.location_prefix_len,
            )?,
            fetch_timeout: Duration::from_millis(parsed_or(
                vars,
                "REC_FETCH_TIMEOUT_MS",
                defaults.fetch_timeout.as_millis() as u64,
            )?),
            slow_threshold_ms: parsed_or(vars, "REC_SLOW_THRESHOLD_MS", defaults.slow_threshold_ms)?,
        })
    }
}

impl LoggingConfig {
    fn from_vars(vars: &Vars) -> Result<Self> {
        let format = match get(vars, "LOG_FORMAT").as_deref() {
            None | Some("pretty") | Some("text") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(Error::InvalidConfig {
                    key: "LOG_FORMAT",
                    message: format!("expected 'pretty' or 'json', got '{}'", other).into(),
                })
            }
        };

        Ok(Self {
            format,
            dir: get(vars, "LOG_DIR").map(PathBuf::from),
            file_prefix: get(vars, "LOG_FILE_PREFIX").unwrap_or_else(|| "eventdeck.log".to_string()),
        })
    }
}

// ============================================================================
// Helper functions
// ============================================================================

/// Export each regular file in `folder` as a variable named after the file,
/// leaving variables that are already set alone. Returns how many were set.
fn load_env_folder(folder: &Path) -> std::io::Result<usize> {
    let mut loaded = 0;
    for entry in std::fs::read_dir(folder)?.flatten() {
        let fpath = entry.path();
        let Ok(fname) = entry.file_name().into_string() else {
            continue;
        };
        if !fpath.is_file() || std::env::var_os(&fname).is_some() {
            continue;
        }
        if let Ok(contents) = std::fs::read_to_string(&fpath) {
            std::env::set_var(&fname, contents.trim());
            loaded += 1;
        }
    }
    Ok(loaded)
}

/// Non-empty variable value
fn get(vars: &Vars, key: &str) -> Option<String> {
    vars.get(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a variable, falling back to `default` when unset
fn parsed_or<T>(vars: &Vars, key: &'static str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(vars, key) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| Error::InvalidConfig {
            key,
            message: format!("Invalid value '{}': {}", value, e).into(),
        }),
    }
}

/// Mask sensitive parts of URL
fn mask_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            let (before, after) = url.split_at(colon_pos + 1);
            let (_, rest) = after.split_at(at_pos - colon_pos - 1);
            return format!("{}****{}", before, rest);
        }
    }
    url.to_string()
}
