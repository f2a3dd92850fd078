//! Centralized configuration for platformctl.
//!
//! All environment variables are loaded and validated at startup to fail fast
//! on misconfiguration rather than on first use of a backend.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use domain::BackendKind;
use supabase_adapter::SupabaseConfig;

pub const DEFAULT_JWT_SECRET: &str = "default-secret-change-in-production";
const DEFAULT_JWT_EXPIRES_IN: &str = "7d";

/// Log output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub struct ConfigError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configuration error for {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Process configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend the user repository is wired to (default: memory)
    pub storage_provider: BackendKind,
    /// SQLite database path (when using sqlite storage)
    pub db_path: Option<PathBuf>,
    /// Supabase project settings
    pub supabase: SupabaseConfig,
    /// Token signing secret
    pub jwt_secret: String,
    /// Token lifetime (default: 7 days)
    pub jwt_expires_in: Duration,
    /// PBKDF2 cost for new password hashes
    pub password_hash_iterations: u32,
    /// Log format
    pub log_format: LogFormat,
    /// Default filter directive when RUST_LOG is unset
    pub log_level: String,
}

impl Config {
    /// Load and validate configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        // Storage provider
        let storage_provider = match var("STORAGE_PROVIDER") {
            None => BackendKind::Memory,
            Some(raw) => BackendKind::parse(&raw).ok_or_else(|| ConfigError {
                field: "STORAGE_PROVIDER",
                message: format!(
                    "Unknown provider '{}'; expected one of: {}",
                    raw,
                    BackendKind::ALL
                        .iter()
                        .map(|k| k.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            })?,
        };

        // DB path (for sqlite)
        let db_path = var("DB_PATH").map(PathBuf::from);
        if storage_provider == BackendKind::Sqlite && db_path.is_none() {
            return Err(ConfigError {
                field: "DB_PATH",
                message: "Required when STORAGE_PROVIDER=sqlite".into(),
            });
        }

        // Supabase
        let timeout = match var("SUPABASE_TIMEOUT_SECS") {
            None => None,
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Some(Duration::from_secs(secs)),
                _ => {
                    return Err(ConfigError {
                        field: "SUPABASE_TIMEOUT_SECS",
                        message: format!("Expected a positive number of seconds, got '{}'", raw),
                    })
                }
            },
        };
        let supabase = SupabaseConfig {
            url: var("SUPABASE_URL"),
            anon_key: var("SUPABASE_ANON_KEY"),
            service_key: var("SUPABASE_SERVICE_KEY"),
            timeout,
        };
        if storage_provider == BackendKind::Supabase {
            if supabase.url.is_none() {
                return Err(ConfigError {
                    field: "SUPABASE_URL",
                    message: "Required when STORAGE_PROVIDER=supabase".into(),
                });
            }
            if supabase.anon_key.is_none() {
                return Err(ConfigError {
                    field: "SUPABASE_ANON_KEY",
                    message: "Required when STORAGE_PROVIDER=supabase".into(),
                });
            }
        }

        // Tokens
        let jwt_secret = var("JWT_SECRET").unwrap_or_else(|| DEFAULT_JWT_SECRET.into());
        let expires_raw = var("JWT_EXPIRES_IN").unwrap_or_else(|| DEFAULT_JWT_EXPIRES_IN.into());
        let jwt_expires_in = token_auth::parse_ttl(&expires_raw).map_err(|e| ConfigError {
            field: "JWT_EXPIRES_IN",
            message: e.to_string(),
        })?;

        // Password hashing
        let password_hash_iterations = match var("PASSWORD_HASH_ITERATIONS") {
            None => token_auth::DEFAULT_ITERATIONS,
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 && n <= token_auth::MAX_ITERATIONS => n,
                _ => {
                    return Err(ConfigError {
                        field: "PASSWORD_HASH_ITERATIONS",
                        message: format!(
                            "Expected an integer between 1 and {}, got '{}'",
                            token_auth::MAX_ITERATIONS,
                            raw
                        ),
                    })
                }
            },
        };

        // Logging
        let log_format =
            LogFormat::from_str(&var("LOG_FORMAT").unwrap_or_else(|| "pretty".into()));
        let log_level = var("LOG_LEVEL").unwrap_or_else(|| "info".into());

        Ok(Self {
            storage_provider,
            db_path,
            supabase,
            jwt_secret,
            jwt_expires_in,
            password_hash_iterations,
            log_format,
            log_level,
        })
    }

    /// Log warnings about insecure configuration.
    pub fn warn_if_insecure(&self) {
        if self.jwt_secret == DEFAULT_JWT_SECRET {
            tracing::warn!(
                "JWT_SECRET not set: tokens are signed with the built-in development secret. \
                 DO NOT USE IN PRODUCTION."
            );
        }
        if self.storage_provider == BackendKind::Memory {
            tracing::warn!("STORAGE_PROVIDER=memory: data is lost when the process exits.");
        }
    }
}
