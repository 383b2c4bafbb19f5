//! Settings loading and validation.
//!
//! Reads a YAML file (JSON is accepted too) and resolves environment
//! variables. Missing files fall back to defaults: the two document services
//! on localhost, a 5s connect bound, 30s calls and no retry.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mcp_client::client::Timeouts;
use crate::mcp_client::lifecycle::RetryPolicy;
use crate::mcp_client::types::ServerConfig;
use crate::services;

/// Env var that points at an explicit settings file.
pub const CONFIG_ENV_VAR: &str = "DOCMCP_CONFIG";

/// Settings file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "docmcp.yaml";

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("invalid config: {reason}")]
    Invalid { reason: String },
}

// ─── Public Types ────────────────────────────────────────────────────────────

/// Top-level settings (mirrors `docmcp.yaml`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Servers registered at startup, in order.
    #[serde(default = "services::default_servers")]
    pub servers: Vec<ServerConfig>,
    #[serde(default)]
    pub timeouts: TimeoutSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    /// Where uploaded documents are stored before processing.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutSettings {
    #[serde(default = "default_connect_ms")]
    pub connect_ms: u64,
    #[serde(default = "default_call_ms")]
    pub call_ms: u64,
    #[serde(default = "default_health_ms")]
    pub health_ms: u64,
}

/// Retry settings for `call_tool_with_retry`. One attempt means no retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./data/uploads")
}
fn default_connect_ms() -> u64 {
    5_000
}
fn default_call_ms() -> u64 {
    30_000
}
fn default_health_ms() -> u64 {
    5_000
}
fn default_max_attempts() -> u32 {
    1
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    8_000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            servers: services::default_servers(),
            timeouts: TimeoutSettings::default(),
            retry: RetrySettings::default(),
            upload_dir: default_upload_dir(),
        }
    }
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            connect_ms: default_connect_ms(),
            call_ms: default_call_ms(),
            health_ms: default_health_ms(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl TimeoutSettings {
    pub fn to_timeouts(self) -> Timeouts {
        Timeouts {
            connect: Duration::from_millis(self.connect_ms),
            call: Duration::from_millis(self.call_ms),
            health: Duration::from_millis(self.health_ms),
        }
    }
}

impl RetrySettings {
    pub fn to_policy(self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

impl Settings {
    /// Load settings from the first file found by [`find_settings_path`],
    /// or defaults when there is none.
    pub fn load() -> Result<Self, ConfigError> {
        match find_settings_path() {
            Some(path) => {
                tracing::info!(path = %path.display(), "loading settings");
                Self::from_path(&path)
            }
            None => {
                tracing::info!("no settings file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load and validate a settings file.
    ///
    /// Performs environment-variable interpolation on `${VAR_NAME}` and
    /// `${VAR_NAME:-default}` before parsing.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::parse(&raw, &path.display().to_string())
    }

    /// Parse settings from YAML text. `origin` names the source in errors.
    pub fn parse(raw: &str, origin: &str) -> Result<Self, ConfigError> {
        let interpolated = interpolate_env_vars(raw);

        let mut settings: Settings =
            serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::Parse {
                path: origin.to_string(),
                reason: e.to_string(),
            })?;

        settings.upload_dir = PathBuf::from(expand_tilde(&settings.upload_dir.to_string_lossy()));
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings that would only fail later at call time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen: Vec<&str> = Vec::with_capacity(self.servers.len());
        for server in &self.servers {
            if server.name.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    reason: format!("server with url '{}' has an empty name", server.url),
                });
            }
            if seen.contains(&server.name.as_str()) {
                return Err(ConfigError::Invalid {
                    reason: format!("duplicate server name '{}'", server.name),
                });
            }
            seen.push(&server.name);

            reqwest::Url::parse(&server.url).map_err(|e| ConfigError::Invalid {
                reason: format!("server '{}' has invalid url '{}': {e}", server.name, server.url),
            })?;
        }

        if self.timeouts.connect_ms == 0 || self.timeouts.call_ms == 0 || self.timeouts.health_ms == 0
        {
            return Err(ConfigError::Invalid {
                reason: "timeouts must be greater than zero".into(),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                reason: "retry.max_attempts must be at least 1".into(),
            });
        }

        Ok(())
    }
}

/// Locate the settings file.
///
/// 1. `DOCMCP_CONFIG`, returned even if the file is missing so the read
///    error surfaces.
/// 2. `./docmcp.yaml`.
/// 3. `{config_dir}/docmcp/config.yaml`.
pub fn find_settings_path() -> Option<PathBuf> {
    if let Ok(explicit) = std::env::var(CONFIG_ENV_VAR) {
        if !explicit.is_empty() {
            return Some(PathBuf::from(expand_tilde(&explicit)));
        }
    }

    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }

    dirs::config_dir()
        .map(|dir| dir.join("docmcp").join("config.yaml"))
        .filter(|candidate| candidate.exists())
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve `VAR` or `VAR:-default`. Unset variables without a default
/// become empty.
fn resolve_var_expr(expr: &str) -> String {
    match expr.split_once(":-") {
        Some((var_name, default)) => {
            std::env::var(var_name).unwrap_or_else(|_| expand_tilde(default))
        }
        None => std::env::var(expr).unwrap_or_default(),
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
