//! Configuration types for the watcher.
//!
//! Configuration is loaded from a TOML file (default
//! `~/.config/activitywatch/aw-watcher-ask/config.toml`) and then overridden
//! field by field from command-line flags before the question descriptor is
//! constructed. Every field has a default, so a minimal file only needs the
//! question id.

use crate::error::{Result, WatcherError};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Default ActivityWatch server port.
pub const DEFAULT_PORT: u16 = 5600;

/// ActivityWatch server port in testing mode.
pub const TESTING_PORT: u16 = 5666;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// The question to ask and its schedule.
    pub question: QuestionConfig,
    /// Event store endpoint and submission retry policy.
    pub server: ServerConfig,
    /// Prompting surface invocation settings.
    pub surface: SurfaceConfig,
}

/// The question to ask, its schedule, and its per-kind options.
///
/// Per-kind options are plain optional fields here; they are validated
/// against the question kind when the descriptor is constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuestionConfig {
    /// Stable identifier for all events produced by this question.
    ///
    /// Should contain only lower-case letters, digits, and dots; anything
    /// else is rewritten with a warning at startup.
    pub id: String,
    /// Question kind: `entry`, `confirmation`, `choice`, `scale`,
    /// `password`, or `calendar`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Dialog window title. Falls back to the question id when absent.
    pub title: Option<String>,
    /// Dialog body text.
    pub text: Option<String>,
    /// Six-field cron schedule, seconds first. `R` in the second, minute,
    /// or hour field picks a random in-range value at startup.
    pub schedule: String,
    /// Seconds to wait for an answer before the prompt times out.
    pub timeout_seconds: u64,
    /// Stop prompting at this instant. RFC 3339, or a bare
    /// `YYYY-MM-DD` / `YYYY-MM-DD HH:MM:SS` interpreted in local time.
    pub until: Option<String>,
    /// Record to the isolated testing namespace (and testing server port).
    pub testing: bool,
    /// Options presented by choice questions.
    pub choices: Vec<String>,
    /// Scale lower bound (scale questions only).
    pub min: Option<i64>,
    /// Scale upper bound (scale questions only).
    pub max: Option<i64>,
    /// Scale step (scale questions only).
    pub step: Option<i64>,
    /// Scale initial value (scale questions only; defaults to the midpoint).
    pub default: Option<i64>,
    /// Expected answer format for calendar questions (strftime-style).
    pub date_format: Option<String>,
}

impl Default for QuestionConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            kind: "confirmation".to_owned(),
            title: None,
            text: None,
            schedule: "0 R * * * *".to_owned(),
            timeout_seconds: 60,
            until: None,
            testing: false,
            choices: Vec::new(),
            min: None,
            max: None,
            step: None,
            default: None,
            date_format: None,
        }
    }
}

/// ActivityWatch server endpoint and submission retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host.
    pub host: String,
    /// Server port (None = 5600, or 5666 in testing mode).
    pub port: Option<u16>,
    /// Per-request timeout in seconds.
    pub request_timeout_seconds: u64,
    /// Extra submission attempts after the first failure.
    pub retry_count: u32,
    /// Base backoff delay between attempts in milliseconds.
    pub retry_delay_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: None,
            request_timeout_seconds: 10,
            retry_count: 3,
            retry_delay_ms: 500,
        }
    }
}

impl ServerConfig {
    /// The port to connect to, honoring the testing-mode default.
    pub fn effective_port(&self, testing: bool) -> u16 {
        self.port
            .unwrap_or(if testing { TESTING_PORT } else { DEFAULT_PORT })
    }

    /// Base URL of the server API.
    pub fn base_url(&self, testing: bool) -> String {
        format!("http://{}:{}", self.host, self.effective_port(testing))
    }
}

/// Prompting surface invocation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    /// Dialog program to invoke.
    pub binary: String,
    /// Grace period past the question timeout before the dialog process is
    /// killed outright.
    pub kill_grace_seconds: u64,
    /// Extra flags passed straight through to the surface, rendered as
    /// `--key=value` (or `--key` for an empty value). Never interpreted.
    pub extra: BTreeMap<String, String>,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            binary: "zenity".to_owned(),
            kill_grace_seconds: 5,
            extra: BTreeMap::new(),
        }
    }
}

impl WatcherConfig {
    /// Load configuration from a TOML file, falling back to defaults for
    /// missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| WatcherError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot
    /// be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| WatcherError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path:
    /// `<config dir>/activitywatch/aw-watcher-ask/config.toml`.
    ///
    /// Override the directory with the `AW_WATCHER_ASK_CONFIG_DIR`
    /// environment variable.
    pub fn default_config_path() -> PathBuf {
        config_dir().join("config.toml")
    }
}

/// Watcher config directory, following the ActivityWatch layout
/// (`~/.config/activitywatch/aw-watcher-ask` on Linux).
///
/// Override with the `AW_WATCHER_ASK_CONFIG_DIR` environment variable.
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("AW_WATCHER_ASK_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("activitywatch").join("aw-watcher-ask"))
        .unwrap_or_else(|| PathBuf::from("/tmp/aw-watcher-ask-config"))
}

/// Parse an expiry string.
///
/// Accepts RFC 3339 (`2026-12-31T23:59:59Z`), a bare date (`2026-12-31`,
/// midnight local time), or a naive datetime (`2026-12-31T23:59:59` or with
/// a space separator, local time).
///
/// # Errors
///
/// Returns [`WatcherError::Config`] when the string matches none of the
/// accepted shapes, or names a local time that does not exist (DST gap).
pub fn parse_expiry(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }

    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map(|d| d.and_hms_opt(0, 0, 0).unwrap_or_default())
        })
        .map_err(|_| {
            WatcherError::Config(format!(
                "cannot parse expiry '{raw}' (expected RFC 3339, YYYY-MM-DD, \
                 or YYYY-MM-DD HH:MM:SS)"
            ))
        })?;

    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| {
            WatcherError::Config(format!("expiry '{raw}' is not a valid local time"))
        })
}
