//! Event store client.
//!
//! Submits answer events to an ActivityWatch-compatible REST API. The
//! bucket is created lazily on the first submission; creation is
//! idempotent, so an already-existing bucket (304 or 409) counts as
//! success and is never retried against.
//!
//! # Failure Model
//!
//! A submission fails as one of two [`RecordError`] variants:
//!
//! - [`Unreachable`](RecordError::Unreachable): transport failure or a
//!   server-side (5xx) error; worth retrying
//! - [`Rejected`](RecordError::Rejected): the server understood the
//!   request and refused it (4xx); retrying cannot help

use crate::normalize::NormalizedAnswer;
use crate::question::QuestionDescriptor;
use crate::surface::PromptOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Client name reported to the server and used in the bucket id.
pub const CLIENT_NAME: &str = "aw-watcher-ask";

// ── Types ──────────────────────────────────────────────────────

/// Why an event could not be stored.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RecordError {
    /// The store could not be reached or answered with a server error.
    #[error("event store unreachable: {0}")]
    Unreachable(String),

    /// The store refused the request. Not retryable.
    #[error("event store rejected the request (HTTP {status}): {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body excerpt.
        message: String,
    },
}

impl RecordError {
    /// Returns `true` if another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

/// Result of a store operation.
pub type RecordResult<T> = Result<T, RecordError>;

/// A single event as the server stores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwEvent {
    /// Instant the answer was produced, UTC.
    pub timestamp: DateTime<Utc>,
    /// Always zero: an answer is a point in time, not a span.
    pub duration: f64,
    /// Event payload.
    pub data: serde_json::Value,
}

/// Build the event for one completed prompt cycle.
///
/// The payload always carries `question_id`, `question_type`, `answer`
/// (JSON-typed, `null` for no answer) and the outcome disposition; a
/// degraded cycle also carries a diagnostic `note`.
pub fn build_event(
    question: &QuestionDescriptor,
    outcome: &PromptOutcome,
    answer: &NormalizedAnswer,
    timestamp: DateTime<Utc>,
) -> AwEvent {
    let mut data = serde_json::json!({
        "question_id": question.id(),
        "question_type": question.kind().as_str(),
        "answer": answer.value.as_json(),
        "outcome": outcome.disposition(),
    });
    if let Some(note) = &answer.note {
        data["note"] = serde_json::Value::String(note.clone());
    }
    AwEvent {
        timestamp,
        duration: 0.0,
        data,
    }
}

/// Configuration for the event recorder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Base URL of the server, e.g. `http://127.0.0.1:5600`.
    pub base_url: String,
    /// Client name; carries a `test-` prefix in testing mode.
    pub client_name: String,
    /// Host this watcher runs on; part of the bucket id.
    pub hostname: String,
    /// Event type declared at bucket creation.
    pub event_type: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Extra submission attempts after the first failure.
    pub retry_count: u32,
    /// Initial delay between attempts in milliseconds.
    pub retry_delay_ms: u64,
}

impl RecorderConfig {
    /// Create a recorder config for a server base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        let server = crate::config::ServerConfig::default();
        Self {
            base_url: base_url.into(),
            client_name: CLIENT_NAME.to_owned(),
            hostname: detect_hostname(),
            event_type: "ask.question".to_owned(),
            timeout_secs: server.request_timeout_seconds,
            retry_count: server.retry_count,
            retry_delay_ms: server.retry_delay_ms,
        }
    }

    /// Build from the server section of the watcher configuration.
    ///
    /// Testing mode switches the port default and prefixes the client
    /// name with `test-`, which isolates the bucket namespace.
    pub fn from_server(server: &crate::config::ServerConfig, testing: bool) -> Self {
        let client_name = if testing {
            format!("test-{CLIENT_NAME}")
        } else {
            CLIENT_NAME.to_owned()
        };
        Self {
            base_url: server.base_url(testing),
            client_name,
            hostname: detect_hostname(),
            event_type: "ask.question".to_owned(),
            timeout_secs: server.request_timeout_seconds,
            retry_count: server.retry_count,
            retry_delay_ms: server.retry_delay_ms,
        }
    }

    /// Set the client name.
    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }

    /// Set the hostname.
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Set the event type declared at bucket creation.
    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = event_type.into();
        self
    }

    /// Set the per-request timeout in seconds.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Set the retry count.
    pub fn with_retry_count(mut self, count: u32) -> Self {
        self.retry_count = count;
        self
    }

    /// Set the initial retry delay in milliseconds.
    pub fn with_retry_delay_ms(mut self, ms: u64) -> Self {
        self.retry_delay_ms = ms;
        self
    }

    /// The bucket all events land in: `<client_name>_<hostname>`.
    pub fn bucket_id(&self) -> String {
        format!("{}_{}", self.client_name, self.hostname)
    }
}

// ── Recorder ───────────────────────────────────────────────────

/// Submits events to the store, creating the bucket on first use.
pub struct EventRecorder {
    /// Recorder configuration.
    config: RecorderConfig,
    /// Shared HTTP client.
    client: reqwest::Client,
    /// Set once the bucket is known to exist.
    bucket_ready: AtomicBool,
}

impl EventRecorder {
    /// Create a new recorder with the given configuration.
    pub fn new(config: RecorderConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            config,
            client,
            bucket_ready: AtomicBool::new(false),
        }
    }

    /// Returns a reference to the recorder configuration.
    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// The bucket all events land in.
    pub fn bucket_id(&self) -> String {
        self.config.bucket_id()
    }

    /// Create the bucket if it does not exist yet.
    ///
    /// Success is cached, so after the first positive response this is
    /// free. 2xx, 304 and 409 all mean the bucket exists.
    pub async fn ensure_bucket(&self) -> RecordResult<()> {
        if self.bucket_ready.load(Ordering::Relaxed) {
            return Ok(());
        }

        let bucket_id = self.config.bucket_id();
        let url = format!("{}/api/0/buckets/{}", self.base(), bucket_id);
        let body = serde_json::json!({
            "client": self.config.client_name,
            "type": self.config.event_type,
            "hostname": self.config.hostname,
        });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport)?;
        let status = resp.status();

        // 304/409 precede the 4xx check: "already exists" is success.
        if status.is_success() || status.as_u16() == 304 || status.as_u16() == 409 {
            self.bucket_ready.store(true, Ordering::Relaxed);
            tracing::debug!(bucket = %bucket_id, "bucket ready");
            Ok(())
        } else if status.is_client_error() {
            Err(RecordError::Rejected {
                status: status.as_u16(),
                message: body_excerpt(resp).await,
            })
        } else {
            Err(RecordError::Unreachable(format!(
                "bucket creation failed with HTTP {status}"
            )))
        }
    }

    /// Submit one event, creating the bucket first if needed.
    pub async fn record(&self, event: &AwEvent) -> RecordResult<()> {
        self.ensure_bucket().await?;

        let url = format!("{}/api/0/buckets/{}/events", self.base(), self.bucket_id());
        let resp = self
            .client
            .post(&url)
            .json(event)
            .send()
            .await
            .map_err(classify_transport)?;
        let status = resp.status();

        if status.is_success() {
            tracing::info!(bucket = %self.bucket_id(), "event stored");
            Ok(())
        } else if status.is_client_error() {
            Err(RecordError::Rejected {
                status: status.as_u16(),
                message: body_excerpt(resp).await,
            })
        } else {
            Err(RecordError::Unreachable(format!(
                "event submission failed with HTTP {status}"
            )))
        }
    }

    /// Submit with bounded exponential backoff.
    ///
    /// Retries only [`RecordError::Unreachable`]; a rejection is returned
    /// immediately. The delay doubles per attempt and is capped at the
    /// request timeout.
    pub async fn record_with_retry(&self, event: &AwEvent) -> RecordResult<()> {
        let max_attempts = self.config.retry_count.saturating_add(1);
        let mut last_err = RecordError::Unreachable("no attempts made".to_owned());

        for attempt in 0..max_attempts {
            match self.record(event).await {
                Ok(()) => return Ok(()),
                Err(e @ RecordError::Rejected { .. }) => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_attempts,
                        error = %e,
                        "event submission failed"
                    );
                    last_err = e;
                    if attempt + 1 < max_attempts {
                        let shift = attempt.min(63);
                        let multiplier = 1u64.checked_shl(shift).unwrap_or(u64::MAX);
                        let delay_ms = self.config.retry_delay_ms.saturating_mul(multiplier);
                        let max_delay_ms = self.config.timeout_secs.saturating_mul(1000);
                        let capped_delay = delay_ms.min(max_delay_ms);
                        tokio::time::sleep(Duration::from_millis(capped_delay)).await;
                    }
                }
            }
        }

        Err(last_err)
    }

    fn base(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }
}

// ── Helpers ────────────────────────────────────────────────────

/// Classify a reqwest transport error. Everything at this level is
/// retryable; only an HTTP status can reject.
fn classify_transport(err: reqwest::Error) -> RecordError {
    if err.is_timeout() {
        RecordError::Unreachable("request timed out".to_owned())
    } else if err.is_connect() {
        RecordError::Unreachable(format!("connection failed: {err}"))
    } else {
        RecordError::Unreachable(format!("transport error: {err}"))
    }
}

async fn body_excerpt(resp: reqwest::Response) -> String {
    let body = resp.text().await.unwrap_or_default();
    body.chars().take(500).collect()
}

/// Best-effort hostname detection.
///
/// Tries the `hostname` utility, then the `HOSTNAME` / `COMPUTERNAME`
/// environment variables, then falls back to `"unknown"`.
pub fn detect_hostname() -> String {
    if let Ok(output) = std::process::Command::new("hostname").output() {
        if output.status.success() {
            let name = String::from_utf8_lossy(&output.stdout).trim().to_owned();
            if !name.is_empty() {
                return name;
            }
        }
    }
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .ok()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown".to_owned())
}
