//! Zenity dialog driver.
//!
//! Maps each question kind onto zenity's argument conventions, runs the
//! dialog as a subprocess, and classifies its exit status. Zenity's exit
//! codes: 0 = answered, 1 = cancelled, 5 = its own `--timeout` fired. The
//! process also gets a hard bound of the question timeout plus a short
//! grace period, after which it is killed outright.
//!
//! Requires: `sudo apt install zenity` (or any program speaking the same
//! flag dialect, via `surface.binary`).

use super::{AFFIRMATIVE, NEGATIVE, PromptOutcome, PromptSurface};
use crate::config::SurfaceConfig;
use crate::question::{KindOptions, QuestionDescriptor, QuestionKind};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;

/// Zenity-backed prompting surface.
#[derive(Debug, Clone)]
pub struct ZenitySurface {
    binary: String,
    kill_grace_seconds: u64,
}

impl ZenitySurface {
    /// Create a surface from the configured binary and grace period.
    pub fn new(config: &SurfaceConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            kill_grace_seconds: config.kill_grace_seconds,
        }
    }

    /// The dialog program this surface invokes.
    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Check that the dialog program is reachable in `PATH`.
    ///
    /// A missing binary is not fatal here; every prompt degrades to
    /// [`PromptOutcome::SurfaceFailed`] on its own. A warning at startup
    /// beats a silent string of failed cycles, so the run loop probes this
    /// once before scheduling.
    pub fn is_available(&self) -> bool {
        which::which(&self.binary).is_ok()
    }

    /// Build the full argument vector for a question.
    ///
    /// Order: the kind flag with its options, then the common flags, then
    /// passthrough flags, then (for choice questions) the row values.
    fn build_args(question: &QuestionDescriptor) -> Vec<String> {
        let mut args = Vec::new();
        let mut rows = Vec::new();

        match question.options() {
            KindOptions::Entry => args.push("--entry".to_owned()),
            KindOptions::Confirmation => args.push("--question".to_owned()),
            KindOptions::Choice { choices } => {
                args.push("--list".to_owned());
                args.push(format!("--column={}", question.display_title()));
                rows.extend(choices.iter().cloned());
            }
            KindOptions::Scale {
                min,
                max,
                step,
                default,
            } => {
                args.push("--scale".to_owned());
                args.push(format!("--min-value={min}"));
                args.push(format!("--max-value={max}"));
                args.push(format!("--step={step}"));
                args.push(format!("--value={default}"));
            }
            KindOptions::Password => args.push("--password".to_owned()),
            KindOptions::Calendar { date_format } => {
                args.push("--calendar".to_owned());
                args.push(format!("--date-format={date_format}"));
            }
        }

        args.push(format!("--title={}", question.display_title()));
        if let Some(text) = question.text() {
            args.push(format!("--text={text}"));
        }
        args.push(format!("--timeout={}", question.timeout_seconds()));

        for (key, value) in question.passthrough() {
            if value.is_empty() {
                args.push(format!("--{key}"));
            } else {
                args.push(format!("--{key}={value}"));
            }
        }

        args.extend(rows);
        args
    }
}

#[async_trait]
impl PromptSurface for ZenitySurface {
    async fn prompt(&self, question: &QuestionDescriptor) -> PromptOutcome {
        let args = Self::build_args(question);
        tracing::debug!(binary = %self.binary, ?args, "invoking prompting surface");

        // kill_on_drop covers the cancellation path: if this future is
        // dropped mid-prompt the dialog is killed rather than orphaned.
        let mut child = match tokio::process::Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                return PromptOutcome::SurfaceFailed {
                    reason: format!("failed to start '{}': {e}", self.binary),
                };
            }
        };

        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();

        // Zenity's own --timeout exits with code 5; the hard bound only
        // fires for a frozen or misbehaving surface.
        let bound = Duration::from_secs(
            question
                .timeout_seconds()
                .saturating_add(self.kill_grace_seconds),
        );
        let status = match tokio::time::timeout(bound, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                return PromptOutcome::SurfaceFailed {
                    reason: format!("failed to wait for '{}': {e}", self.binary),
                };
            }
            Err(_) => {
                tracing::warn!(
                    binary = %self.binary,
                    bound_seconds = bound.as_secs(),
                    "surface outlived its bound, killing it"
                );
                let _ = child.kill().await;
                // Reap the zombie
                let _ = child.wait().await;
                return PromptOutcome::TimedOut;
            }
        };

        // Dialog answers are tiny, so reading after exit cannot stall.
        let stdout = read_pipe(stdout_pipe).await;
        let stderr = read_pipe(stderr_pipe).await;
        classify(question.kind(), status, &stdout, &stderr)
    }
}

async fn read_pipe<R>(pipe: Option<R>) -> String
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buf = String::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_string(&mut buf).await;
    }
    buf
}

/// Map an exit status onto a prompt outcome.
///
/// Confirmation dialogs carry their answer in the exit status alone:
/// 0 means yes, 1 means no. For every other kind, 1 is the cancel button
/// or a closed window.
fn classify(
    kind: QuestionKind,
    status: std::process::ExitStatus,
    stdout: &str,
    stderr: &str,
) -> PromptOutcome {
    match status.code() {
        Some(0) => {
            let text = if kind == QuestionKind::Confirmation {
                AFFIRMATIVE.to_owned()
            } else {
                stdout.trim().to_owned()
            };
            PromptOutcome::Answered { text }
        }
        Some(1) => {
            if kind == QuestionKind::Confirmation {
                PromptOutcome::Answered {
                    text: NEGATIVE.to_owned(),
                }
            } else {
                PromptOutcome::Dismissed
            }
        }
        Some(5) => PromptOutcome::TimedOut,
        Some(code) => PromptOutcome::SurfaceFailed {
            reason: format!("surface exited with code {code}: {}", stderr.trim()),
        },
        None => PromptOutcome::SurfaceFailed {
            reason: "surface terminated by signal".to_owned(),
        },
    }
}
