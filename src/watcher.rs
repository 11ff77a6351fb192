//! The prompt/record cycle.
//!
//! [`Watcher::run`] drives one question through its schedule until the
//! expiry instant passes or the watcher is cancelled:
//!
//! ```text
//! Scheduling ──► Waiting ──► Prompting ──► Recording ─┐
//!      ▲                                              │
//!      └──────────────────────────────────────────────┘
//!                        (any stage) ──► Stopped
//! ```
//!
//! Cancellation is honored immediately while waiting, kills the dialog
//! while prompting (the aborted cycle is still recorded as a surface
//! failure), and is deferred until after the submission while recording.

use crate::error::Result;
use crate::normalize::normalize;
use crate::question::QuestionDescriptor;
use crate::schedule::has_lapsed;
use crate::store::{EventRecorder, build_event};
use crate::surface::{PromptOutcome, PromptSurface};
use chrono::{Local, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Stage of the current cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    /// Evaluating the schedule for the next due instant.
    Scheduling,
    /// Sleeping until the due instant.
    Waiting,
    /// Dialog on screen, waiting for the user.
    Prompting,
    /// Submitting the event to the store.
    Recording,
    /// The loop has exited.
    Stopped,
}

impl fmt::Display for WatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Scheduling => "scheduling",
            Self::Waiting => "waiting",
            Self::Prompting => "prompting",
            Self::Recording => "recording",
            Self::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

/// Drives one question through its prompt/record cycle.
pub struct Watcher {
    question: QuestionDescriptor,
    surface: Arc<dyn PromptSurface>,
    recorder: EventRecorder,
    state: WatcherState,
    cancel: CancellationToken,
}

impl Watcher {
    /// Create a watcher over a question, a prompting surface, and a
    /// recorder.
    pub fn new(
        question: QuestionDescriptor,
        surface: Arc<dyn PromptSurface>,
        recorder: EventRecorder,
    ) -> Self {
        Self {
            question,
            surface,
            recorder,
            state: WatcherState::Scheduling,
            cancel: CancellationToken::new(),
        }
    }

    /// A handle that stops the watcher when cancelled. Clones share the
    /// same token, so any of them can trigger the shutdown.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The question this watcher asks.
    pub fn question(&self) -> &QuestionDescriptor {
        &self.question
    }

    /// Current cycle stage.
    pub fn state(&self) -> WatcherState {
        self.state
    }

    /// Run the cycle until expiry or cancellation.
    ///
    /// Returns `Ok(())` for both: a lapsed question and a clean shutdown
    /// are normal ends of service. Only scheduling errors propagate.
    pub async fn run(&mut self) -> Result<()> {
        tracing::info!(
            question = self.question.id(),
            schedule = %self.question.schedule(),
            "starting watcher"
        );

        loop {
            self.set_state(WatcherState::Scheduling);
            if has_lapsed(self.question.expiry(), Utc::now()) {
                tracing::info!(question = self.question.id(), "expiry reached, stopping");
                break;
            }
            if self.cancel.is_cancelled() {
                break;
            }

            let now = Local::now();
            let due = self.question.schedule().next_due(&now)?;
            if has_lapsed(self.question.expiry(), due.with_timezone(&Utc)) {
                tracing::info!(
                    question = self.question.id(),
                    "expiry falls before the next occurrence, stopping"
                );
                break;
            }
            tracing::info!(
                question = self.question.id(),
                due = %due.to_rfc3339(),
                "next prompt scheduled"
            );

            self.set_state(WatcherState::Waiting);
            let wait = (due - Local::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::info!(question = self.question.id(), "cancelled while waiting");
                    break;
                }
                () = tokio::time::sleep(wait) => {}
            }

            self.set_state(WatcherState::Prompting);
            tracing::info!(question = self.question.id(), "prompt fired, waiting for input");
            let outcome = tokio::select! {
                () = self.cancel.cancelled() => {
                    // Dropping the prompt future kills the dialog process.
                    PromptOutcome::SurfaceFailed {
                        reason: "watcher shut down during prompt".to_owned(),
                    }
                }
                outcome = self.surface.prompt(&self.question) => outcome,
            };
            let interrupted = self.cancel.is_cancelled();
            tracing::info!(question = self.question.id(), outcome = %outcome, "prompt finished");

            // A cycle that produced an outcome always gets its submission
            // attempt, even during shutdown.
            self.set_state(WatcherState::Recording);
            let answer = normalize(&self.question, &outcome);
            let event = build_event(&self.question, &outcome, &answer, Utc::now());
            if let Err(e) = self.recorder.record_with_retry(&event).await {
                tracing::error!(
                    question = self.question.id(),
                    error = %e,
                    "dropping event after exhausting submission attempts"
                );
            }

            if interrupted {
                break;
            }
        }

        self.set_state(WatcherState::Stopped);
        tracing::info!(question = self.question.id(), "watcher stopped");
        Ok(())
    }

    fn set_state(&mut self, state: WatcherState) {
        if self.state != state {
            tracing::debug!(
                question = self.question.id(),
                from = %self.state,
                to = %state,
                "state transition"
            );
            self.state = state;
        }
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("question", &self.question.id())
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::config::{QuestionConfig, WatcherConfig};
    use crate::store::RecorderConfig;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSurface {
        calls: Arc<AtomicUsize>,
        outcome: PromptOutcome,
    }

    #[async_trait]
    impl PromptSurface for CountingSurface {
        async fn prompt(&self, _question: &QuestionDescriptor) -> PromptOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }

    fn descriptor(question: QuestionConfig) -> QuestionDescriptor {
        let config = WatcherConfig {
            question,
            ..WatcherConfig::default()
        };
        QuestionDescriptor::from_config(&config).unwrap()
    }

    fn dead_end_recorder() -> EventRecorder {
        // Port unlikely to be in use; submissions fail fast.
        EventRecorder::new(
            RecorderConfig::new("http://127.0.0.1:19999")
                .with_hostname("testhost")
                .with_timeout_secs(1)
                .with_retry_count(0),
        )
    }

    #[tokio::test]
    async fn lapsed_question_exits_cleanly_without_prompting() {
        let question = descriptor(QuestionConfig {
            id: "lapsed.question".to_owned(),
            until: Some("2020-01-01".to_owned()),
            ..QuestionConfig::default()
        });
        let calls = Arc::new(AtomicUsize::new(0));
        let surface = Arc::new(CountingSurface {
            calls: calls.clone(),
            outcome: PromptOutcome::Dismissed,
        });

        let mut watcher = Watcher::new(question, surface, dead_end_recorder());
        watcher.run().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(watcher.state(), WatcherState::Stopped);
    }

    #[tokio::test]
    async fn cancellation_while_waiting_is_immediate() {
        // Due once a year; the watcher spends essentially forever waiting.
        let question = descriptor(QuestionConfig {
            id: "waiting.question".to_owned(),
            schedule: "0 0 0 1 1 *".to_owned(),
            ..QuestionConfig::default()
        });
        let calls = Arc::new(AtomicUsize::new(0));
        let surface = Arc::new(CountingSurface {
            calls: calls.clone(),
            outcome: PromptOutcome::Dismissed,
        });

        let mut watcher = Watcher::new(question, surface, dead_end_recorder());
        let token = watcher.cancellation_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });

        let start = std::time::Instant::now();
        watcher.run().await.unwrap();

        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(watcher.state(), WatcherState::Stopped);
    }

    #[tokio::test]
    async fn pre_cancelled_watcher_never_prompts() {
        let question = descriptor(QuestionConfig {
            id: "cancelled.question".to_owned(),
            schedule: "* * * * * *".to_owned(),
            ..QuestionConfig::default()
        });
        let calls = Arc::new(AtomicUsize::new(0));
        let surface = Arc::new(CountingSurface {
            calls: calls.clone(),
            outcome: PromptOutcome::Dismissed,
        });

        let mut watcher = Watcher::new(question, surface, dead_end_recorder());
        watcher.cancellation_token().cancel();
        watcher.run().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn expiry_before_next_occurrence_stops_without_prompting() {
        // Due once a year, expiry within the hour: the due instant falls
        // past the expiry, so no prompt should fire.
        let until = (Utc::now() + chrono::Duration::hours(1)).to_rfc3339();
        let question = descriptor(QuestionConfig {
            id: "closing.question".to_owned(),
            schedule: "0 0 0 1 1 *".to_owned(),
            until: Some(until),
            ..QuestionConfig::default()
        });
        let calls = Arc::new(AtomicUsize::new(0));
        let surface = Arc::new(CountingSurface {
            calls: calls.clone(),
            outcome: PromptOutcome::Dismissed,
        });

        let start = std::time::Instant::now();
        let mut watcher = Watcher::new(question, surface, dead_end_recorder());
        watcher.run().await.unwrap();

        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn state_labels_are_lowercase() {
        assert_eq!(WatcherState::Scheduling.to_string(), "scheduling");
        assert_eq!(WatcherState::Waiting.to_string(), "waiting");
        assert_eq!(WatcherState::Prompting.to_string(), "prompting");
        assert_eq!(WatcherState::Recording.to_string(), "recording");
        assert_eq!(WatcherState::Stopped.to_string(), "stopped");
    }
}
