//! aw-watcher-ask: periodically ask the user a question and record the
//! answer in ActivityWatch.
//!
//! The watcher runs one question through a fixed cycle:
//! Schedule → Prompt → Normalize → Record
//!
//! # Architecture
//!
//! Each stage is an independent module:
//! - **Schedule**: six-field cron evaluation via `cron`, with an `R`
//!   token for random in-range times
//! - **Prompt**: a zenity-style dialog subprocess, bounded and killed on
//!   timeout
//! - **Normalize**: raw dialog output validated into a typed answer
//! - **Record**: events submitted to the ActivityWatch REST API via
//!   `reqwest`, with bounded retry

pub mod config;
pub mod error;
pub mod normalize;
pub mod question;
pub mod schedule;
pub mod store;
pub mod surface;
pub mod watcher;

pub use config::WatcherConfig;
pub use error::{Result, WatcherError};
pub use normalize::{AnswerValue, NormalizedAnswer};
pub use question::{QuestionDescriptor, QuestionKind};
pub use schedule::CronSchedule;
pub use store::{AwEvent, EventRecorder, RecorderConfig};
pub use surface::{PromptOutcome, PromptSurface, ZenitySurface};
pub use watcher::{Watcher, WatcherState};
