//! Prompting surface boundary.
//!
//! The surface is an external program that paints a dialog and returns the
//! user's raw response through stdout and its exit status. The watcher
//! treats it as an untrusted, potentially hanging subprocess: bounded wait,
//! hard kill on expiry, and every recoverable problem expressed as an
//! outcome value rather than an error.

pub mod zenity;

pub use zenity::ZenitySurface;

use crate::question::QuestionDescriptor;
use async_trait::async_trait;

/// Canonical affirmative token emitted for confirmation dialogs.
pub const AFFIRMATIVE: &str = "Yes";

/// Canonical negative token emitted for confirmation dialogs.
pub const NEGATIVE: &str = "No";

/// Classified result of one prompt.
///
/// Created by the surface driver, consumed immediately by answer
/// normalization, never persisted as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptOutcome {
    /// The user provided a value.
    Answered {
        /// Raw text as emitted by the surface.
        text: String,
    },
    /// The user cancelled or closed the dialog.
    Dismissed,
    /// The wait bound elapsed with no response.
    TimedOut,
    /// The surface failed to start or exited with an unexpected status.
    SurfaceFailed {
        /// Human-readable failure description.
        reason: String,
    },
}

impl PromptOutcome {
    /// Returns `true` if the user provided a value.
    pub fn is_answered(&self) -> bool {
        matches!(self, Self::Answered { .. })
    }

    /// Short disposition tag, as stored in event payloads.
    pub fn disposition(&self) -> &'static str {
        match self {
            Self::Answered { .. } => "answered",
            Self::Dismissed => "dismissed",
            Self::TimedOut => "timed_out",
            Self::SurfaceFailed { .. } => "surface_failed",
        }
    }
}

// Deliberately does not echo the answer text: it may be a password.
impl std::fmt::Display for PromptOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Answered { .. } => write!(f, "answered"),
            Self::Dismissed => write!(f, "dismissed by user"),
            Self::TimedOut => write!(f, "timed out"),
            Self::SurfaceFailed { reason } => write!(f, "surface failed: {reason}"),
        }
    }
}

/// Drives the external prompting surface. Implemented by [`ZenitySurface`]
/// and by test fakes.
#[async_trait]
pub trait PromptSurface: Send + Sync {
    /// Present the question and classify the result, bounded by the
    /// question's timeout.
    ///
    /// Never fails past this boundary: a missing binary, a killed dialog,
    /// or an unexpected exit status all come back as outcome values.
    async fn prompt(&self, question: &QuestionDescriptor) -> PromptOutcome;
}
