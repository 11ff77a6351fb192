//! Answer normalization.
//!
//! Converts a raw [`PromptOutcome`] into the typed value stored in event
//! payloads, validating it against the question's kind options. This stage
//! is total: an unusable answer never aborts a cycle, it degrades to
//! no-answer with a diagnostic note.

use crate::question::{KindOptions, QuestionDescriptor};
use crate::surface::{AFFIRMATIVE, NEGATIVE, PromptOutcome};
use thiserror::Error;

/// Why a raw answer could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    /// Confirmation answer was neither of the canonical tokens.
    #[error("answer '{value}' is not a recognized boolean token")]
    UnrecognizedBoolean {
        /// The raw answer.
        value: String,
    },
    /// Scale answer was not an integer.
    #[error("answer '{value}' is not an integer")]
    NotAnInteger {
        /// The raw answer.
        value: String,
    },
    /// Scale answer fell outside the configured bounds.
    #[error("answer {value} is outside the range {min}..={max}")]
    OutOfRange {
        /// The parsed answer.
        value: i64,
        /// Configured lower bound.
        min: i64,
        /// Configured upper bound.
        max: i64,
    },
    /// Choice answer was not one of the configured options.
    #[error("answer '{value}' is not one of the configured choices")]
    UnknownChoice {
        /// The raw answer.
        value: String,
    },
    /// Calendar answer did not match the expected date format.
    #[error("answer '{value}' does not match the date format '{format}'")]
    DateMismatch {
        /// The raw answer.
        value: String,
        /// The expected strftime-style format.
        format: String,
    },
}

/// A typed answer value, as it appears in the event payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerValue {
    /// Free text (entry and password questions).
    Text(String),
    /// Yes/no (confirmation questions).
    Bool(bool),
    /// Integer in range (scale questions).
    Integer(i64),
    /// One of the configured options (choice questions).
    Choice(String),
    /// A date string matching the configured format (calendar questions).
    Date(String),
    /// No usable answer this cycle.
    NoAnswer,
}

impl AnswerValue {
    /// JSON representation for the event payload. `NoAnswer` is `null`.
    pub fn as_json(&self) -> serde_json::Value {
        match self {
            Self::Text(s) | Self::Choice(s) | Self::Date(s) => {
                serde_json::Value::String(s.clone())
            }
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Integer(n) => serde_json::Value::Number((*n).into()),
            Self::NoAnswer => serde_json::Value::Null,
        }
    }

    /// Returns `true` if the cycle produced no usable answer.
    pub fn is_no_answer(&self) -> bool {
        matches!(self, Self::NoAnswer)
    }
}

/// Normalization result: the typed value plus an optional diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedAnswer {
    /// The typed answer value.
    pub value: AnswerValue,
    /// Diagnostic for degraded cycles (validation failure, surface failure).
    pub note: Option<String>,
}

impl NormalizedAnswer {
    fn none() -> Self {
        Self {
            value: AnswerValue::NoAnswer,
            note: None,
        }
    }

    fn degraded(note: String) -> Self {
        Self {
            value: AnswerValue::NoAnswer,
            note: Some(note),
        }
    }
}

/// Normalize a prompt outcome against the question that produced it.
///
/// Never fails: validation errors are logged and folded into a no-answer
/// result so the cycle still gets recorded.
pub fn normalize(question: &QuestionDescriptor, outcome: &PromptOutcome) -> NormalizedAnswer {
    match outcome {
        PromptOutcome::Answered { text } => match normalize_text(question, text) {
            Ok(value) => NormalizedAnswer { value, note: None },
            Err(e) => {
                tracing::warn!(question = question.id(), error = %e, "discarding unusable answer");
                NormalizedAnswer::degraded(e.to_string())
            }
        },
        PromptOutcome::Dismissed | PromptOutcome::TimedOut => NormalizedAnswer::none(),
        PromptOutcome::SurfaceFailed { reason } => NormalizedAnswer::degraded(reason.clone()),
    }
}

fn normalize_text(
    question: &QuestionDescriptor,
    text: &str,
) -> Result<AnswerValue, NormalizeError> {
    match question.options() {
        KindOptions::Entry | KindOptions::Password => Ok(AnswerValue::Text(text.to_owned())),
        KindOptions::Confirmation => {
            if text.eq_ignore_ascii_case(AFFIRMATIVE) {
                Ok(AnswerValue::Bool(true))
            } else if text.eq_ignore_ascii_case(NEGATIVE) {
                Ok(AnswerValue::Bool(false))
            } else {
                Err(NormalizeError::UnrecognizedBoolean {
                    value: text.to_owned(),
                })
            }
        }
        KindOptions::Scale { min, max, .. } => {
            let value: i64 =
                text.trim()
                    .parse()
                    .map_err(|_| NormalizeError::NotAnInteger {
                        value: text.to_owned(),
                    })?;
            if value < *min || value > *max {
                return Err(NormalizeError::OutOfRange {
                    value,
                    min: *min,
                    max: *max,
                });
            }
            Ok(AnswerValue::Integer(value))
        }
        KindOptions::Choice { choices } => {
            if choices.iter().any(|c| c == text) {
                Ok(AnswerValue::Choice(text.to_owned()))
            } else {
                Err(NormalizeError::UnknownChoice {
                    value: text.to_owned(),
                })
            }
        }
        KindOptions::Calendar { date_format } => {
            match chrono::NaiveDate::parse_from_str(text.trim(), date_format) {
                Ok(_) => Ok(AnswerValue::Date(text.trim().to_owned())),
                Err(_) => Err(NormalizeError::DateMismatch {
                    value: text.to_owned(),
                    format: date_format.clone(),
                }),
            }
        }
    }
}
