//! Question descriptors.
//!
//! A [`QuestionDescriptor`] is the immutable value the whole watcher runs
//! against: identifier, kind, display strings, validated per-kind options,
//! timeout, schedule, and expiry. It is constructed once at startup from the
//! merged configuration; every scheduling cycle re-reads the clock, never
//! the descriptor.

use crate::config::{QuestionConfig, WatcherConfig, parse_expiry};
use crate::error::{Result, WatcherError};
use crate::schedule::CronSchedule;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default expected answer format for calendar questions.
const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// The kind of dialog presented to the user.
///
/// This is a closed set. The richer dialog kinds some surfaces offer
/// (multi-field forms, file selection, list pickers with multiple columns)
/// are rejected at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionKind {
    /// Free-text entry field.
    Entry,
    /// Single yes/no confirmation.
    Confirmation,
    /// Selection among enumerated options.
    Choice,
    /// Bounded numeric scale.
    Scale,
    /// Masked text entry.
    Password,
    /// Calendar date selection.
    Calendar,
}

impl QuestionKind {
    /// Parse a kind name from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::Question`] for recognized-but-unsupported
    /// kinds (`forms`, `file-selection`, `list`) and for unknown names.
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "entry" => Ok(Self::Entry),
            "confirmation" => Ok(Self::Confirmation),
            "choice" => Ok(Self::Choice),
            "scale" => Ok(Self::Scale),
            "password" => Ok(Self::Password),
            "calendar" => Ok(Self::Calendar),
            "forms" | "file-selection" | "list" => Err(WatcherError::Question(format!(
                "question type '{name}' is not supported"
            ))),
            _ => Err(WatcherError::Question(format!(
                "unknown question type '{name}' (expected one of: entry, \
                 confirmation, choice, scale, password, calendar)"
            ))),
        }
    }

    /// Canonical name, as stored in event payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Confirmation => "confirmation",
            Self::Choice => "choice",
            Self::Scale => "scale",
            Self::Password => "password",
            Self::Calendar => "calendar",
        }
    }
}

impl std::fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Validated per-kind options.
///
/// Exactly one variant applies per [`QuestionKind`]; construction fails when
/// the configuration supplies options belonging to a different kind, so a
/// typo never silently disappears.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KindOptions {
    /// No options.
    Entry,
    /// No options.
    Confirmation,
    /// The enumerated options, in display order.
    Choice { choices: Vec<String> },
    /// Inclusive bounds, step, and initial value.
    Scale {
        min: i64,
        max: i64,
        step: i64,
        default: i64,
    },
    /// No options.
    Password,
    /// Expected answer format (strftime-style).
    Calendar { date_format: String },
}

/// Immutable description of one recurring prompt.
#[derive(Debug, Clone)]
pub struct QuestionDescriptor {
    id: String,
    kind: QuestionKind,
    title: Option<String>,
    text: Option<String>,
    options: KindOptions,
    passthrough: BTreeMap<String, String>,
    timeout_seconds: u64,
    schedule: CronSchedule,
    expiry: Option<DateTime<Utc>>,
    testing: bool,
}

impl QuestionDescriptor {
    /// Build and validate a descriptor from merged configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when the id is empty, the kind is unsupported or
    /// unknown, per-kind options are missing or malformed, the timeout is
    /// zero, the schedule does not parse, or the expiry does not parse.
    pub fn from_config(config: &WatcherConfig) -> Result<Self> {
        let question = &config.question;
        let kind = QuestionKind::parse(&question.kind)?;
        let id = canonical_id(&question.id)?;
        let options = build_options(kind, question)?;

        if question.timeout_seconds == 0 {
            return Err(WatcherError::Question(
                "timeout must be at least 1 second".to_owned(),
            ));
        }

        let schedule = CronSchedule::parse(&question.schedule)?;
        let expiry = question.until.as_deref().map(parse_expiry).transpose()?;

        Ok(Self {
            id,
            kind,
            title: question.title.clone(),
            text: question.text.clone(),
            options,
            passthrough: config.surface.extra.clone(),
            timeout_seconds: question.timeout_seconds,
            schedule,
            expiry,
            testing: question.testing,
        })
    }

    /// Stable identifier for events produced by this descriptor.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The question kind.
    pub fn kind(&self) -> QuestionKind {
        self.kind
    }

    /// Configured dialog title, if any.
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// The title actually shown: the configured one, or the id.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.id)
    }

    /// Dialog body text, if any.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Validated per-kind options.
    pub fn options(&self) -> &KindOptions {
        &self.options
    }

    /// Opaque extra surface flags, in key order.
    pub fn passthrough(&self) -> &BTreeMap<String, String> {
        &self.passthrough
    }

    /// How long to wait for a human response.
    pub fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds
    }

    /// The recurrence schedule.
    pub fn schedule(&self) -> &CronSchedule {
        &self.schedule
    }

    /// Instant after which no further prompts are issued.
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expiry
    }

    /// Whether events go to the isolated testing namespace.
    pub fn testing(&self) -> bool {
        self.testing
    }
}

/// Canonicalize a question id: lower-case, with runs of characters outside
/// `[a-z0-9.]` replaced by a single dot and edge dots trimmed. Logs a warning
/// when the id had to be rewritten.
///
/// # Errors
///
/// Returns [`WatcherError::Question`] when nothing usable remains.
fn canonical_id(raw: &str) -> Result<String> {
    let mut fixed = String::with_capacity(raw.len());
    for c in raw.trim().to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' {
            fixed.push(c);
        } else if !fixed.is_empty() && !fixed.ends_with('.') {
            fixed.push('.');
        }
    }
    let fixed = fixed.trim_matches('.').to_owned();

    if fixed.is_empty() {
        return Err(WatcherError::Question(format!(
            "question id '{raw}' is empty after removing invalid characters"
        )));
    }
    if fixed != raw {
        tracing::warn!(provided = raw, fixed = %fixed, "question id rewritten");
    }
    Ok(fixed)
}

/// Validate the per-kind options against the declared kind.
fn build_options(kind: QuestionKind, question: &QuestionConfig) -> Result<KindOptions> {
    // Options belonging to a kind other than the declared one are an error,
    // not noise.
    if kind != QuestionKind::Choice && !question.choices.is_empty() {
        return Err(WatcherError::Question(format!(
            "choices are only valid for choice questions, not '{kind}'"
        )));
    }
    if kind != QuestionKind::Scale
        && (question.min.is_some()
            || question.max.is_some()
            || question.step.is_some()
            || question.default.is_some())
    {
        return Err(WatcherError::Question(format!(
            "min/max/step/default are only valid for scale questions, not '{kind}'"
        )));
    }
    if kind != QuestionKind::Calendar && question.date_format.is_some() {
        return Err(WatcherError::Question(format!(
            "date_format is only valid for calendar questions, not '{kind}'"
        )));
    }

    match kind {
        QuestionKind::Entry => Ok(KindOptions::Entry),
        QuestionKind::Confirmation => Ok(KindOptions::Confirmation),
        QuestionKind::Password => Ok(KindOptions::Password),
        QuestionKind::Choice => {
            let choices = question.choices.clone();
            if choices.is_empty() {
                return Err(WatcherError::Question(
                    "choice questions need at least one choice".to_owned(),
                ));
            }
            if choices.iter().any(|c| c.trim().is_empty()) {
                return Err(WatcherError::Question(
                    "choices must not be empty strings".to_owned(),
                ));
            }
            let mut seen = std::collections::BTreeSet::new();
            for choice in &choices {
                if !seen.insert(choice.as_str()) {
                    return Err(WatcherError::Question(format!(
                        "duplicate choice '{choice}'"
                    )));
                }
            }
            Ok(KindOptions::Choice { choices })
        }
        QuestionKind::Scale => {
            let min = question.min.unwrap_or(0);
            let max = question.max.unwrap_or(100);
            let step = question.step.unwrap_or(1);
            let default = question.default.unwrap_or((min + max) / 2);
            if min >= max {
                return Err(WatcherError::Question(format!(
                    "scale bounds must satisfy min < max (got {min}..{max})"
                )));
            }
            if step < 1 {
                return Err(WatcherError::Question(format!(
                    "scale step must be at least 1 (got {step})"
                )));
            }
            if default < min || default > max {
                return Err(WatcherError::Question(format!(
                    "scale default {default} outside bounds {min}..{max}"
                )));
            }
            Ok(KindOptions::Scale {
                min,
                max,
                step,
                default,
            })
        }
        QuestionKind::Calendar => {
            let date_format = question
                .date_format
                .clone()
                .unwrap_or_else(|| DEFAULT_DATE_FORMAT.to_owned());
            let has_error = chrono::format::StrftimeItems::new(&date_format)
                .any(|item| matches!(item, chrono::format::Item::Error));
            if has_error {
                return Err(WatcherError::Question(format!(
                    "invalid date format '{date_format}'"
                )));
            }
            Ok(KindOptions::Calendar { date_format })
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::config::WatcherConfig;

    fn config_with(id: &str, kind: &str) -> WatcherConfig {
        let mut config = WatcherConfig::default();
        config.question.id = id.to_owned();
        config.question.kind = kind.to_owned();
        config.question.schedule = "0 0 * * * *".to_owned();
        config
    }

    // ── construction ──────────────────────────────────────────────────

    #[test]
    fn minimal_confirmation_descriptor() {
        let config = config_with("lunch.mood", "confirmation");
        let q = QuestionDescriptor::from_config(&config).unwrap();
        assert_eq!(q.id(), "lunch.mood");
        assert_eq!(q.kind(), QuestionKind::Confirmation);
        assert_eq!(q.options(), &KindOptions::Confirmation);
        assert_eq!(q.timeout_seconds(), 60);
        assert_eq!(q.display_title(), "lunch.mood");
        assert!(q.expiry().is_none());
        assert!(!q.testing());
    }

    #[test]
    fn title_overrides_display_title() {
        let mut config = config_with("lunch.mood", "entry");
        config.question.title = Some("How was lunch?".to_owned());
        let q = QuestionDescriptor::from_config(&config).unwrap();
        assert_eq!(q.display_title(), "How was lunch?");
        assert_eq!(q.title(), Some("How was lunch?"));
    }

    #[test]
    fn passthrough_flags_are_carried() {
        let mut config = config_with("lunch.mood", "entry");
        config
            .surface
            .extra
            .insert("width".to_owned(), "480".to_owned());
        let q = QuestionDescriptor::from_config(&config).unwrap();
        assert_eq!(q.passthrough().get("width").map(String::as_str), Some("480"));
    }

    #[test]
    fn expiry_is_parsed() {
        let mut config = config_with("lunch.mood", "entry");
        config.question.until = Some("2024-01-01T00:00:00Z".to_owned());
        let q = QuestionDescriptor::from_config(&config).unwrap();
        assert!(q.expiry().is_some());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut config = config_with("lunch.mood", "entry");
        config.question.timeout_seconds = 0;
        let err = QuestionDescriptor::from_config(&config).unwrap_err();
        assert!(matches!(err, WatcherError::Question(_)), "{err}");
    }

    #[test]
    fn invalid_schedule_fails_at_construction() {
        let mut config = config_with("lunch.mood", "entry");
        config.question.schedule = "61 * * * * *".to_owned();
        let err = QuestionDescriptor::from_config(&config).unwrap_err();
        assert!(matches!(err, WatcherError::InvalidSchedule(_)), "{err}");
    }

    // ── id canonicalization ───────────────────────────────────────────

    #[test]
    fn valid_id_is_unchanged() {
        assert_eq!(canonical_id("lunch.mood2").unwrap(), "lunch.mood2");
    }

    #[test]
    fn invalid_characters_become_dots() {
        assert_eq!(canonical_id("Lunch Mood!").unwrap(), "lunch.mood");
        assert_eq!(canonical_id("How are you?").unwrap(), "how.are.you");
    }

    #[test]
    fn empty_id_is_rejected() {
        assert!(canonical_id("").is_err());
        assert!(canonical_id("???").is_err());
        assert!(canonical_id("   ").is_err());
    }

    // ── kind parsing ──────────────────────────────────────────────────

    #[test]
    fn all_supported_kinds_parse() {
        for (name, kind) in [
            ("entry", QuestionKind::Entry),
            ("confirmation", QuestionKind::Confirmation),
            ("choice", QuestionKind::Choice),
            ("scale", QuestionKind::Scale),
            ("password", QuestionKind::Password),
            ("calendar", QuestionKind::Calendar),
        ] {
            assert_eq!(QuestionKind::parse(name).unwrap(), kind);
            assert_eq!(kind.as_str(), name);
        }
    }

    #[test]
    fn unsupported_kinds_are_rejected_by_name() {
        for name in ["forms", "file-selection", "list"] {
            let err = QuestionKind::parse(name).unwrap_err();
            assert!(err.to_string().contains("not supported"), "{err}");
        }
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = QuestionKind::parse("wizard").unwrap_err();
        assert!(err.to_string().contains("unknown question type"), "{err}");
    }

    // ── choice options ────────────────────────────────────────────────

    #[test]
    fn choice_requires_choices() {
        let config = config_with("pick.one", "choice");
        let err = QuestionDescriptor::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("at least one choice"), "{err}");
    }

    #[test]
    fn choice_with_options_constructs() {
        let mut config = config_with("pick.one", "choice");
        config.question.choices = vec!["good".to_owned(), "meh".to_owned(), "bad".to_owned()];
        let q = QuestionDescriptor::from_config(&config).unwrap();
        match q.options() {
            KindOptions::Choice { choices } => assert_eq!(choices.len(), 3),
            other => panic!("expected choice options, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_choices_are_rejected() {
        let mut config = config_with("pick.one", "choice");
        config.question.choices = vec!["good".to_owned(), "good".to_owned()];
        let err = QuestionDescriptor::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("duplicate choice"), "{err}");
    }

    #[test]
    fn choices_on_a_non_choice_kind_are_rejected() {
        let mut config = config_with("lunch.mood", "scale");
        config.question.choices = vec!["good".to_owned()];
        let err = QuestionDescriptor::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("only valid for choice"), "{err}");
    }

    // ── scale options ─────────────────────────────────────────────────

    #[test]
    fn scale_defaults_to_zero_to_hundred_midpoint() {
        let config = config_with("energy", "scale");
        let q = QuestionDescriptor::from_config(&config).unwrap();
        assert_eq!(
            q.options(),
            &KindOptions::Scale {
                min: 0,
                max: 100,
                step: 1,
                default: 50
            }
        );
    }

    #[test]
    fn scale_default_is_the_midpoint_of_explicit_bounds() {
        let mut config = config_with("energy", "scale");
        config.question.min = Some(1);
        config.question.max = Some(5);
        let q = QuestionDescriptor::from_config(&config).unwrap();
        assert_eq!(
            q.options(),
            &KindOptions::Scale {
                min: 1,
                max: 5,
                step: 1,
                default: 3
            }
        );
    }

    #[test]
    fn scale_rejects_inverted_bounds() {
        let mut config = config_with("energy", "scale");
        config.question.min = Some(10);
        config.question.max = Some(5);
        let err = QuestionDescriptor::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("min < max"), "{err}");
    }

    #[test]
    fn scale_rejects_zero_step_and_out_of_bounds_default() {
        let mut config = config_with("energy", "scale");
        config.question.min = Some(1);
        config.question.max = Some(5);
        config.question.step = Some(0);
        assert!(QuestionDescriptor::from_config(&config).is_err());

        config.question.step = Some(1);
        config.question.default = Some(9);
        assert!(QuestionDescriptor::from_config(&config).is_err());
    }

    #[test]
    fn scale_options_on_a_non_scale_kind_are_rejected() {
        let mut config = config_with("lunch.mood", "entry");
        config.question.max = Some(5);
        let err = QuestionDescriptor::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("only valid for scale"), "{err}");
    }

    // ── calendar options ──────────────────────────────────────────────

    #[test]
    fn calendar_defaults_to_iso_date_format() {
        let config = config_with("deadline", "calendar");
        let q = QuestionDescriptor::from_config(&config).unwrap();
        assert_eq!(
            q.options(),
            &KindOptions::Calendar {
                date_format: "%Y-%m-%d".to_owned()
            }
        );
    }

    #[test]
    fn calendar_rejects_invalid_format() {
        let mut config = config_with("deadline", "calendar");
        config.question.date_format = Some("%Q".to_owned());
        let err = QuestionDescriptor::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("invalid date format"), "{err}");
    }

    #[test]
    fn date_format_on_a_non_calendar_kind_is_rejected() {
        let mut config = config_with("lunch.mood", "entry");
        config.question.date_format = Some("%Y-%m-%d".to_owned());
        let err = QuestionDescriptor::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("only valid for calendar"), "{err}");
    }
}
