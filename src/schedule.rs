//! Cron schedule evaluation.
//!
//! Schedules are six-field cron expressions, seconds first:
//! `second minute hour day-of-month month day-of-week`. Day-of-week numerals
//! are Sunday-based (`0` = Sunday, `7` accepted as Sunday again), matching
//! classic crontab conventions; named days (`MON`, `tue`, ...) work as well.
//! The second, minute, and hour fields additionally accept the token `R`,
//! which is replaced by a uniformly random in-range value fixed at parse
//! time: `0 R * * * *` fires at the same random minute of every hour.

use crate::error::{Result, WatcherError};
use chrono::{DateTime, TimeZone, Utc};
use std::str::FromStr;

/// Search horizon for [`CronSchedule::next_due`], in days (roughly four
/// years, covering the common leap-year cycle). A schedule whose next match
/// lies beyond this horizon is reported as never matching rather than
/// silently scheduling a prompt years out.
const NEVER_MATCH_HORIZON_DAYS: i64 = 1461;

/// Inclusive upper bounds for the fields that accept the `R` token.
const RANDOM_FIELD_MAX: [u32; 3] = [59, 59, 23];

/// A parsed six-field cron schedule.
///
/// Parsing validates field count, field ranges, and day-of-week numerals up
/// front, so an invalid expression is rejected when the descriptor is
/// constructed, never mid-loop.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    /// The expression as the user wrote it (for display and logs).
    expression: String,
    /// The expression after `R` resolution and day-of-week rewriting.
    resolved: String,
    inner: cron::Schedule,
}

impl CronSchedule {
    /// Parse a six-field cron expression.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::InvalidSchedule`] when the expression does
    /// not have exactly six fields, a field value is out of range, or the
    /// expression cannot be parsed.
    pub fn parse(expression: &str) -> Result<Self> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 6 {
            return Err(WatcherError::InvalidSchedule(format!(
                "expected 6 fields (second minute hour day-of-month month day-of-week), \
                 got {} in '{expression}'",
                fields.len()
            )));
        }

        let mut resolved: Vec<String> = Vec::with_capacity(6);
        for (ix, field) in fields.iter().enumerate() {
            let value = match ix {
                0..=2 => resolve_random_token(field, RANDOM_FIELD_MAX[ix]),
                5 => shift_day_of_week_field(field)?,
                _ => (*field).to_owned(),
            };
            resolved.push(value);
        }
        let resolved = resolved.join(" ");

        let inner = cron::Schedule::from_str(&resolved).map_err(|e| {
            WatcherError::InvalidSchedule(format!("'{expression}': {e}"))
        })?;

        if resolved != expression {
            tracing::debug!(expression, resolved, "schedule normalized");
        }

        Ok(Self {
            expression: expression.to_owned(),
            resolved,
            inner,
        })
    }

    /// The expression as originally provided.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The expression actually evaluated, after `R` resolution and
    /// day-of-week rewriting.
    pub fn resolved(&self) -> &str {
        &self.resolved
    }

    /// The earliest instant strictly after `after` matching this schedule.
    ///
    /// Generic over the timezone so the run loop can evaluate in local time
    /// while tests pin UTC.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::ScheduleNeverMatches`] when no matching
    /// instant exists within [`NEVER_MATCH_HORIZON_DAYS`] of `after`.
    pub fn next_due<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Result<DateTime<Tz>> {
        let next = self.inner.after(after).next().ok_or_else(|| {
            WatcherError::ScheduleNeverMatches(format!(
                "'{}' has no future occurrence",
                self.expression
            ))
        })?;

        let horizon = after.clone() + chrono::Duration::days(NEVER_MATCH_HORIZON_DAYS);
        if next > horizon {
            return Err(WatcherError::ScheduleNeverMatches(format!(
                "'{}' has no occurrence within {NEVER_MATCH_HORIZON_DAYS} days",
                self.expression
            )));
        }

        Ok(next)
    }
}

impl std::fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.expression)
    }
}

/// Returns `true` iff an expiry is set and `now` has reached it.
pub fn has_lapsed(expiry: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    expiry.is_some_and(|e| now >= e)
}

/// Replace a bare `R` with a random in-range value; other tokens pass
/// through untouched.
fn resolve_random_token(field: &str, max: u32) -> String {
    if field.eq_ignore_ascii_case("r") {
        use rand::Rng;
        rand::thread_rng().gen_range(0..=max).to_string()
    } else {
        field.to_owned()
    }
}

/// Rewrite Sunday-based day-of-week numerals (0–6, plus 7 as Sunday) to the
/// evaluation backend's convention, which counts Sunday as 1. Applies inside
/// lists, ranges, and step suffixes; named days pass through.
fn shift_day_of_week_field(field: &str) -> Result<String> {
    if field == "*" || field == "?" {
        return Ok(field.to_owned());
    }

    let mut parts: Vec<String> = Vec::new();
    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => (range, Some(step)),
            None => (part, None),
        };

        let shifted = if range == "*" {
            range.to_owned()
        } else if let Some((lo, hi)) = range.split_once('-') {
            format!("{}-{}", shift_day_of_week_value(lo)?, shift_day_of_week_value(hi)?)
        } else {
            shift_day_of_week_value(range)?
        };

        match step {
            Some(step) => parts.push(format!("{shifted}/{step}")),
            None => parts.push(shifted),
        }
    }

    Ok(parts.join(","))
}

fn shift_day_of_week_value(token: &str) -> Result<String> {
    match token.parse::<u32>() {
        Ok(n) if n <= 7 => Ok(((n % 7) + 1).to_string()),
        Ok(n) => Err(WatcherError::InvalidSchedule(format!(
            "day-of-week value {n} out of range 0-7"
        ))),
        // Named day (MON, tue, ...): leave it for the parser.
        Err(_) => Ok(token.to_owned()),
    }
}
