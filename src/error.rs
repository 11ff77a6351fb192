//! Error types for the watcher.

/// Top-level error type for the question watcher.
#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    /// Configuration file error (unreadable, unparsable, or conflicting).
    #[error("config error: {0}")]
    Config(String),

    /// Question descriptor rejected at construction.
    #[error("question error: {0}")]
    Question(String),

    /// Cron expression could not be parsed into valid fields.
    #[error("invalid schedule expression: {0}")]
    InvalidSchedule(String),

    /// Schedule has no matching instant within the search horizon.
    #[error("schedule never matches: {0}")]
    ScheduleNeverMatches(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, WatcherError>;
