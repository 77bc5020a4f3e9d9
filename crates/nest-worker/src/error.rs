use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("queue poll failed: {0}")]
    QueuePollError(String),

    #[error("claim lost: another worker took task {0}")]
    ClaimLostError(Uuid),

    #[error("bad input for item '{item}': {message}")]
    BadInputError { item: String, message: String },

    /// Reserved: the nester returns a result rather than failing, so
    /// this variant is never constructed in normal operation.
    #[error("nesting error: {0}")]
    NestingError(String),

    #[error("write/upload failed: {0}")]
    WriteError(String),

    #[error("persistence error: {0}")]
    PersistenceError(String),
}

impl From<nest_dxf::ImportError> for WorkerError {
    fn from(e: nest_dxf::ImportError) -> Self {
        match e {
            nest_dxf::ImportError::BadInput { path, message } => {
                WorkerError::BadInputError { item: path, message }
            }
            nest_dxf::ImportError::Write(message) => WorkerError::WriteError(message),
        }
    }
}

impl From<sqlx::Error> for WorkerError {
    fn from(e: sqlx::Error) -> Self {
        WorkerError::PersistenceError(e.to_string())
    }
}

impl From<reqwest::Error> for WorkerError {
    fn from(e: reqwest::Error) -> Self {
        WorkerError::WriteError(e.to_string())
    }
}

/// Truncates an error message to the persisted column's 2000-char limit.
pub fn truncate_error_message(message: &str) -> String {
    if message.len() <= 2000 {
        message.to_string()
    } else {
        message.chars().take(2000).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_error_message_short_unchanged() {
        assert_eq!(truncate_error_message("short"), "short");
    }

    #[test]
    fn test_truncate_error_message_truncates_long() {
        let long = "x".repeat(3000);
        let truncated = truncate_error_message(&long);
        assert_eq!(truncated.chars().count(), 2000);
    }

    #[test]
    fn test_bad_input_display_contains_item() {
        let err = WorkerError::BadInputError {
            item: "part_a".into(),
            message: "no polygons".into(),
        };
        assert!(err.to_string().contains("part_a"));
    }
}
