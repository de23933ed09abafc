//! Shared error types for the services crate.

use thiserror::Error;

use quiz_core::QuizError;

/// Errors emitted by a `QuizBackend`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BackendError {
    #[error("quiz endpoint returned status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error("server rejected the request: {message}")]
    Rejected { message: String },
    #[error("unexpected response shape: {0}")]
    Decode(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl BackendError {
    /// Text suitable for showing to the person taking the quiz.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            BackendError::Rejected { message } if !message.trim().is_empty() => message.clone(),
            _ => GENERIC_SUBMISSION_ERROR.to_owned(),
        }
    }
}

/// Shown when a submission fails without a usable server message.
pub const GENERIC_SUBMISSION_ERROR: &str = "An error occurred. Please try again.";

/// Errors emitted by `QuizRunner`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunnerError {
    #[error(transparent)]
    Quiz(#[from] QuizError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_message_is_shown_verbatim() {
        let err = BackendError::Rejected {
            message: "Form is closed".into(),
        };
        assert_eq!(err.user_message(), "Form is closed");
    }

    #[test]
    fn other_failures_use_generic_text() {
        let err = BackendError::HttpStatus(reqwest::StatusCode::BAD_GATEWAY);
        assert_eq!(err.user_message(), GENERIC_SUBMISSION_ERROR);
        let blank = BackendError::Rejected {
            message: "  ".into(),
        };
        assert_eq!(blank.user_message(), GENERIC_SUBMISSION_ERROR);
    }
}
