use thiserror::Error;

use crate::model::{FormId, QuestionId};

/// Errors raised when an event cannot be applied to a quiz session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuizError {
    #[error("session is configured for form {config} but the definition is form {definition}")]
    FormMismatch { config: FormId, definition: FormId },

    #[error("`{event}` is not allowed while {state}")]
    InvalidEvent {
        event: &'static str,
        state: &'static str,
    },

    #[error("question {question_id} expects {expected}")]
    AnswerShape {
        question_id: QuestionId,
        expected: &'static str,
    },

    #[error("question {0} is not the active screen")]
    NotActiveQuestion(QuestionId),

    #[error("still waiting for branch resolution of question {0}")]
    ResolutionPending(QuestionId),

    #[error("no branch resolution is pending for question {0}")]
    UnexpectedResolution(QuestionId),

    #[error("quiz session has already ended")]
    Finished,
}
