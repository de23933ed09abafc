#![forbid(unsafe_code)]

pub mod ajax;
pub mod backend;
pub mod error;
pub mod runner;
pub mod tracking;
pub mod view;

pub use quiz_core::Clock;

pub use ajax::{AjaxBackend, AjaxConfig};
pub use backend::{
    InMemoryBackend, NextQuestionRequest, NextQuestionResponse, QuizBackend, SubmitOutcome,
    SubmitRequest, SubmitResponse, TrackRequest,
};
pub use error::{BackendError, GENERIC_SUBMISSION_ERROR, RunnerError};
pub use runner::QuizRunner;
pub use tracking::TrackingQueue;
pub use view::{NavControls, QuizView, RecordingView, ViewCall};
