#![forbid(unsafe_code)]

pub mod error;
pub mod machine;
pub mod model;
pub mod time;
pub mod validation;

pub use error::QuizError;
pub use machine::{
    BranchQuery, Direction, Effect, Position, Progress, QuizEvent, QuizState, Resolution,
    Submission, TrackEvent, TrackKind,
};
pub use time::Clock;
pub use validation::ValidationError;
