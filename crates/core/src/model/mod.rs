mod answer;
pub mod condition;
mod ids;
mod question;
mod screen;
mod settings;

pub use answer::{Answer, Responses, Variables};
pub use condition::{
    BranchOutcome, Condition, ConditionAction, ConditionError, ConditionRule, RawCondition,
    apply_conditions, parse_conditions,
};
pub use ids::{FormId, ParseIdError, QuestionId, SessionId};
pub use question::{Question, QuestionType};
pub use screen::{DefinitionError, QuizDefinition, Screen};
pub use settings::{DEFAULT_REDIRECT_DELAY, QuizSettings, SessionConfig};
