use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::model::condition::{Condition, ConditionError, RawCondition, parse_conditions};
use crate::model::ids::QuestionId;

//
// ─── QUESTION TYPE ─────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    SingleChoice,
    MultipleChoice,
    Text,
    Email,
    Rating,
    ImageChoice,
}

impl QuestionType {
    /// One click fully answers these, so they may advance on their own.
    #[must_use]
    pub fn is_single_pick(self) -> bool {
        matches!(
            self,
            QuestionType::SingleChoice | QuestionType::Rating | QuestionType::ImageChoice
        )
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionType::SingleChoice => "single_choice",
            QuestionType::MultipleChoice => "multiple_choice",
            QuestionType::Text => "text",
            QuestionType::Email => "email",
            QuestionType::Rating => "rating",
            QuestionType::ImageChoice => "image_choice",
        }
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A question screen.
///
/// `conditions` is `None` when the page carried no condition data for this
/// question; branching is then resolved by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub id: QuestionId,
    pub kind: QuestionType,
    pub required: bool,
    pub title: String,
    pub options: Vec<String>,
    pub conditions: Option<Vec<Condition>>,
    pub show_next_button: Option<bool>,
}

impl Question {
    #[must_use]
    pub fn new(id: impl Into<QuestionId>, kind: QuestionType) -> Self {
        Self {
            id: id.into(),
            kind,
            required: false,
            title: String::new(),
            options: Vec::new(),
            conditions: None,
            show_next_button: None,
        }
    }

    #[must_use]
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    #[must_use]
    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_conditions(mut self, conditions: Vec<Condition>) -> Self {
        self.conditions = Some(conditions);
        self
    }

    #[must_use]
    pub fn with_next_button(mut self, visible: bool) -> Self {
        self.show_next_button = Some(visible);
        self
    }

    /// Next button is shown unless the question explicitly hides it.
    #[must_use]
    pub fn shows_next_button(&self) -> bool {
        self.show_next_button.unwrap_or(true)
    }
}

//
// ─── WIRE SHAPE ───────────────────────────────────────────────────────────────
//

/// Question as it appears in a quiz definition document.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct QuestionRecord {
    id: QuestionId,
    #[serde(rename = "type")]
    kind: QuestionType,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    title: String,
    #[serde(default)]
    options: Vec<String>,
    #[serde(default)]
    conditions: Value,
    #[serde(default)]
    show_next_button: Option<bool>,
}

impl QuestionRecord {
    /// Bad condition data never fails the load. The question is treated as
    /// carrying no inline conditions, so the server resolves its branching.
    pub(crate) fn into_question(self) -> Question {
        let conditions = match decode_conditions(self.conditions) {
            Ok(conditions) => conditions,
            Err(err) => {
                warn!(question_id = %self.id, error = %err, "ignoring malformed inline conditions");
                None
            }
        };

        Question {
            id: self.id,
            kind: self.kind,
            required: self.required,
            title: self.title,
            options: self.options,
            conditions,
            show_next_button: self.show_next_button,
        }
    }
}

fn decode_conditions(value: Value) -> Result<Option<Vec<Condition>>, ConditionError> {
    match value {
        Value::Null => Ok(None),
        // Markup embeds the list as an attribute string.
        Value::String(payload) => parse_conditions(&payload).map(Some),
        other @ Value::Array(_) => {
            let raw: Vec<RawCondition> = serde_json::from_value(other)
                .map_err(|err| ConditionError::Malformed(err.to_string()))?;
            raw.into_iter()
                .map(Condition::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map(Some)
        }
        Value::Bool(_) | Value::Number(_) | Value::Object(_) => Err(ConditionError::Malformed(
            "conditions must be a list".to_owned(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> QuestionRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn absent_conditions_defer_to_server() {
        let question = record(json!({"id": "q1", "type": "text"})).into_question();
        assert_eq!(question.conditions, None);
        assert!(!question.required);
        assert!(question.shows_next_button());
    }

    #[test]
    fn conditions_accept_embedded_string() {
        let payload = json!([{
            "condition_type": "answer_equals",
            "condition_value": "a",
            "action_type": "goto_question",
            "action_value": "q3"
        }])
        .to_string();
        let question = record(json!({
            "id": "q1",
            "type": "single_choice",
            "conditions": payload
        }))
        .into_question();

        assert_eq!(question.conditions.map(|c| c.len()), Some(1));
    }

    #[test]
    fn malformed_conditions_defer_to_server() {
        let question = record(json!({
            "id": "q1",
            "type": "single_choice",
            "conditions": "[{not json"
        }))
        .into_question();

        assert_eq!(question.conditions, None);
    }

    #[test]
    fn single_pick_types() {
        assert!(QuestionType::Rating.is_single_pick());
        assert!(QuestionType::ImageChoice.is_single_pick());
        assert!(!QuestionType::MultipleChoice.is_single_pick());
        assert!(!QuestionType::Email.is_single_pick());
    }
}
