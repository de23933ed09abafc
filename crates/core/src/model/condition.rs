use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::model::answer::{Answer, Variables, lenient_i64};
use crate::model::ids::QuestionId;

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

/// Reasons a wire-format condition cannot be turned into a typed `Condition`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConditionError {
    #[error("unknown condition type: {0}")]
    UnknownCondition(String),

    #[error("unknown action type: {0}")]
    UnknownAction(String),

    #[error("condition is missing `{field}`")]
    MissingValue { field: &'static str },

    #[error("invalid redirect url {url:?}: {reason}")]
    InvalidRedirect { url: String, reason: String },

    #[error("malformed condition payload: {0}")]
    Malformed(String),
}

//
// ─── WIRE SHAPE ───────────────────────────────────────────────────────────────
//

/// Condition exactly as the form builder stores it.
///
/// Every field is loosely typed; `Condition::try_from` is the single place
/// where it gets interpreted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCondition {
    pub condition_type: String,
    #[serde(default)]
    pub condition_value: Value,
    pub action_type: String,
    #[serde(default)]
    pub action_value: Value,
    #[serde(default)]
    pub variable_amount: Value,
}

//
// ─── TYPED CONDITION ──────────────────────────────────────────────────────────
//

/// What has to hold for a condition to fire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionRule {
    AnswerEquals(String),
    AnswerContains(String),
    VariableGreater { name: String, threshold: i64 },
    VariableLess { name: String, threshold: i64 },
    VariableEquals { name: String, threshold: i64 },
}

/// What happens when a condition fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionAction {
    RedirectUrl(Url),
    GotoQuestion(QuestionId),
    AddVariable { name: String, amount: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub rule: ConditionRule,
    pub action: ConditionAction,
}

impl Condition {
    #[must_use]
    pub fn new(rule: ConditionRule, action: ConditionAction) -> Self {
        Self { rule, action }
    }

    /// Evaluates the rule against the just-recorded answer and the current variables.
    #[must_use]
    pub fn matches(&self, answer: Option<&Answer>, variables: &Variables) -> bool {
        match &self.rule {
            ConditionRule::AnswerEquals(expected) => answer.is_some_and(|a| a.equals(expected)),
            ConditionRule::AnswerContains(needle) => answer.is_some_and(|a| a.contains(needle)),
            ConditionRule::VariableGreater { name, threshold } => variables.get(name) > *threshold,
            ConditionRule::VariableLess { name, threshold } => variables.get(name) < *threshold,
            ConditionRule::VariableEquals { name, threshold } => variables.get(name) == *threshold,
        }
    }
}

impl TryFrom<RawCondition> for Condition {
    type Error = ConditionError;

    fn try_from(raw: RawCondition) -> Result<Self, Self::Error> {
        let value = lenient_string(&raw.condition_value);
        let rule = match raw.condition_type.trim() {
            "answer_equals" => ConditionRule::AnswerEquals(value.unwrap_or_default()),
            "answer_contains" => ConditionRule::AnswerContains(
                value.ok_or(ConditionError::MissingValue {
                    field: "condition_value",
                })?,
            ),
            kind @ ("variable_greater" | "variable_less" | "variable_equals") => {
                let name = value.ok_or(ConditionError::MissingValue {
                    field: "condition_value",
                })?;
                let threshold = lenient_i64(&raw.variable_amount).unwrap_or(0);
                match kind {
                    "variable_greater" => ConditionRule::VariableGreater { name, threshold },
                    "variable_less" => ConditionRule::VariableLess { name, threshold },
                    _ => ConditionRule::VariableEquals { name, threshold },
                }
            }
            other => return Err(ConditionError::UnknownCondition(other.to_owned())),
        };

        let target = lenient_string(&raw.action_value);
        let action = match raw.action_type.trim() {
            "redirect_url" => {
                let url = target.ok_or(ConditionError::MissingValue {
                    field: "action_value",
                })?;
                let parsed = Url::parse(&url).map_err(|err| ConditionError::InvalidRedirect {
                    url: url.clone(),
                    reason: err.to_string(),
                })?;
                ConditionAction::RedirectUrl(parsed)
            }
            "goto_question" => ConditionAction::GotoQuestion(QuestionId::new(target.ok_or(
                ConditionError::MissingValue {
                    field: "action_value",
                },
            )?)),
            "add_variable" => ConditionAction::AddVariable {
                name: target.ok_or(ConditionError::MissingValue {
                    field: "action_value",
                })?,
                amount: lenient_i64(&raw.variable_amount).unwrap_or(1),
            },
            other => return Err(ConditionError::UnknownAction(other.to_owned())),
        };

        Ok(Self { rule, action })
    }
}

/// Parses the JSON list form builders embed next to a question.
///
/// # Errors
///
/// Returns `ConditionError::Malformed` if the payload is not a JSON list of
/// conditions, or the first conversion error of an individual entry.
pub fn parse_conditions(payload: &str) -> Result<Vec<Condition>, ConditionError> {
    let raw: Vec<RawCondition> =
        serde_json::from_str(payload).map_err(|err| ConditionError::Malformed(err.to_string()))?;
    raw.into_iter().map(Condition::try_from).collect()
}

//
// ─── EVALUATION ───────────────────────────────────────────────────────────────
//

/// Result of running a question's condition list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchOutcome {
    pub redirect: Option<Url>,
    pub goto: Option<QuestionId>,
}

impl BranchOutcome {
    #[must_use]
    pub fn redirected(&self) -> bool {
        self.redirect.is_some()
    }
}

/// Runs `conditions` in order against `answer`.
///
/// Variable additions land in `variables` immediately, so later rules see
/// them. A redirect stops evaluation. The last matching goto wins.
pub fn apply_conditions(
    conditions: &[Condition],
    answer: Option<&Answer>,
    variables: &mut Variables,
) -> BranchOutcome {
    let mut outcome = BranchOutcome::default();
    for condition in conditions {
        if !condition.matches(answer, variables) {
            continue;
        }
        match &condition.action {
            ConditionAction::RedirectUrl(url) => {
                outcome.redirect = Some(url.clone());
                break;
            }
            ConditionAction::GotoQuestion(target) => outcome.goto = Some(target.clone()),
            ConditionAction::AddVariable { name, amount } => {
                variables.add(name, *amount);
            }
        }
    }
    outcome
}

fn lenient_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::String(_) | Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
