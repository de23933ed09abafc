use std::collections::HashSet;

use serde::Deserialize;
use thiserror::Error;

use crate::model::condition::ConditionAction;
use crate::model::ids::{FormId, QuestionId};
use crate::model::question::{Question, QuestionRecord};

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DefinitionError {
    #[error("quiz has no question screens")]
    NoQuestions,

    #[error("duplicate question id: {0}")]
    DuplicateQuestion(QuestionId),

    #[error("intro screen must be the first screen")]
    MisplacedIntro,

    #[error("thank-you screen must be the last screen")]
    MisplacedThankYou,

    #[error("question {from} branches to unknown question {target}")]
    UnknownBranchTarget { from: QuestionId, target: QuestionId },

    #[error("malformed quiz definition: {0}")]
    Malformed(String),
}

//
// ─── SCREEN ────────────────────────────────────────────────────────────────────
//

/// One visible step of a quiz.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screen {
    Intro { title: String },
    Question(Question),
    ThankYou { message: String },
}

impl Screen {
    #[must_use]
    pub fn as_question(&self) -> Option<&Question> {
        match self {
            Screen::Question(question) => Some(question),
            Screen::Intro { .. } | Screen::ThankYou { .. } => None,
        }
    }

    #[must_use]
    pub fn is_intro(&self) -> bool {
        matches!(self, Screen::Intro { .. })
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "screen", rename_all = "snake_case")]
enum ScreenRecord {
    Intro {
        #[serde(default)]
        title: String,
    },
    Question(QuestionRecord),
    ThankYou {
        #[serde(default)]
        message: String,
    },
}

impl From<ScreenRecord> for Screen {
    fn from(record: ScreenRecord) -> Self {
        match record {
            ScreenRecord::Intro { title } => Screen::Intro { title },
            ScreenRecord::Question(question) => Screen::Question(question.into_question()),
            ScreenRecord::ThankYou { message } => Screen::ThankYou { message },
        }
    }
}

#[derive(Debug, Deserialize)]
struct DefinitionRecord {
    form_id: FormId,
    #[serde(default)]
    title: String,
    screens: Vec<ScreenRecord>,
}

//
// ─── QUIZ DEFINITION ──────────────────────────────────────────────────────────
//

/// The ordered screens of one form, checked once at load time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizDefinition {
    form_id: FormId,
    title: String,
    screens: Vec<Screen>,
}

impl QuizDefinition {
    /// Builds a definition from screens in document order.
    ///
    /// # Errors
    ///
    /// Returns `DefinitionError` if there are no questions, question ids
    /// repeat, intro/thank-you screens are out of place, or an inline
    /// `goto_question` names a question that does not exist.
    pub fn new(
        form_id: FormId,
        title: impl Into<String>,
        screens: Vec<Screen>,
    ) -> Result<Self, DefinitionError> {
        let mut ids = HashSet::new();
        for (index, screen) in screens.iter().enumerate() {
            match screen {
                Screen::Intro { .. } if index != 0 => return Err(DefinitionError::MisplacedIntro),
                Screen::ThankYou { .. } if index + 1 != screens.len() => {
                    return Err(DefinitionError::MisplacedThankYou);
                }
                Screen::Question(question) => {
                    if !ids.insert(question.id.clone()) {
                        return Err(DefinitionError::DuplicateQuestion(question.id.clone()));
                    }
                }
                Screen::Intro { .. } | Screen::ThankYou { .. } => {}
            }
        }

        if ids.is_empty() {
            return Err(DefinitionError::NoQuestions);
        }

        for question in screens.iter().filter_map(Screen::as_question) {
            let targets = question
                .conditions
                .iter()
                .flatten()
                .filter_map(|condition| match &condition.action {
                    ConditionAction::GotoQuestion(target) => Some(target),
                    ConditionAction::RedirectUrl(_) | ConditionAction::AddVariable { .. } => None,
                });
            for target in targets {
                if !ids.contains(target) {
                    return Err(DefinitionError::UnknownBranchTarget {
                        from: question.id.clone(),
                        target: target.clone(),
                    });
                }
            }
        }

        Ok(Self {
            form_id,
            title: title.into(),
            screens,
        })
    }

    /// Parses a definition document.
    ///
    /// # Errors
    ///
    /// Returns `DefinitionError::Malformed` for invalid JSON and any
    /// structural error from [`QuizDefinition::new`].
    pub fn from_json(document: &str) -> Result<Self, DefinitionError> {
        let record: DefinitionRecord = serde_json::from_str(document)
            .map_err(|err| DefinitionError::Malformed(err.to_string()))?;
        let screens = record.screens.into_iter().map(Screen::from).collect();
        Self::new(record.form_id, record.title, screens)
    }

    #[must_use]
    pub fn form_id(&self) -> FormId {
        self.form_id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn screens(&self) -> &[Screen] {
        &self.screens
    }

    #[must_use]
    pub fn screen(&self, index: usize) -> Option<&Screen> {
        self.screens.get(index)
    }

    #[must_use]
    pub fn question_at(&self, index: usize) -> Option<&Question> {
        self.screen(index).and_then(Screen::as_question)
    }

    #[must_use]
    pub fn has_intro(&self) -> bool {
        self.screens.first().is_some_and(Screen::is_intro)
    }

    #[must_use]
    pub fn intro_index(&self) -> Option<usize> {
        self.has_intro().then_some(0)
    }

    #[must_use]
    pub fn thank_you_index(&self) -> Option<usize> {
        self.screens
            .iter()
            .rposition(|screen| matches!(screen, Screen::ThankYou { .. }))
    }

    /// Screen index of the question with the given id.
    #[must_use]
    pub fn index_of(&self, id: &QuestionId) -> Option<usize> {
        self.screens
            .iter()
            .position(|screen| screen.as_question().is_some_and(|q| &q.id == id))
    }

    #[must_use]
    pub fn first_question(&self) -> Option<usize> {
        self.screens.iter().position(|s| s.as_question().is_some())
    }

    /// First question screen after `index` in document order.
    #[must_use]
    pub fn next_question_after(&self, index: usize) -> Option<usize> {
        self.screens
            .iter()
            .enumerate()
            .skip(index + 1)
            .find(|(_, screen)| screen.as_question().is_some())
            .map(|(i, _)| i)
    }

    /// Last question screen before `index` in document order.
    #[must_use]
    pub fn previous_question_before(&self, index: usize) -> Option<usize> {
        self.screens
            .iter()
            .enumerate()
            .take(index)
            .rev()
            .find(|(_, screen)| screen.as_question().is_some())
            .map(|(i, _)| i)
    }

    #[must_use]
    pub fn question_count(&self) -> usize {
        self.screens.iter().filter(|s| s.as_question().is_some()).count()
    }

    /// 1-based position of the question at `index` among all questions.
    #[must_use]
    pub fn question_ordinal(&self, index: usize) -> Option<usize> {
        self.question_at(index)?;
        Some(
            self.screens
                .iter()
                .take(index + 1)
                .filter(|s| s.as_question().is_some())
                .count(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::condition::{Condition, ConditionRule};
    use crate::model::question::QuestionType;
    use serde_json::json;

    fn question(id: &str) -> Screen {
        Screen::Question(Question::new(id, QuestionType::Text))
    }

    fn intro() -> Screen {
        Screen::Intro {
            title: "Welcome".into(),
        }
    }

    fn thanks() -> Screen {
        Screen::ThankYou {
            message: "Thanks".into(),
        }
    }

    #[test]
    fn navigation_helpers_follow_document_order() {
        let def = QuizDefinition::new(
            FormId::new(1),
            "Quiz",
            vec![intro(), question("q1"), question("q2"), thanks()],
        )
        .unwrap();

        assert_eq!(def.first_question(), Some(1));
        assert_eq!(def.next_question_after(1), Some(2));
        assert_eq!(def.next_question_after(2), None);
        assert_eq!(def.previous_question_before(2), Some(1));
        assert_eq!(def.previous_question_before(1), None);
        assert_eq!(def.question_ordinal(2), Some(2));
        assert_eq!(def.question_ordinal(0), None);
        assert_eq!(def.thank_you_index(), Some(3));
        assert_eq!(def.index_of(&QuestionId::new("q2")), Some(2));
    }

    #[test]
    fn rejects_structural_mistakes() {
        let dup = QuizDefinition::new(FormId::new(1), "", vec![question("q1"), question("q1")]);
        assert!(matches!(dup, Err(DefinitionError::DuplicateQuestion(_))));

        let empty = QuizDefinition::new(FormId::new(1), "", vec![intro(), thanks()]);
        assert_eq!(empty, Err(DefinitionError::NoQuestions));

        let late_intro = QuizDefinition::new(FormId::new(1), "", vec![question("q1"), intro()]);
        assert_eq!(late_intro, Err(DefinitionError::MisplacedIntro));

        let early_thanks = QuizDefinition::new(FormId::new(1), "", vec![thanks(), question("q1")]);
        assert_eq!(early_thanks, Err(DefinitionError::MisplacedThankYou));
    }

    #[test]
    fn rejects_dangling_goto() {
        let q1 = Question::new("q1", QuestionType::SingleChoice).with_conditions(vec![
            Condition::new(
                ConditionRule::AnswerEquals("a".into()),
                ConditionAction::GotoQuestion(QuestionId::new("missing")),
            ),
        ]);
        let result = QuizDefinition::new(FormId::new(1), "", vec![Screen::Question(q1)]);
        assert!(matches!(
            result,
            Err(DefinitionError::UnknownBranchTarget { .. })
        ));
    }

    #[test]
    fn loads_from_json_document() {
        let document = json!({
            "form_id": 12,
            "title": "Personality",
            "screens": [
                {"screen": "intro", "title": "Hi"},
                {"screen": "question", "id": "q1", "type": "single_choice",
                 "required": true, "options": ["a", "b"]},
                {"screen": "question", "id": "q2", "type": "email"},
                {"screen": "thank_you", "message": "Bye"}
            ]
        })
        .to_string();

        let def = QuizDefinition::from_json(&document).unwrap();
        assert_eq!(def.form_id(), FormId::new(12));
        assert_eq!(def.question_count(), 2);
        assert!(def.has_intro());
        assert_eq!(def.intro_index(), Some(0));
        let q1 = def.question_at(1).unwrap();
        assert!(q1.required);
        assert_eq!(q1.options, vec!["a", "b"]);
    }

    #[test]
    fn malformed_document_is_reported() {
        let err = QuizDefinition::from_json("{\"form_id\": 1}").unwrap_err();
        assert!(matches!(err, DefinitionError::Malformed(_)));
    }
}
