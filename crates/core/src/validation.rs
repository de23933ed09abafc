//! Answer validation run before leaving a question screen.

use thiserror::Error;

use crate::model::{Answer, Question, QuestionType};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValidationError {
    #[error("This question is required.")]
    Required,

    #[error("Please select at least one option.")]
    NoSelection,

    #[error("Please enter a valid email address.")]
    InvalidEmail,
}

/// Checks `answer` against the question's type and required flag.
///
/// Optional questions always pass.
///
/// # Errors
///
/// Returns the `ValidationError` the user should see inline.
pub fn validate_answer(question: &Question, answer: Option<&Answer>) -> Result<(), ValidationError> {
    if !question.required {
        return Ok(());
    }

    match question.kind {
        QuestionType::SingleChoice
        | QuestionType::ImageChoice
        | QuestionType::Rating
        | QuestionType::Text => match answer {
            Some(answer) if !answer.is_blank() => Ok(()),
            _ => Err(ValidationError::Required),
        },
        QuestionType::MultipleChoice => match answer {
            Some(answer) if !answer.is_blank() => Ok(()),
            _ => Err(ValidationError::NoSelection),
        },
        QuestionType::Email => match answer {
            Some(Answer::Single(value)) if is_valid_email(value.trim()) => Ok(()),
            Some(answer) if !answer.is_blank() => Err(ValidationError::InvalidEmail),
            _ => Err(ValidationError::Required),
        },
    }
}

/// `local@domain.tld` with no whitespace and a single `@`.
#[must_use]
pub fn is_valid_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    domain
        .char_indices()
        .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn required(kind: QuestionType) -> Question {
        Question::new("q", kind).required(true)
    }

    #[test]
    fn optional_questions_always_pass() {
        let question = Question::new("q", QuestionType::MultipleChoice);
        assert_eq!(validate_answer(&question, None), Ok(()));
        assert_eq!(
            validate_answer(&question, Some(&Answer::Multiple(Vec::new()))),
            Ok(())
        );
    }

    #[test]
    fn required_multiple_choice_needs_a_selection() {
        let question = required(QuestionType::MultipleChoice);
        assert_eq!(
            validate_answer(&question, Some(&Answer::Multiple(Vec::new()))),
            Err(ValidationError::NoSelection)
        );
        assert_eq!(
            validate_answer(&question, Some(&Answer::multiple(["a"]))),
            Ok(())
        );
    }

    #[test]
    fn required_choice_needs_any_answer() {
        let question = required(QuestionType::Rating);
        assert_eq!(validate_answer(&question, None), Err(ValidationError::Required));
        assert_eq!(validate_answer(&question, Some(&Answer::single("4"))), Ok(()));
    }

    #[test]
    fn text_rejects_whitespace_only() {
        let question = required(QuestionType::Text);
        assert_eq!(
            validate_answer(&question, Some(&Answer::single("   "))),
            Err(ValidationError::Required)
        );
    }

    #[test]
    fn email_format() {
        let question = required(QuestionType::Email);
        assert_eq!(
            validate_answer(&question, Some(&Answer::single("me@example.com"))),
            Ok(())
        );
        assert_eq!(
            validate_answer(&question, Some(&Answer::single("me@example"))),
            Err(ValidationError::InvalidEmail)
        );
        assert_eq!(
            validate_answer(&question, Some(&Answer::single(""))),
            Err(ValidationError::Required)
        );
    }

    #[test]
    fn email_edge_cases() {
        assert!(is_valid_email("a@b.c"));
        assert!(!is_valid_email("a@.c"));
        assert!(!is_valid_email("a@b."));
        assert!(!is_valid_email("a b@c.d"));
        assert!(!is_valid_email("a@b@c.d"));
        assert!(!is_valid_email("@b.c"));
    }
}
