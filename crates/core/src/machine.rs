//! Screen navigation and branching for one quiz session.
//!
//! `QuizState::apply` is the only way the session changes. It takes an input
//! event and returns the side effects the caller has to carry out (rendering,
//! timers, server calls). Nothing in here performs I/O, so every transition
//! can be tested without a page or a server.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tracing::{debug, warn};
use url::Url;

use crate::error::QuizError;
use crate::model::{
    Answer, BranchOutcome, Question, QuestionId, QuestionType, QuizDefinition, Responses,
    SessionConfig, Variables, apply_conditions,
};
use crate::time::elapsed_seconds;
use crate::validation::{ValidationError, validate_answer};

/// Pause between a single-pick answer and the automatic step forward.
pub const AUTO_ADVANCE_DELAY: Duration = Duration::from_millis(300);
/// Pause before leaving the page for a condition-triggered redirect.
pub const CONDITION_REDIRECT_DELAY: Duration = Duration::from_millis(100);
/// How long an inline validation message stays visible.
pub const VALIDATION_ERROR_DURATION: Duration = Duration::from_secs(3);

//
// ─── POSITION ──────────────────────────────────────────────────────────────────
//

/// Where the session currently is. Screen indexes refer to the definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    NotStarted,
    Intro,
    Question(usize),
    /// Submission in flight; the last question stays on screen.
    Submitting(usize),
    Completed,
    Redirected,
    Abandoned,
}

impl Position {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Position::Completed | Position::Redirected | Position::Abandoned
        )
    }

    fn describe(self) -> &'static str {
        match self {
            Position::NotStarted => "not started",
            Position::Intro => "on the intro screen",
            Position::Question(_) => "on a question",
            Position::Submitting(_) => "submitting",
            Position::Completed => "completed",
            Position::Redirected => "redirected away",
            Position::Abandoned => "abandoned",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

//
// ─── EVENTS ────────────────────────────────────────────────────────────────────
//

/// Server answer to a branch resolution request. Empty when the call failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub variables: Option<Variables>,
    pub redirect_url: Option<Url>,
    pub next_question_id: Option<QuestionId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuizEvent {
    Initialize,
    Start,
    Answer {
        question_id: QuestionId,
        answer: Answer,
    },
    ConditionsResolved {
        question_id: QuestionId,
        resolution: Resolution,
    },
    Next,
    Previous,
    Submit,
    SubmissionSucceeded {
        redirect_url: Option<Url>,
    },
    SubmissionFailed {
        message: String,
    },
    Abandon,
}

impl QuizEvent {
    fn name(&self) -> &'static str {
        match self {
            QuizEvent::Initialize => "initialize",
            QuizEvent::Start => "start",
            QuizEvent::Answer { .. } => "answer",
            QuizEvent::ConditionsResolved { .. } => "conditions_resolved",
            QuizEvent::Next => "next",
            QuizEvent::Previous => "previous",
            QuizEvent::Submit => "submit",
            QuizEvent::SubmissionSucceeded { .. } => "submission_succeeded",
            QuizEvent::SubmissionFailed { .. } => "submission_failed",
            QuizEvent::Abandon => "abandon",
        }
    }
}

//
// ─── EFFECTS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    View,
    Start,
    QuestionAnswered,
    Abandon,
}

impl TrackKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TrackKind::View => "view",
            TrackKind::Start => "start",
            TrackKind::QuestionAnswered => "question_answered",
            TrackKind::Abandon => "abandon",
        }
    }
}

/// Telemetry to send best effort.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackEvent {
    pub kind: TrackKind,
    pub data: Value,
}

/// Request for the server to evaluate branching for a question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchQuery {
    pub question_id: QuestionId,
    pub answer: Option<Answer>,
    pub variables: Variables,
}

/// Snapshot posted when the quiz is submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub responses: Responses,
    pub variables: Variables,
    pub time_spent_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
    pub percent: u8,
}

impl Progress {
    fn new(current: usize, total: usize) -> Self {
        let percent = if total == 0 {
            0
        } else {
            u8::try_from((current.min(total) * 100) / total).unwrap_or(100)
        };
        Self {
            current,
            total,
            percent,
        }
    }
}

/// Work the caller must perform after a transition, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Track(TrackEvent),
    ShowScreen {
        index: usize,
        direction: Direction,
        show_next: bool,
        show_previous: bool,
    },
    UpdateProgress(Progress),
    ScrollIntoView,
    ShowValidationError {
        question_id: QuestionId,
        error: ValidationError,
        duration: Duration,
    },
    ResolveRemotely(BranchQuery),
    ScheduleNext {
        delay: Duration,
    },
    Redirect {
        url: Url,
        delay: Duration,
    },
    SetLoading(bool),
    Submit(Submission),
    ShowRedirecting,
    ShowSubmissionError {
        message: String,
    },
    Completed,
}

//
// ─── STATE ─────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingResolution {
    question_id: QuestionId,
    auto_advance: bool,
}

/// One user's traversal of one quiz.
#[derive(Debug, Clone)]
pub struct QuizState {
    definition: QuizDefinition,
    config: SessionConfig,
    position: Position,
    responses: Responses,
    variables: Variables,
    branch_target: Option<QuestionId>,
    pending: Option<PendingResolution>,
    started_at: DateTime<Utc>,
    question_started_at: DateTime<Utc>,
}

impl QuizState {
    /// Creates a session that has not been initialized yet.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::FormMismatch` if the config belongs to another form.
    pub fn new(
        definition: QuizDefinition,
        config: SessionConfig,
        now: DateTime<Utc>,
    ) -> Result<Self, QuizError> {
        if definition.form_id() != config.form_id {
            return Err(QuizError::FormMismatch {
                config: config.form_id,
                definition: definition.form_id(),
            });
        }

        Ok(Self {
            definition,
            config,
            position: Position::NotStarted,
            responses: Responses::new(),
            variables: Variables::new(),
            branch_target: None,
            pending: None,
            started_at: now,
            question_started_at: now,
        })
    }

    #[must_use]
    pub fn definition(&self) -> &QuizDefinition {
        &self.definition
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn position(&self) -> Position {
        self.position
    }

    #[must_use]
    pub fn responses(&self) -> &Responses {
        &self.responses
    }

    #[must_use]
    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    #[must_use]
    pub fn branch_target(&self) -> Option<&QuestionId> {
        self.branch_target.as_ref()
    }

    #[must_use]
    pub fn is_resolution_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// The question on screen, including while its submission is in flight.
    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        match self.position {
            Position::Question(index) | Position::Submitting(index) => {
                self.definition.question_at(index)
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn progress(&self) -> Option<Progress> {
        let index = match self.position {
            Position::Question(index) | Position::Submitting(index) => index,
            _ => return None,
        };
        let ordinal = self.definition.question_ordinal(index)?;
        Some(Progress::new(ordinal, self.definition.question_count()))
    }

    /// Applies `event` at instant `now` and returns the effects to run.
    ///
    /// # Errors
    ///
    /// Returns `QuizError` when the event does not make sense in the current
    /// position. The state is left untouched in that case.
    pub fn apply(&mut self, event: QuizEvent, now: DateTime<Utc>) -> Result<Vec<Effect>, QuizError> {
        if self.position.is_terminal() {
            return Err(QuizError::Finished);
        }
        debug!(event = event.name(), position = ?self.position, "applying quiz event");

        if let Some(pending) = &self.pending {
            match &event {
                QuizEvent::ConditionsResolved { .. } | QuizEvent::Abandon => {}
                _ => return Err(QuizError::ResolutionPending(pending.question_id.clone())),
            }
        }

        match event {
            QuizEvent::Initialize => self.initialize(now),
            QuizEvent::Start => self.start(now),
            QuizEvent::Answer {
                question_id,
                answer,
            } => self.answer(question_id, answer),
            QuizEvent::ConditionsResolved {
                question_id,
                resolution,
            } => self.resolved(question_id, resolution),
            QuizEvent::Next => self.next(now, "next"),
            QuizEvent::Submit => self.submit(now),
            QuizEvent::Previous => self.previous(now),
            QuizEvent::SubmissionSucceeded { redirect_url } => self.submission_succeeded(redirect_url),
            QuizEvent::SubmissionFailed { message } => self.submission_failed(message),
            QuizEvent::Abandon => Ok(self.abandon()),
        }
    }

    fn invalid(&self, event: &'static str) -> QuizError {
        QuizError::InvalidEvent {
            event,
            state: self.position.describe(),
        }
    }

    fn initialize(&mut self, now: DateTime<Utc>) -> Result<Vec<Effect>, QuizError> {
        if self.position != Position::NotStarted {
            return Err(self.invalid("initialize"));
        }

        let mut effects = vec![track(TrackKind::View, json!({}))];
        let intro = self
            .definition
            .intro_index()
            .filter(|_| self.config.settings.show_intro_screen);
        if let Some(index) = intro {
            self.position = Position::Intro;
            effects.push(Effect::ShowScreen {
                index,
                direction: Direction::Forward,
                show_next: false,
                show_previous: false,
            });
            effects.push(Effect::ScrollIntoView);
        } else {
            effects.extend(self.enter_first_question(now));
        }
        Ok(effects)
    }

    fn start(&mut self, now: DateTime<Utc>) -> Result<Vec<Effect>, QuizError> {
        if self.position != Position::Intro {
            return Err(self.invalid("start"));
        }
        Ok(self.enter_first_question(now))
    }

    fn enter_first_question(&mut self, now: DateTime<Utc>) -> Vec<Effect> {
        let mut effects = vec![track(TrackKind::Start, json!({}))];
        // Definitions always hold at least one question.
        if let Some(first) = self.definition.first_question() {
            effects.extend(self.show_question(first, Direction::Forward, now));
        }
        effects
    }

    fn show_question(&mut self, index: usize, direction: Direction, now: DateTime<Utc>) -> Vec<Effect> {
        self.position = Position::Question(index);
        self.question_started_at = now;

        let show_next = self
            .definition
            .question_at(index)
            .is_none_or(Question::shows_next_button);
        let show_previous = self.definition.previous_question_before(index).is_some();

        let mut effects = vec![Effect::ShowScreen {
            index,
            direction,
            show_next,
            show_previous,
        }];
        if let Some(progress) = self.progress() {
            effects.push(Effect::UpdateProgress(progress));
        }
        effects.push(Effect::ScrollIntoView);
        effects
    }

    fn active_question(&self, question_id: &QuestionId) -> Result<&Question, QuizError> {
        match self.position {
            Position::Question(index) => self
                .definition
                .question_at(index)
                .filter(|question| &question.id == question_id)
                .ok_or_else(|| QuizError::NotActiveQuestion(question_id.clone())),
            _ => Err(QuizError::NotActiveQuestion(question_id.clone())),
        }
    }

    fn answer(&mut self, question_id: QuestionId, answer: Answer) -> Result<Vec<Effect>, QuizError> {
        let question = self.active_question(&question_id)?;
        let answer = shape_answer(question, answer)?;
        let auto_advance = self.config.settings.auto_advance && question.kind.is_single_pick();
        let conditions = question.conditions.clone();

        self.responses.record(question_id.clone(), answer.clone());

        let Some(conditions) = conditions else {
            self.pending = Some(PendingResolution {
                question_id: question_id.clone(),
                auto_advance,
            });
            return Ok(vec![Effect::ResolveRemotely(BranchQuery {
                question_id,
                answer: Some(answer),
                variables: self.variables.clone(),
            })]);
        };

        let outcome = apply_conditions(&conditions, Some(&answer), &mut self.variables);
        Ok(self.apply_outcome(outcome, auto_advance))
    }

    fn resolved(&mut self, question_id: QuestionId, resolution: Resolution) -> Result<Vec<Effect>, QuizError> {
        let pending = match self.pending.take() {
            Some(pending) if pending.question_id == question_id => pending,
            other => {
                self.pending = other;
                return Err(QuizError::UnexpectedResolution(question_id));
            }
        };

        if let Some(variables) = &resolution.variables {
            self.variables.merge(variables);
        }

        let goto = resolution.next_question_id.filter(|target| {
            let known = self.definition.index_of(target).is_some();
            if !known {
                warn!(question_id = %question_id, target = %target, "server named an unknown next question");
            }
            known
        });

        let outcome = BranchOutcome {
            redirect: resolution.redirect_url,
            goto,
        };
        Ok(self.apply_outcome(outcome, pending.auto_advance))
    }

    fn apply_outcome(&mut self, outcome: BranchOutcome, auto_advance: bool) -> Vec<Effect> {
        if let Some(url) = outcome.redirect {
            self.position = Position::Redirected;
            self.branch_target = None;
            return vec![Effect::Redirect {
                url,
                delay: CONDITION_REDIRECT_DELAY,
            }];
        }

        self.branch_target = outcome.goto;
        if auto_advance {
            vec![Effect::ScheduleNext {
                delay: AUTO_ADVANCE_DELAY,
            }]
        } else {
            Vec::new()
        }
    }

    /// Resolves where `next` would go from the question at `index`.
    fn forward_target(&self, index: usize) -> Option<usize> {
        self.branch_target
            .as_ref()
            .and_then(|target| self.definition.index_of(target))
            .or_else(|| self.definition.next_question_after(index))
    }

    fn next(&mut self, now: DateTime<Utc>, event: &'static str) -> Result<Vec<Effect>, QuizError> {
        let Position::Question(index) = self.position else {
            return Err(self.invalid(event));
        };
        let Some(question) = self.definition.question_at(index) else {
            return Err(self.invalid(event));
        };

        if let Err(error) = validate_answer(question, self.responses.get(&question.id)) {
            return Ok(vec![Effect::ShowValidationError {
                question_id: question.id.clone(),
                error,
                duration: VALIDATION_ERROR_DURATION,
            }]);
        }

        let mut effects = vec![track(
            TrackKind::QuestionAnswered,
            json!({
                "question_id": question.id,
                "time_spent": elapsed_seconds(self.question_started_at, now),
            }),
        )];

        let target = self.forward_target(index);
        self.branch_target = None;
        match target {
            Some(target) => effects.extend(self.show_question(target, Direction::Forward, now)),
            None => effects.extend(self.begin_submission(index, now)),
        }
        Ok(effects)
    }

    fn submit(&mut self, now: DateTime<Utc>) -> Result<Vec<Effect>, QuizError> {
        let position = self.position;
        match position {
            Position::Question(index) if self.forward_target(index).is_none() => {
                self.next(now, "submit")
            }
            _ => Err(self.invalid("submit")),
        }
    }

    fn begin_submission(&mut self, index: usize, now: DateTime<Utc>) -> Vec<Effect> {
        self.position = Position::Submitting(index);
        vec![
            Effect::SetLoading(true),
            Effect::Submit(Submission {
                responses: self.responses.clone(),
                variables: self.variables.clone(),
                time_spent_secs: elapsed_seconds(self.started_at, now),
            }),
        ]
    }

    fn previous(&mut self, now: DateTime<Utc>) -> Result<Vec<Effect>, QuizError> {
        let Position::Question(index) = self.position else {
            return Err(self.invalid("previous"));
        };
        // Never steps back onto the intro screen.
        let Some(target) = self.definition.previous_question_before(index) else {
            return Ok(Vec::new());
        };
        self.branch_target = None;
        Ok(self.show_question(target, Direction::Reverse, now))
    }

    fn submission_succeeded(&mut self, redirect_url: Option<Url>) -> Result<Vec<Effect>, QuizError> {
        if !matches!(self.position, Position::Submitting(_)) {
            return Err(self.invalid("submission_succeeded"));
        }

        let mut effects = vec![Effect::SetLoading(false)];
        if let Some(url) = redirect_url {
            self.position = Position::Redirected;
            effects.push(Effect::Redirect {
                url,
                delay: Duration::ZERO,
            });
            return Ok(effects);
        }

        self.position = Position::Completed;
        if let Some(index) = self.definition.thank_you_index() {
            effects.push(Effect::ShowScreen {
                index,
                direction: Direction::Forward,
                show_next: false,
                show_previous: false,
            });
            effects.push(Effect::ScrollIntoView);
        }
        effects.push(Effect::Completed);

        if let Some(url) = self.config.settings.redirect_url.clone() {
            effects.push(Effect::ShowRedirecting);
            effects.push(Effect::Redirect {
                url,
                delay: self.config.settings.redirect_delay,
            });
        }
        Ok(effects)
    }

    fn submission_failed(&mut self, message: String) -> Result<Vec<Effect>, QuizError> {
        let Position::Submitting(index) = self.position else {
            return Err(self.invalid("submission_failed"));
        };
        self.position = Position::Question(index);
        Ok(vec![
            Effect::SetLoading(false),
            Effect::ShowSubmissionError { message },
        ])
    }

    fn abandon(&mut self) -> Vec<Effect> {
        let question_id = self.current_question().map(|q| q.id.clone());
        self.position = Position::Abandoned;
        self.pending = None;
        self.branch_target = None;
        vec![track(TrackKind::Abandon, json!({ "question_id": question_id }))]
    }
}

/// Checkbox questions store a list; a lone value is wrapped. Every other type
/// stores a single value and rejects a list.
fn shape_answer(question: &Question, answer: Answer) -> Result<Answer, QuizError> {
    match (question.kind, answer) {
        (QuestionType::MultipleChoice, Answer::Single(value)) if value.trim().is_empty() => {
            Ok(Answer::Multiple(Vec::new()))
        }
        (QuestionType::MultipleChoice, Answer::Single(value)) => Ok(Answer::Multiple(vec![value])),
        (QuestionType::MultipleChoice, answer @ Answer::Multiple(_)) => Ok(answer),
        (_, Answer::Multiple(_)) => Err(QuizError::AnswerShape {
            question_id: question.id.clone(),
            expected: "a single value",
        }),
        (_, answer @ Answer::Single(_)) => Ok(answer),
    }
}

fn track(kind: TrackKind, data: Value) -> Effect {
    Effect::Track(TrackEvent { kind, data })
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
