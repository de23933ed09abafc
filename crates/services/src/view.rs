use std::sync::{Arc, Mutex};
use std::time::Duration;

use url::Url;

use quiz_core::model::{QuestionId, Screen};
use quiz_core::{Direction, Progress};

/// Navigation buttons to render alongside a screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavControls {
    pub show_next: bool,
    pub show_previous: bool,
}

/// Rendering surface for one quiz session.
///
/// The runner calls these in the order the state machine emitted them.
pub trait QuizView {
    fn show_screen(&mut self, index: usize, screen: &Screen, direction: Direction, controls: NavControls);

    fn update_progress(&mut self, progress: Progress);

    fn scroll_into_view(&mut self) {}

    /// Inline error under a question; the view hides it after `duration`.
    fn show_validation_error(&mut self, question_id: &QuestionId, message: &str, duration: Duration);

    fn set_loading(&mut self, loading: bool);

    fn show_submission_error(&mut self, message: &str);

    fn show_redirecting(&mut self) {}

    fn navigate_to(&mut self, url: &Url);

    fn completed(&mut self) {}
}

/// One call made against a `RecordingView`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewCall {
    Screen {
        index: usize,
        direction: Direction,
        controls: NavControls,
    },
    Progress(Progress),
    Scroll,
    ValidationError {
        question_id: QuestionId,
        message: String,
    },
    Loading(bool),
    SubmissionError(String),
    Redirecting,
    Navigate(Url),
    Completed,
}

/// View that only records what it was asked to render.
#[derive(Clone, Default)]
pub struct RecordingView {
    calls: Arc<Mutex<Vec<ViewCall>>>,
}

impl RecordingView {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn calls(&self) -> Vec<ViewCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Index of the most recently shown screen.
    #[must_use]
    pub fn current_screen(&self) -> Option<usize> {
        self.calls().iter().rev().find_map(|call| match call {
            ViewCall::Screen { index, .. } => Some(*index),
            _ => None,
        })
    }

    #[must_use]
    pub fn navigated_to(&self) -> Option<Url> {
        self.calls().into_iter().rev().find_map(|call| match call {
            ViewCall::Navigate(url) => Some(url),
            _ => None,
        })
    }

    fn push(&self, call: ViewCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

impl QuizView for RecordingView {
    fn show_screen(&mut self, index: usize, _screen: &Screen, direction: Direction, controls: NavControls) {
        self.push(ViewCall::Screen {
            index,
            direction,
            controls,
        });
    }

    fn update_progress(&mut self, progress: Progress) {
        self.push(ViewCall::Progress(progress));
    }

    fn scroll_into_view(&mut self) {
        self.push(ViewCall::Scroll);
    }

    fn show_validation_error(&mut self, question_id: &QuestionId, message: &str, _duration: Duration) {
        self.push(ViewCall::ValidationError {
            question_id: question_id.clone(),
            message: message.to_owned(),
        });
    }

    fn set_loading(&mut self, loading: bool) {
        self.push(ViewCall::Loading(loading));
    }

    fn show_submission_error(&mut self, message: &str) {
        self.push(ViewCall::SubmissionError(message.to_owned()));
    }

    fn show_redirecting(&mut self) {
        self.push(ViewCall::Redirecting);
    }

    fn navigate_to(&mut self, url: &Url) {
        self.push(ViewCall::Navigate(url.clone()));
    }

    fn completed(&mut self) {
        self.push(ViewCall::Completed);
    }
}
