use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{info, warn};

use quiz_core::model::{Answer, QuestionId, QuizDefinition, SessionConfig};
use quiz_core::{Clock, Effect, QuizEvent, QuizState, Resolution};

use crate::backend::{NextQuestionRequest, QuizBackend, SubmitRequest, TrackRequest};
use crate::error::RunnerError;
use crate::tracking::TrackingQueue;
use crate::view::{NavControls, QuizView};

/// Drives one quiz session: feeds user input into the state machine and
/// carries out the effects it asks for.
///
/// Branch resolution and submission are awaited in line, so at most one such
/// request is in flight. Tracking goes through a background queue and never
/// blocks.
pub struct QuizRunner<V: QuizView> {
    state: QuizState,
    backend: Arc<dyn QuizBackend>,
    tracking: TrackingQueue,
    view: V,
    clock: Clock,
}

impl<V: QuizView> QuizRunner<V> {
    /// Builds a runner for one session container. Must be called inside a
    /// tokio runtime because it starts the tracking task.
    ///
    /// # Errors
    ///
    /// Returns `RunnerError::Quiz` if the config does not match the definition.
    pub fn new(
        definition: QuizDefinition,
        config: SessionConfig,
        backend: Arc<dyn QuizBackend>,
        view: V,
        clock: Clock,
    ) -> Result<Self, RunnerError> {
        let state = QuizState::new(definition, config, clock.now())?;
        let tracking = TrackingQueue::spawn(Arc::clone(&backend));
        Ok(Self {
            state,
            backend,
            tracking,
            view,
            clock,
        })
    }

    #[must_use]
    pub fn state(&self) -> &QuizState {
        &self.state
    }

    #[must_use]
    pub fn view(&self) -> &V {
        &self.view
    }

    /// Mutable clock access, mainly so tests can move a fixed clock.
    pub fn clock_mut(&mut self) -> &mut Clock {
        &mut self.clock
    }

    /// Shows the intro, or the first question when the intro is disabled.
    ///
    /// # Errors
    ///
    /// Returns `RunnerError` if the session was already initialized.
    pub async fn initialize(&mut self) -> Result<(), RunnerError> {
        self.dispatch(QuizEvent::Initialize).await
    }

    /// Leaves the intro for the first question.
    ///
    /// # Errors
    ///
    /// Returns `RunnerError` if the intro is not on screen.
    pub async fn start(&mut self) -> Result<(), RunnerError> {
        self.dispatch(QuizEvent::Start).await
    }

    /// Records an answer for the active question and runs its branching.
    ///
    /// Does not return until follow-ups have run: a server resolution, a
    /// redirect, or with auto-advance the delayed step to the next screen.
    /// The active screen may therefore have changed when this returns.
    ///
    /// # Errors
    ///
    /// Returns `RunnerError` if `question_id` is not the active question.
    pub async fn answer(&mut self, question_id: QuestionId, answer: Answer) -> Result<(), RunnerError> {
        self.dispatch(QuizEvent::Answer {
            question_id,
            answer,
        })
        .await
    }

    /// Validates the active question and moves forward, submitting after the
    /// last question.
    ///
    /// # Errors
    ///
    /// Returns `RunnerError` if no question is active.
    pub async fn next(&mut self) -> Result<(), RunnerError> {
        self.dispatch(QuizEvent::Next).await
    }

    /// # Errors
    ///
    /// Returns `RunnerError` if no question is active.
    pub async fn previous(&mut self) -> Result<(), RunnerError> {
        self.dispatch(QuizEvent::Previous).await
    }

    /// Submits from the last question, also used to retry a failed submission.
    ///
    /// # Errors
    ///
    /// Returns `RunnerError` if the active question is not the last one.
    pub async fn submit(&mut self) -> Result<(), RunnerError> {
        self.dispatch(QuizEvent::Submit).await
    }

    /// Marks the session as abandoned and reports it.
    ///
    /// # Errors
    ///
    /// Returns `RunnerError` if the session already ended.
    pub async fn abandon(&mut self) -> Result<(), RunnerError> {
        self.dispatch(QuizEvent::Abandon).await
    }

    /// Flushes queued tracking events and hands back the view.
    pub async fn shutdown(self) -> V {
        self.tracking.shutdown().await;
        self.view
    }

    async fn dispatch(&mut self, event: QuizEvent) -> Result<(), RunnerError> {
        let mut events = VecDeque::from([event]);
        while let Some(event) = events.pop_front() {
            let effects = self.state.apply(event, self.clock.now())?;
            for effect in effects {
                if let Some(follow_up) = self.run_effect(effect).await {
                    events.push_back(follow_up);
                }
            }
        }
        Ok(())
    }

    async fn run_effect(&mut self, effect: Effect) -> Option<QuizEvent> {
        match effect {
            Effect::Track(event) => {
                let config = self.state.config();
                self.tracking.enqueue(TrackRequest {
                    form_id: config.form_id,
                    session_id: config.session_id.clone(),
                    event_type: event.kind.as_str().to_owned(),
                    event_data: event.data,
                });
                None
            }
            Effect::ShowScreen {
                index,
                direction,
                show_next,
                show_previous,
            } => {
                if let Some(screen) = self.state.definition().screen(index) {
                    let controls = NavControls {
                        show_next,
                        show_previous,
                    };
                    self.view.show_screen(index, screen, direction, controls);
                }
                None
            }
            Effect::UpdateProgress(progress) => {
                self.view.update_progress(progress);
                None
            }
            Effect::ScrollIntoView => {
                self.view.scroll_into_view();
                None
            }
            Effect::ShowValidationError {
                question_id,
                error,
                duration,
            } => {
                self.view
                    .show_validation_error(&question_id, &error.to_string(), duration);
                None
            }
            Effect::ResolveRemotely(query) => {
                let config = self.state.config();
                let request = NextQuestionRequest {
                    form_id: config.form_id,
                    session_id: config.session_id.clone(),
                    current_question_id: query.question_id.clone(),
                    answer: query.answer,
                    variables: query.variables,
                };
                let resolution = match self.backend.next_question(&request).await {
                    Ok(response) => response.into_resolution(),
                    Err(err) => {
                        warn!(
                            question_id = %query.question_id,
                            error = %err,
                            "branch resolution failed; continuing without it"
                        );
                        Resolution::default()
                    }
                };
                Some(QuizEvent::ConditionsResolved {
                    question_id: query.question_id,
                    resolution,
                })
            }
            Effect::ScheduleNext { delay } => {
                tokio::time::sleep(delay).await;
                Some(QuizEvent::Next)
            }
            Effect::Redirect { url, delay } => {
                tokio::time::sleep(delay).await;
                info!(%url, "leaving quiz for redirect");
                self.view.navigate_to(&url);
                None
            }
            Effect::SetLoading(loading) => {
                self.view.set_loading(loading);
                None
            }
            Effect::Submit(submission) => {
                let config = self.state.config();
                let request = SubmitRequest {
                    form_id: config.form_id,
                    session_id: config.session_id.clone(),
                    responses: submission.responses,
                    variables: submission.variables,
                    time_spent: submission.time_spent_secs,
                };
                match self.backend.submit_response(&request).await {
                    Ok(response) => {
                        info!(session_id = %request.session_id, "quiz submitted");
                        Some(QuizEvent::SubmissionSucceeded {
                            redirect_url: response.redirect(),
                        })
                    }
                    Err(err) => {
                        warn!(session_id = %request.session_id, error = %err, "quiz submission failed");
                        Some(QuizEvent::SubmissionFailed {
                            message: err.user_message(),
                        })
                    }
                }
            }
            Effect::ShowRedirecting => {
                self.view.show_redirecting();
                None
            }
            Effect::ShowSubmissionError { message } => {
                self.view.show_submission_error(&message);
                None
            }
            Effect::Completed => {
                self.view.completed();
                None
            }
        }
    }
}
