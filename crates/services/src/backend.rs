use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;
use url::Url;

use quiz_core::model::{Answer, FormId, QuestionId, Responses, SessionId, Variables};
use quiz_core::Resolution;

use crate::error::BackendError;

//
// ─── REQUESTS / RESPONSES ─────────────────────────────────────────────────────
//

/// Fire-and-forget telemetry (`track_event`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackRequest {
    pub form_id: FormId,
    pub session_id: SessionId,
    pub event_type: String,
    pub event_data: Value,
}

/// Server-side branch resolution (`get_next_question`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NextQuestionRequest {
    pub form_id: FormId,
    pub session_id: SessionId,
    pub current_question_id: QuestionId,
    pub answer: Option<Answer>,
    pub variables: Variables,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NextQuestionResponse {
    #[serde(default)]
    pub variables: Option<Variables>,
    #[serde(default)]
    pub redirect_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_question_id")]
    pub next_question_id: Option<QuestionId>,
}

impl NextQuestionResponse {
    /// Converts into the state machine's view. Unusable redirects are dropped.
    #[must_use]
    pub fn into_resolution(self) -> Resolution {
        Resolution {
            variables: self.variables,
            redirect_url: parse_redirect(self.redirect_url.as_deref()),
            next_question_id: self.next_question_id,
        }
    }
}

/// Final submission (`submit_response`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitRequest {
    pub form_id: FormId,
    pub session_id: SessionId,
    pub responses: Responses,
    pub variables: Variables,
    pub time_spent: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SubmitResponse {
    #[serde(default)]
    pub redirect_url: Option<String>,
}

impl SubmitResponse {
    #[must_use]
    pub fn redirect(&self) -> Option<Url> {
        parse_redirect(self.redirect_url.as_deref())
    }
}

fn parse_redirect(raw: Option<&str>) -> Option<Url> {
    let raw = raw.map(str::trim).filter(|raw| !raw.is_empty())?;
    match Url::parse(raw) {
        Ok(url) => Some(url),
        Err(err) => {
            warn!(url = raw, error = %err, "ignoring unusable redirect from server");
            None
        }
    }
}

fn lenient_question_id<'de, D>(deserializer: D) -> Result<Option<QuestionId>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(QuestionId::new(s.trim())),
        Some(Value::Number(n)) => Some(QuestionId::new(n.to_string())),
        _ => None,
    })
}

//
// ─── BACKEND TRAIT ────────────────────────────────────────────────────────────
//

/// The three server actions a quiz session talks to.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuizBackend: Send + Sync {
    async fn track_event(&self, request: &TrackRequest) -> Result<(), BackendError>;

    async fn next_question(
        &self,
        request: &NextQuestionRequest,
    ) -> Result<NextQuestionResponse, BackendError>;

    async fn submit_response(&self, request: &SubmitRequest) -> Result<SubmitResponse, BackendError>;
}

//
// ─── IN-MEMORY BACKEND ────────────────────────────────────────────────────────
//

/// Scripted outcome for the next submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accept { redirect_url: Option<String> },
    Reject { message: String },
    Unreachable,
}

#[derive(Debug, Default)]
struct Recorded {
    tracked: Vec<TrackRequest>,
    queries: Vec<NextQuestionRequest>,
    submissions: Vec<SubmitRequest>,
    resolutions: HashMap<QuestionId, NextQuestionResponse>,
    submit_outcomes: VecDeque<SubmitOutcome>,
    fail_tracking: bool,
    fail_resolution: bool,
}

/// Records every call and answers from a script. Used offline and in tests.
///
/// Submissions are accepted without a redirect unless an outcome was queued.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    inner: Arc<Mutex<Recorded>>,
}

impl InMemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `get_next_question` for `question_id` with `response`.
    #[must_use]
    pub fn with_resolution(self, question_id: QuestionId, response: NextQuestionResponse) -> Self {
        if let Ok(mut guard) = self.inner.lock() {
            guard.resolutions.insert(question_id, response);
        }
        self
    }

    #[must_use]
    pub fn with_failing_tracking(self) -> Self {
        if let Ok(mut guard) = self.inner.lock() {
            guard.fail_tracking = true;
        }
        self
    }

    #[must_use]
    pub fn with_failing_resolution(self) -> Self {
        if let Ok(mut guard) = self.inner.lock() {
            guard.fail_resolution = true;
        }
        self
    }

    pub fn queue_submit_outcome(&self, outcome: SubmitOutcome) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.submit_outcomes.push_back(outcome);
        }
    }

    #[must_use]
    pub fn tracked(&self) -> Vec<TrackRequest> {
        self.inner
            .lock()
            .map(|guard| guard.tracked.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn queries(&self) -> Vec<NextQuestionRequest> {
        self.inner
            .lock()
            .map(|guard| guard.queries.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn submissions(&self) -> Vec<SubmitRequest> {
        self.inner
            .lock()
            .map(|guard| guard.submissions.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Recorded>, BackendError> {
        self.inner
            .lock()
            .map_err(|e| BackendError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl QuizBackend for InMemoryBackend {
    async fn track_event(&self, request: &TrackRequest) -> Result<(), BackendError> {
        let mut guard = self.lock()?;
        if guard.fail_tracking {
            return Err(BackendError::Unavailable("tracking disabled".into()));
        }
        guard.tracked.push(request.clone());
        Ok(())
    }

    async fn next_question(
        &self,
        request: &NextQuestionRequest,
    ) -> Result<NextQuestionResponse, BackendError> {
        let mut guard = self.lock()?;
        guard.queries.push(request.clone());
        if guard.fail_resolution {
            return Err(BackendError::Unavailable("resolution disabled".into()));
        }
        Ok(guard
            .resolutions
            .get(&request.current_question_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn submit_response(&self, request: &SubmitRequest) -> Result<SubmitResponse, BackendError> {
        let mut guard = self.lock()?;
        guard.submissions.push(request.clone());
        match guard.submit_outcomes.pop_front() {
            None => Ok(SubmitResponse::default()),
            Some(SubmitOutcome::Accept { redirect_url }) => Ok(SubmitResponse { redirect_url }),
            Some(SubmitOutcome::Reject { message }) => Err(BackendError::Rejected { message }),
            Some(SubmitOutcome::Unreachable) => {
                Err(BackendError::Unavailable("submission endpoint unreachable".into()))
            }
        }
    }
}
