use std::env;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::backend::{
    NextQuestionRequest, NextQuestionResponse, QuizBackend, SubmitRequest, SubmitResponse,
    TrackRequest,
};
use crate::error::BackendError;

/// Where and how to reach the WordPress AJAX endpoint.
#[derive(Clone, Debug)]
pub struct AjaxConfig {
    pub endpoint: Url,
    pub nonce: String,
    pub action_prefix: String,
}

impl AjaxConfig {
    #[must_use]
    pub fn new(endpoint: Url, nonce: impl Into<String>) -> Self {
        Self {
            endpoint,
            nonce: nonce.into(),
            action_prefix: String::new(),
        }
    }

    #[must_use]
    pub fn with_action_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.action_prefix = prefix.into();
        self
    }

    /// Reads `QUIZ_AJAX_URL`, `QUIZ_AJAX_NONCE` and `QUIZ_ACTION_PREFIX`.
    ///
    /// Returns `None` when no usable endpoint URL is set.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let endpoint = env::var("QUIZ_AJAX_URL").ok()?;
        let endpoint = Url::parse(endpoint.trim()).ok()?;
        let nonce = env::var("QUIZ_AJAX_NONCE").unwrap_or_default();
        let prefix = env::var("QUIZ_ACTION_PREFIX").unwrap_or_default();
        Some(Self::new(endpoint, nonce).with_action_prefix(prefix.trim()))
    }

    fn action(&self, name: &str) -> String {
        format!("{}{name}", self.action_prefix)
    }
}

/// `QuizBackend` over `admin-ajax.php`.
///
/// Every call is a form-encoded POST carrying the action name and nonce.
/// Structured values (answers, variables) travel as JSON strings.
#[derive(Clone)]
pub struct AjaxBackend {
    client: Client,
    config: AjaxConfig,
}

impl AjaxBackend {
    #[must_use]
    pub fn new(config: AjaxConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AjaxConfig {
        &self.config
    }

    async fn post(
        &self,
        action: &str,
        mut fields: Vec<(&'static str, String)>,
    ) -> Result<reqwest::Response, BackendError> {
        fields.push(("action", self.config.action(action)));
        fields.push(("nonce", self.config.nonce.clone()));

        debug!(action, "posting quiz ajax request");
        let response = self
            .client
            .post(self.config.endpoint.clone())
            .form(&fields)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BackendError::HttpStatus(response.status()));
        }
        Ok(response)
    }

    async fn post_envelope<T: DeserializeOwned>(
        &self,
        action: &str,
        fields: Vec<(&'static str, String)>,
    ) -> Result<T, BackendError> {
        let envelope: Envelope = self.post(action, fields).await?.json().await?;
        envelope.into_data()
    }
}

#[async_trait]
impl QuizBackend for AjaxBackend {
    async fn track_event(&self, request: &TrackRequest) -> Result<(), BackendError> {
        let fields = vec![
            ("form_id", request.form_id.to_string()),
            ("session_id", request.session_id.to_string()),
            ("event_type", request.event_type.clone()),
            ("event_data", to_json(&request.event_data)?),
        ];
        self.post("track_event", fields).await?;
        Ok(())
    }

    async fn next_question(
        &self,
        request: &NextQuestionRequest,
    ) -> Result<NextQuestionResponse, BackendError> {
        let answer = match &request.answer {
            Some(answer) => to_json(answer)?,
            None => String::new(),
        };
        let fields = vec![
            ("form_id", request.form_id.to_string()),
            ("session_id", request.session_id.to_string()),
            ("current_question_id", request.current_question_id.to_string()),
            ("answer", answer),
            ("variables", to_json(&request.variables)?),
        ];
        self.post_envelope("get_next_question", fields).await
    }

    async fn submit_response(&self, request: &SubmitRequest) -> Result<SubmitResponse, BackendError> {
        let fields = vec![
            ("form_id", request.form_id.to_string()),
            ("session_id", request.session_id.to_string()),
            ("responses", to_json(&request.responses)?),
            ("variables", to_json(&request.variables)?),
            ("time_spent", request.time_spent.to_string()),
        ];
        self.post_envelope("submit_response", fields).await
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, BackendError> {
    serde_json::to_string(value).map_err(|err| BackendError::Decode(err.to_string()))
}

/// `wp_send_json_success` / `wp_send_json_error` wrapper.
#[derive(Debug, Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    data: Value,
}

impl Envelope {
    fn into_data<T: DeserializeOwned>(self) -> Result<T, BackendError> {
        if !self.success {
            let message = match &self.data {
                Value::String(message) => message.clone(),
                Value::Object(map) => map
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned(),
                _ => String::new(),
            };
            return Err(BackendError::Rejected { message });
        }

        let data = match self.data {
            Value::Null => Value::Object(serde_json::Map::new()),
            other => other,
        };
        serde_json::from_value(data).map_err(|err| BackendError::Decode(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::{Answer, FormId, QuestionId, Responses, SessionId, Variables};
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const AJAX_PATH: &str = "/wp-admin/admin-ajax.php";

    fn backend_for(server: &MockServer) -> AjaxBackend {
        let endpoint = Url::parse(&format!("{}{AJAX_PATH}", server.uri())).unwrap();
        AjaxBackend::new(AjaxConfig::new(endpoint, "n0nce").with_action_prefix("quiz_"))
    }

    fn submit_request() -> SubmitRequest {
        let mut responses = Responses::new();
        responses.record(QuestionId::new("q1"), Answer::single("yes"));
        SubmitRequest {
            form_id: FormId::new(7),
            session_id: SessionId::new("abc"),
            responses,
            variables: Variables::new(),
            time_spent: 12,
        }
    }

    #[tokio::test]
    async fn submit_posts_form_and_reads_redirect() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(AJAX_PATH))
            .and(body_string_contains("action=quiz_submit_response"))
            .and(body_string_contains("nonce=n0nce"))
            .and(body_string_contains("form_id=7"))
            .and(body_string_contains("time_spent=12"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {"redirect_url": "https://example.com/result"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = backend_for(&server)
            .submit_response(&submit_request())
            .await
            .unwrap();
        assert_eq!(
            response.redirect_url.as_deref(),
            Some("https://example.com/result")
        );
    }

    #[tokio::test]
    async fn submit_surfaces_server_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(AJAX_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "data": {"message": "This form is closed."}
            })))
            .mount(&server)
            .await;

        let err = backend_for(&server)
            .submit_response(&submit_request())
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "This form is closed.");
    }

    #[tokio::test]
    async fn http_failure_is_reported_as_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(AJAX_PATH))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = backend_for(&server)
            .submit_response(&submit_request())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::HttpStatus(status) if status.as_u16() == 500));
    }

    #[tokio::test]
    async fn next_question_decodes_branch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(AJAX_PATH))
            .and(body_string_contains("action=quiz_get_next_question"))
            .and(body_string_contains("current_question_id=q1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {"next_question_id": "q4", "variables": {"score": 2}}
            })))
            .mount(&server)
            .await;

        let request = NextQuestionRequest {
            form_id: FormId::new(7),
            session_id: SessionId::new("abc"),
            current_question_id: QuestionId::new("q1"),
            answer: Some(Answer::single("a")),
            variables: Variables::new(),
        };
        let response = backend_for(&server).next_question(&request).await.unwrap();
        assert_eq!(response.next_question_id, Some(QuestionId::new("q4")));
        assert_eq!(response.variables.map(|v| v.get("score")), Some(2));
    }

    #[tokio::test]
    async fn tracking_ignores_response_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(AJAX_PATH))
            .and(body_string_contains("action=quiz_track_event"))
            .and(body_string_contains("event_type=view"))
            .respond_with(ResponseTemplate::new(200).set_body_string("0"))
            .expect(1)
            .mount(&server)
            .await;

        let request = TrackRequest {
            form_id: FormId::new(7),
            session_id: SessionId::new("abc"),
            event_type: "view".into(),
            event_data: json!({}),
        };
        backend_for(&server).track_event(&request).await.unwrap();
    }

    #[test]
    fn envelope_with_null_data_decodes_defaults() {
        let envelope: Envelope = serde_json::from_value(json!({"success": true})).unwrap();
        let response: SubmitResponse = envelope.into_data().unwrap();
        assert_eq!(response.redirect_url, None);
    }
}
