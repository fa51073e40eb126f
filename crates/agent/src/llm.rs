use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::warn;

use emsbot_core::config::{LlmConfig, LlmProvider};

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
const ERROR_BODY_PREVIEW: usize = 300;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }
}

/// One text-in/text-out call. `purpose` labels the call site for logs and test assertions.
#[derive(Clone, Debug, PartialEq)]
pub struct InferenceRequest {
    pub purpose: &'static str,
    pub model: String,
    pub temperature: f32,
    pub system: String,
    pub messages: Vec<ChatMessage>,
}

impl InferenceRequest {
    pub fn new(
        purpose: &'static str,
        model: impl Into<String>,
        temperature: f32,
        system: impl Into<String>,
    ) -> Self {
        Self {
            purpose,
            model: model.into(),
            temperature,
            system: system.into(),
            messages: Vec::new(),
        }
    }

    pub fn with_user(mut self, content: impl Into<String>) -> Self {
        self.messages.push(ChatMessage::user(content));
        self
    }

    /// System instructions first, then the conversation in order.
    pub fn wire_messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.messages.len() + 1);
        messages.push(ChatMessage::system(self.system.clone()));
        messages.extend(self.messages.iter().cloned());
        messages
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("invalid decision service url `{0}` (expected http:// or https://)")]
    InvalidBaseUrl(String),
    #[error("decision service requires an api key for provider `{0}`")]
    MissingApiKey(&'static str),
    #[error("decision service transport error: {0}")]
    Transport(String),
    #[error("decision service timed out after {0}s")]
    Timeout(u64),
    #[error("decision service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not decode decision service reply: {0}")]
    Decode(String),
    #[error("scripted decision service has no reply left for `{0}`")]
    ScriptExhausted(&'static str),
}

#[async_trait]
pub trait DecisionService: Send + Sync {
    fn name(&self) -> &'static str;

    async fn infer(&self, request: &InferenceRequest) -> Result<String, LlmError>;

    /// Cheap reachability check used by `doctor`.
    async fn probe(&self) -> Result<(), LlmError> {
        Ok(())
    }
}

pub fn build_decision_service(config: &LlmConfig) -> Result<Arc<dyn DecisionService>, LlmError> {
    match config.provider {
        LlmProvider::Ollama => {
            let base_url = config.base_url.as_deref().unwrap_or("http://localhost:11434");
            Ok(Arc::new(OllamaClient::new(base_url, config.timeout_secs, config.max_retries)?))
        }
        LlmProvider::OpenAi => {
            let api_key = config.api_key.clone().ok_or(LlmError::MissingApiKey("openai"))?;
            let base_url = config.base_url.as_deref().unwrap_or(DEFAULT_OPENAI_BASE_URL);
            Ok(Arc::new(OpenAiCompatibleClient::new(
                base_url,
                api_key,
                config.timeout_secs,
                config.max_retries,
            )?))
        }
    }
}

#[derive(Clone, Debug)]
struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    timeout_secs: u64,
    max_retries: u32,
}

impl HttpTransport {
    fn new(base_url: &str, timeout_secs: u64, max_retries: u32) -> Result<Self, LlmError> {
        let trimmed = base_url.trim();
        if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
            return Err(LlmError::InvalidBaseUrl(trimmed.to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|error| LlmError::Transport(error.to_string()))?;

        Ok(Self {
            client,
            base_url: trimmed.trim_end_matches('/').to_string(),
            timeout_secs,
            max_retries,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn map_send_error(&self, error: &reqwest::Error) -> LlmError {
        if error.is_timeout() {
            LlmError::Timeout(self.timeout_secs)
        } else {
            LlmError::Transport(error.to_string())
        }
    }

    /// Retries transport failures and 5xx replies up to `max_retries` times.
    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
        bearer: Option<&SecretString>,
    ) -> Result<T, LlmError> {
        let url = self.endpoint(path);
        let mut attempt = 0_u32;

        loop {
            let mut request = self.client.post(&url).json(body);
            if let Some(key) = bearer {
                request = request.bearer_auth(key.expose_secret());
            }

            let failure = match request.send().await {
                Ok(response) if response.status().is_success() => {
                    return response
                        .json::<T>()
                        .await
                        .map_err(|error| LlmError::Decode(error.to_string()));
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    let failure = LlmError::Status {
                        status: status.as_u16(),
                        body: body.chars().take(ERROR_BODY_PREVIEW).collect(),
                    };
                    if !status.is_server_error() {
                        return Err(failure);
                    }
                    failure
                }
                Err(error) => self.map_send_error(&error),
            };

            if attempt >= self.max_retries {
                return Err(failure);
            }
            attempt += 1;
            warn!(
                event_name = "llm.request.retry",
                correlation_id = "llm",
                attempt,
                error = %failure,
                "retrying decision service request"
            );
            tokio::time::sleep(Duration::from_millis(250 * u64::from(attempt))).await;
        }
    }

    async fn get_ok(&self, path: &str, bearer: Option<&SecretString>) -> Result<(), LlmError> {
        let mut request = self.client.get(self.endpoint(path));
        if let Some(key) = bearer {
            request = request.bearer_auth(key.expose_secret());
        }
        let response = request.send().await.map_err(|error| self.map_send_error(&error))?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(LlmError::Status { status: status.as_u16(), body: String::new() })
        }
    }
}

/// Non-streaming client for the Ollama `/api/chat` endpoint.
#[derive(Clone, Debug)]
pub struct OllamaClient {
    transport: HttpTransport,
}

#[derive(Deserialize)]
struct OllamaChatReply {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, timeout_secs: u64, max_retries: u32) -> Result<Self, LlmError> {
        Ok(Self { transport: HttpTransport::new(base_url, timeout_secs, max_retries)? })
    }
}

#[async_trait]
impl DecisionService for OllamaClient {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn infer(&self, request: &InferenceRequest) -> Result<String, LlmError> {
        let body = json!({
            "model": request.model,
            "messages": request.wire_messages(),
            "stream": false,
            "options": { "temperature": request.temperature },
        });
        let reply: OllamaChatReply = self.transport.post_json("api/chat", &body, None).await?;
        Ok(reply.message.content)
    }

    async fn probe(&self) -> Result<(), LlmError> {
        self.transport.get_ok("api/tags", None).await
    }
}

/// Client for any server speaking the OpenAI `/v1/chat/completions` dialect.
#[derive(Clone)]
pub struct OpenAiCompatibleClient {
    transport: HttpTransport,
    api_key: SecretString,
}

#[derive(Deserialize)]
struct CompletionReply {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: ReplyMessage,
}

impl OpenAiCompatibleClient {
    pub fn new(
        base_url: &str,
        api_key: SecretString,
        timeout_secs: u64,
        max_retries: u32,
    ) -> Result<Self, LlmError> {
        if api_key.expose_secret().trim().is_empty() {
            return Err(LlmError::MissingApiKey("openai"));
        }
        Ok(Self { transport: HttpTransport::new(base_url, timeout_secs, max_retries)?, api_key })
    }
}

#[async_trait]
impl DecisionService for OpenAiCompatibleClient {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn infer(&self, request: &InferenceRequest) -> Result<String, LlmError> {
        let body = json!({
            "model": request.model,
            "messages": request.wire_messages(),
            "temperature": request.temperature,
        });
        let reply: CompletionReply =
            self.transport.post_json("v1/chat/completions", &body, Some(&self.api_key)).await?;
        reply
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| LlmError::Decode("reply contained no choices".to_string()))
    }

    async fn probe(&self) -> Result<(), LlmError> {
        self.transport.get_ok("v1/models", Some(&self.api_key)).await
    }
}

enum ScriptStep {
    Reply(String),
    Fail(String),
}

/// Replays canned replies in order and records every request it receives.
#[derive(Default)]
pub struct ScriptedDecisionService {
    steps: Mutex<VecDeque<ScriptStep>>,
    requests: Mutex<Vec<InferenceRequest>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScriptedDecisionService {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let steps = replies.into_iter().map(|reply| ScriptStep::Reply(reply.into())).collect();
        Self { steps: Mutex::new(steps), requests: Mutex::new(Vec::new()) }
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        lock(&self.steps).push_back(ScriptStep::Reply(reply.into()));
    }

    /// Queues a transport failure for the next call.
    pub fn push_failure(&self, message: impl Into<String>) {
        lock(&self.steps).push_back(ScriptStep::Fail(message.into()));
    }

    pub fn requests(&self) -> Vec<InferenceRequest> {
        lock(&self.requests).clone()
    }

    pub fn purposes(&self) -> Vec<&'static str> {
        lock(&self.requests).iter().map(|request| request.purpose).collect()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.steps).len()
    }
}

#[async_trait]
impl DecisionService for ScriptedDecisionService {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn infer(&self, request: &InferenceRequest) -> Result<String, LlmError> {
        lock(&self.requests).push(request.clone());
        match lock(&self.steps).pop_front() {
            Some(ScriptStep::Reply(reply)) => Ok(reply),
            Some(ScriptStep::Fail(message)) => Err(LlmError::Transport(message)),
            None => Err(LlmError::ScriptExhausted(request.purpose)),
        }
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use emsbot_core::config::{AppConfig, LlmProvider};

    use super::{
        build_decision_service, ChatRole, DecisionService, HttpTransport, InferenceRequest,
        LlmError, OpenAiCompatibleClient, ScriptedDecisionService,
    };

    fn request(purpose: &'static str) -> InferenceRequest {
        InferenceRequest::new(purpose, "llama3.1:70b", 0.1, "be terse").with_user("hello")
    }

    #[tokio::test]
    async fn scripted_service_replays_in_order_and_records_requests() {
        let service = ScriptedDecisionService::new(["first", "second"]);

        assert_eq!(service.infer(&request("plan")).await.expect("first reply"), "first");
        assert_eq!(service.infer(&request("respond")).await.expect("second reply"), "second");
        assert_eq!(service.purposes(), vec!["plan", "respond"]);
        assert_eq!(service.remaining(), 0);
    }

    #[tokio::test]
    async fn scripted_service_reports_exhaustion_and_failures() {
        let service = ScriptedDecisionService::default();
        service.push_failure("connection refused");

        let failure = service.infer(&request("plan")).await.expect_err("queued failure");
        assert!(matches!(failure, LlmError::Transport(ref message) if message == "connection refused"));

        let exhausted = service.infer(&request("respond")).await.expect_err("no replies left");
        assert!(matches!(exhausted, LlmError::ScriptExhausted("respond")));
    }

    #[test]
    fn wire_messages_put_system_instructions_first() {
        let messages = request("plan").wire_messages();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, ChatRole::System);
        assert_eq!(messages[0].content, "be terse");
        assert_eq!(messages[1].role, ChatRole::User);
    }

    #[test]
    fn transport_rejects_non_http_urls_and_joins_paths() {
        assert!(matches!(
            HttpTransport::new("localhost:11434", 5, 0),
            Err(LlmError::InvalidBaseUrl(_))
        ));

        let transport = HttpTransport::new("http://localhost:11434/", 5, 0).expect("transport");
        assert_eq!(transport.endpoint("/api/chat"), "http://localhost:11434/api/chat");
    }

    #[test]
    fn openai_client_requires_non_blank_key() {
        let result =
            OpenAiCompatibleClient::new("https://api.openai.com", SecretString::from(" "), 5, 0);

        assert!(matches!(result, Err(LlmError::MissingApiKey("openai"))));
    }

    #[test]
    fn factory_builds_configured_provider() {
        let mut config = AppConfig::default().llm;
        let ollama = build_decision_service(&config).expect("ollama client");
        assert_eq!(ollama.name(), "ollama");

        config.provider = LlmProvider::OpenAi;
        config.api_key = None;
        assert!(matches!(build_decision_service(&config), Err(LlmError::MissingApiKey(_))));
    }
}
