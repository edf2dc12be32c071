use super::error::LlmError;
use super::retry::{with_backoff, RetryPolicy};
use super::ChatModel;
use crate::config::Config;
use async_openai::types::ChatCompletionRequestMessage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatCompletionRequestMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatResponse {
    fn into_text(self) -> Result<String, LlmError> {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| LlmError::Malformed("response carried no text".to_string()))
    }
}

/// One HTTP round trip, no retries.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ChatRequest) -> Result<String, LlmError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpTransport {
    pub fn new(url: &str, api_key: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let mut builder = self.client.post(&self.url).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(LlmError::from_reqwest)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status(status.as_u16(), &body));
        }

        let body = response.text().await.map_err(LlmError::from_reqwest)?;
        let parsed: ChatResponse =
            serde_json::from_str(&body).map_err(|e| LlmError::Malformed(e.to_string()))?;
        parsed.into_text()
    }
}

pub struct LlmClient<T = HttpTransport> {
    transport: T,
    model: String,
    temperature: f32,
    policy: RetryPolicy,
}

impl LlmClient<HttpTransport> {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let transport =
            HttpTransport::new(&config.llm_url, config.llm_api_key.clone(), config.llm_timeout())?;
        Ok(Self::with_transport(
            transport,
            &config.llm_model,
            config.llm_temperature,
            RetryPolicy {
                max_attempts: config.llm_max_attempts,
                base_delay: Duration::from_millis(config.llm_retry_base_ms),
            },
        ))
    }
}

impl<T: Transport> LlmClient<T> {
    pub fn with_transport(transport: T, model: &str, temperature: f32, policy: RetryPolicy) -> Self {
        Self {
            transport,
            model: model.to_string(),
            temperature,
            policy,
        }
    }
}

#[async_trait]
impl<T: Transport> ChatModel for LlmClient<T> {
    async fn complete(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens,
        };
        let request = &request;
        with_backoff(&self.policy, |attempt| async move {
            debug!(
                "LLM request attempt {} ({} messages, max_tokens {})",
                attempt,
                request.messages.len(),
                request.max_tokens
            );
            self.transport.send(request).await
        })
        .await
    }
}
