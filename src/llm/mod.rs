pub mod client;
pub mod error;
pub mod retry;

use async_openai::types::ChatCompletionRequestMessage;
use async_trait::async_trait;

pub use client::{ChatRequest, HttpTransport, LlmClient, Transport};
pub use error::LlmError;
pub use retry::{with_backoff, RetryPolicy};

/// Anything that can turn a conversation into one reply.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
        max_tokens: u32,
    ) -> Result<String, LlmError>;
}
