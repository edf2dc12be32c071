use thiserror::Error;

const BODY_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("server error {status}: {body}")]
    Server { status: u16, body: String },
    #[error("rate limited")]
    RateLimited,
    #[error("request rejected {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("gave up after {attempts} attempts")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<LlmError>,
    },
}

impl LlmError {
    /// Worth another attempt after a pause.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmError::Timeout
                | LlmError::Connection(_)
                | LlmError::Server { .. }
                | LlmError::RateLimited
        )
    }

    pub fn from_status(status: u16, body: &str) -> Self {
        let body: String = body.chars().take(BODY_PREVIEW_CHARS).collect();
        match status {
            429 => LlmError::RateLimited,
            500..=599 => LlmError::Server { status, body },
            _ => LlmError::Rejected { status, body },
        }
    }

    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else if err.is_decode() {
            LlmError::Malformed(err.to_string())
        } else {
            LlmError::Connection(err.to_string())
        }
    }
}
