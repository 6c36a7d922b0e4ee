//! Error taxonomy shared by the backend collaborators and the inference apps.
//!
//! Every kind is terminal for the invocation that produced it. Nothing is
//! retried automatically; the session turns the error into a visible message.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InferenceError {
    /// Required user input is missing. Raised before anything is sent.
    #[error("{0}")]
    Validation(String),

    /// Transport or HTTP failure talking to the backend.
    #[error("Network error: {0}")]
    Network(String),

    /// The backend replied with a shape the task does not understand.
    #[error("Unexpected response: {0}")]
    Format(String),

    /// A file referenced by the response could not be found locally.
    #[error("Resource not found: {0}")]
    Resource(String),

    /// The live video channel or its frame source failed mid-pass.
    #[error("Live stream failed: {0}")]
    Stream(String),

    /// Another invocation is already running on this session.
    #[error("An inference is already running")]
    Busy,
}

impl InferenceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Self::Resource(msg.into())
    }

    pub fn stream(msg: impl Into<String>) -> Self {
        Self::Stream(msg.into())
    }

    /// Short label used in logs and status lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Network(_) => "network",
            Self::Format(_) => "format",
            Self::Resource(_) => "resource",
            Self::Stream(_) => "stream",
            Self::Busy => "busy",
        }
    }
}

impl From<reqwest::Error> for InferenceError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

pub type InferenceResult<T> = Result<T, InferenceError>;
