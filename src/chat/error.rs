use axum::http::StatusCode;
use thiserror::Error;

use crate::images::ImageDecodeError;
use crate::llm::TransportError;

/// Why a turn could not produce a decision. Each kind has its own reply;
/// none of them reaches the transcript as a technical message.
#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("image decode failed: {0}")]
    Decode(#[from] ImageDecodeError),
    #[error("generation transport failed: {0}")]
    Transport(#[from] TransportError),
    #[error("model response malformed: {0}")]
    Parse(String),
}

pub const DECODE_FAILED_REPLY: &str =
    "I couldn't open that photo. Could you try sending it again, or another picture?";
pub const TRANSPORT_FAILED_REPLY: &str =
    "Sorry, I'm having a little trouble hearing you right now. Give me a moment and send that again?";
pub const PARSE_FAILED_REPLY: &str =
    "Hmm, I couldn't make sense of that one. Could you try again, maybe with a bit more detail?";

impl IntakeError {
    pub fn reply_text(&self) -> &'static str {
        match self {
            Self::Decode(_) => DECODE_FAILED_REPLY,
            Self::Transport(_) => TRANSPORT_FAILED_REPLY,
            Self::Parse(_) => PARSE_FAILED_REPLY,
        }
    }
}

/// Request-level failures of the chat endpoints.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("message needs text or a photo")]
    EmptyInput,
    #[error("complete your profile first")]
    NoProfile,
    #[error("client_request_id already used")]
    Duplicate,
    #[error("message not found")]
    NotFound,
    #[error("message has no proposal awaiting confirmation")]
    NotProposed,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<ChatError> for (StatusCode, String) {
    fn from(e: ChatError) -> Self {
        let status = match &e {
            ChatError::EmptyInput => StatusCode::BAD_REQUEST,
            ChatError::NoProfile | ChatError::Duplicate | ChatError::NotProposed => {
                StatusCode::CONFLICT
            }
            ChatError::NotFound => StatusCode::NOT_FOUND,
            ChatError::Internal(inner) => {
                tracing::error!(error = %inner, "internal error");
                return (StatusCode::INTERNAL_SERVER_ERROR, "internal error".into());
            }
        };
        (status, e.to_string())
    }
}
