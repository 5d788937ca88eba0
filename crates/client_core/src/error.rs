use shared::domain::PageId;
use thiserror::Error;

/// Failures raised by a [`crate::ContentClient`].
///
/// `Transport` is the only variant the client itself absorbs into fallback
/// data; the others always reach the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContentError {
    #[error("content store unreachable: {0}")]
    Transport(String),
    #[error("content not found: {0}")]
    NotFound(PageId),
    #[error("malformed response from content store: {0}")]
    MalformedResponse(String),
    /// The caller handed over something no store would accept.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ContentError {
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<reqwest::Error> for ContentError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            Self::MalformedResponse(value.to_string())
        } else {
            Self::Transport(value.to_string())
        }
    }
}
