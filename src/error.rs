use thiserror::Error;

use crate::dice::DiceError;
use crate::lobby::membership::JoinRejection;

/// Everything a single client action can fail with.
///
/// None of these are fatal: the hub reports them to the triggering connection
/// as `error_message{text, code}` and carries on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Malformed dice expression, command syntax or message payload.
    #[error("{0}")]
    Validation(String),

    /// Caller lacks the role or ownership required.
    #[error("{0}")]
    Unauthorized(String),

    /// Unknown member, scene, choice, token, quest or campaign key.
    #[error("{0}")]
    NotFound(String),

    /// Lobby is locked for players until the campaign starts.
    #[error("This lobby is locked until the GM starts the campaign")]
    Locked,

    /// Per-connection rate limit hit.
    #[error("Slow down: retry in {retry_after_ms} ms")]
    RateExceeded { retry_after_ms: u64 },

    /// Join refused.
    #[error("{0}")]
    Rejected(JoinRejection),
}

impl SessionError {
    pub fn validation(msg: impl Into<String>) -> Self {
        SessionError::Validation(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        SessionError::Unauthorized(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        SessionError::NotFound(msg.into())
    }

    /// Short machine-readable code sent alongside the text.
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::Validation(_) => "validation",
            SessionError::Unauthorized(_) => "unauthorized",
            SessionError::NotFound(_) => "not_found",
            SessionError::Locked => "locked",
            SessionError::RateExceeded { .. } => "rate_limited",
            SessionError::Rejected(_) => "rejected",
        }
    }
}

impl From<DiceError> for SessionError {
    fn from(e: DiceError) -> Self {
        SessionError::Validation(e.to_string())
    }
}

impl From<JoinRejection> for SessionError {
    fn from(r: JoinRejection) -> Self {
        SessionError::Rejected(r)
    }
}
