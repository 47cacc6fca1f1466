//! Error taxonomy shared by every Flame crate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used across the client API.
pub type Result<T> = std::result::Result<T, FlameError>;

/// Discriminant of a [`FlameError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Bad or empty address, unreachable endpoint, unreadable configuration.
    InvalidConfig = 0,
    /// Operation attempted against an entity in an incompatible lifecycle state.
    InvalidState = 1,
    /// Malformed caller input.
    InvalidArgument = 2,
    /// Any transport, stream or server failure.
    Internal = 3,
}

/// Flame client error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlameError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl FlameError {
    /// Error code of this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidConfig(_) => ErrorCode::InvalidConfig,
            Self::InvalidState(_) => ErrorCode::InvalidState,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Human-readable message, without the code prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::InvalidConfig(m)
            | Self::InvalidState(m)
            | Self::InvalidArgument(m)
            | Self::Internal(m) => m,
        }
    }
}
