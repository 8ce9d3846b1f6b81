//! Compose failure taxonomy
//!
//! Every failure of a compose request ends up as one of these kinds. The
//! client only ever sees [`ComposeError::user_message`]; details stay in the
//! log.

use thiserror::Error;

use crate::backend::BackendError;

/// User-facing text for an unreachable generation service
pub const UNAVAILABLE_MESSAGE: &str = "Cannot connect to LLM. Is the service running?";

/// User-facing text for every other failure
pub const GENERIC_MESSAGE: &str = "An error occurred.";

/// Which deadline expired
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeoutKind {
    /// Nothing arrived after the request started
    FirstEvent,
    /// Too long between two fragments
    IdleGap,
    /// Whole execution ran too long
    HardLimit,
}

impl std::fmt::Display for TimeoutKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FirstEvent => write!(f, "first event"),
            Self::IdleGap => write!(f, "idle gap"),
            Self::HardLimit => write!(f, "hard limit"),
        }
    }
}

/// Why a compose request failed
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ComposeError {
    /// Rejected input; no execution was started
    #[error("{0}")]
    Validation(String),

    /// The generation service is unreachable
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Any other generation failure
    #[error("upstream error: {0}")]
    Upstream(String),

    /// A deadline expired
    #[error("timed out waiting for {0}")]
    Timeout(TimeoutKind),
}

impl ComposeError {
    /// Text safe to show the client
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::UpstreamUnavailable(_) => UNAVAILABLE_MESSAGE.to_string(),
            Self::Upstream(_) | Self::Timeout(_) => GENERIC_MESSAGE.to_string(),
        }
    }

    /// Short label for log fields
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::UpstreamUnavailable(_) => "llm_unavailable",
            Self::Upstream(_) => "upstream",
            Self::Timeout(_) => "timeout",
        }
    }
}

impl From<BackendError> for ComposeError {
    fn from(err: BackendError) -> Self {
        if err.is_unavailable() {
            Self::UpstreamUnavailable(err.to_string())
        } else {
            Self::Upstream(err.to_string())
        }
    }
}
