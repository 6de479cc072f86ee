//! Failure classification for server calls.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub type SubmitResult<T> = Result<T, SubmitError>;

/// Outcome of a failed server call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// Server refused the payload; resending the same bytes cannot succeed.
    Rejected { status: u16 },
    /// Server error or unexpected status.
    Unavailable { status: u16 },
    /// Connection, DNS, TLS or timeout failure.
    Transport(String),
    /// Request could not be serialized.
    Encode(String),
    /// Response body did not match the expected shape.
    Decode(String),
}

impl SubmitError {
    /// Maps a non-2xx status code to its failure class.
    ///
    /// 408 and 429 ask the client to come back later, so they stay retryable.
    pub fn from_status(status: u16) -> Self {
        match status {
            408 | 429 => Self::Unavailable { status },
            400..=499 => Self::Rejected { status },
            _ => Self::Unavailable { status },
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Rejected { .. } | Self::Encode(_) => false,
            Self::Unavailable { .. } | Self::Transport(_) | Self::Decode(_) => true,
        }
    }

    /// Stable short code for log lines and reports.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "rejected",
            Self::Unavailable { .. } => "unavailable",
            Self::Transport(_) => "transport",
            Self::Encode(_) => "encode",
            Self::Decode(_) => "decode",
        }
    }
}

impl Display for SubmitError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rejected { status } => write!(f, "server rejected request with status {status}"),
            Self::Unavailable { status } => {
                write!(f, "server unavailable with status {status}")
            }
            Self::Transport(message) => write!(f, "transport error: {message}"),
            Self::Encode(message) => write!(f, "failed to encode request: {message}"),
            Self::Decode(message) => write!(f, "failed to decode response: {message}"),
        }
    }
}

impl Error for SubmitError {}
