//! Error type definitions for the stream cleaner
//!
//! Errors are contained within the component that raised them. Only the
//! interception boundary decides what a failure means for the caller, and there
//! every failure collapses into "forward the original bytes".

use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Alternate source probing errors
    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),

    /// Token endpoint / token cache errors
    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    /// Manifest rewrite errors
    #[error("Rewrite error: {0}")]
    Rewrite(#[from] RewriteError),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Failure of a single alternate-source candidate.
///
/// Never fatal: the prober logs it and moves on to the next candidate.
#[derive(Error, Debug, Clone)]
pub enum ProbeError {
    #[error("Candidate timed out after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Non-success status: {status}")]
    Http { status: u16 },

    #[error("Transport failure: {message}")]
    Transport { message: String },

    #[error("No playback token for presentation context {context}")]
    MissingToken { context: String },

    #[error("Candidate disqualified: {reason}")]
    Disqualified { reason: String },

    #[error("Invalid manifest URL: {url}")]
    InvalidUrl { url: String },
}

/// Token-issuing endpoint errors
#[derive(Error, Debug, Clone)]
pub enum TokenError {
    #[error("Token endpoint unreachable: {message}")]
    Transport { message: String },

    #[error("Token endpoint returned status {status}")]
    Http { status: u16 },

    #[error("Token payload could not be decoded: {message}")]
    Decode { message: String },

    #[error("Token payload has no playback token")]
    MissingToken,
}

/// Rewrite pass errors, surfaced only at the interception boundary
#[derive(Error, Debug)]
pub enum RewriteError {
    #[error("Manifest body is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("Rewrite pass panicked: {message}")]
    Panicked { message: String },
}

impl AppError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl ProbeError {
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn disqualified<S: Into<String>>(reason: S) -> Self {
        Self::Disqualified {
            reason: reason.into(),
        }
    }
}

impl From<TokenError> for ProbeError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Http { status } => Self::Http { status },
            other => Self::Transport {
                message: other.to_string(),
            },
        }
    }
}

impl From<reqwest::Error> for TokenError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            Self::Http {
                status: status.as_u16(),
            }
        } else if err.is_decode() {
            Self::Decode {
                message: err.to_string(),
            }
        } else {
            Self::Transport {
                message: err.to_string(),
            }
        }
    }
}
