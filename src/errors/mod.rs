//! Centralized error handling for the stream cleaner
//!
//! # Error Categories
//!
//! - **Probe Errors**: a single alternate-source candidate failed to qualify
//! - **Token Errors**: the token-issuing endpoint failed or returned garbage
//! - **Rewrite Errors**: the rewrite pass could not run (bad UTF-8, panic)
//! - **Configuration Errors**: invalid or unreadable configuration
//!
//! Parse anomalies are not errors at all: unrecognised lines pass through the
//! parser verbatim.

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for probe candidate Results
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Convenience type alias for token endpoint Results
pub type TokenResult<T> = Result<T, TokenError>;
