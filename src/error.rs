//! Error types for Sotto
//!
//! This module defines all error types used throughout the runtime.
//! Uses `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.

use thiserror::Error;

/// The primary error type for Sotto operations.
///
/// Containment rules:
/// - `Capability` failures are fed back into the turn loop as messages and
///   never abort a turn on their own.
/// - `Distillation` failures are logged by the worker and never surface.
/// - `Persistence` failures are fatal to the current turn; a message must
///   never be silently lost.
/// - `Unrecoverable` drives the voice controller into its error state.
#[derive(Error, Debug)]
pub enum SottoError {
    /// Configuration-related errors (invalid config, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Completion service errors (network failures, API errors, request timeouts).
    /// Retried once with backoff by the loop, then surfaced as terminal reply text.
    #[error("Completion service error: {0}")]
    Completion(String),

    /// Capability execution errors (invalid arguments, handler failures).
    #[error("Capability error: {0}")]
    Capability(String),

    /// The turn exceeded its overall wall-clock budget.
    #[error("Turn timed out after {0}s")]
    LoopTimeout(u64),

    /// The turn exceeded the maximum number of completion rounds.
    #[error("Turn exceeded the round limit of {0}")]
    RoundLimitExceeded(u32),

    /// Durable write failure in the session record path. Fatal to the turn.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Background fact distillation failure. Logged by the worker, never surfaced.
    #[error("Distillation error: {0}")]
    Distillation(String),

    /// A session lifecycle violation (double open, append with no open session, etc.)
    #[error("Session error: {0}")]
    Session(String),

    /// A fault the runtime cannot recover from without an external restart.
    #[error("Unrecoverable fault: {0}")]
    Unrecoverable(String),

    /// Standard I/O errors outside the persistence path
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport errors from the completion client
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl SottoError {
    /// Returns `true` if this fault should park the voice controller in its
    /// error state instead of auto-returning to idle.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, SottoError::Unrecoverable(_))
    }

    /// Wrap an I/O error from the durable session path.
    pub fn persistence(context: &str, err: impl std::fmt::Display) -> Self {
        SottoError::Persistence(format!("{}: {}", context, err))
    }
}

/// A specialized `Result` type for Sotto operations.
pub type Result<T> = std::result::Result<T, SottoError>;
