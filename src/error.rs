//! Error types for the orchestration core.
//!
//! Each variant carries a stable error code (SCREAMING_SNAKE_CASE) that is
//! included in the Display output and accessible via [`VoxError::code()`].
//! Codes are part of the public contract (§4.10, §7) and will not change.

/// Errors produced by the orchestration core.
///
/// Each variant corresponds to one of the error kinds in §7. The Display
/// impl formats as `[CODE] message`.
#[derive(Debug, thiserror::Error)]
pub enum VoxError {
    /// Microphone, speech, screen, or accessibility permission denied.
    #[error("[PERMISSION_DENIED] {0}")]
    PermissionDenied(String),

    /// HTTP non-200, connection reset, or stream cut talking to the
    /// inference backend.
    #[error("[NETWORK_TRANSIENT] {0}")]
    NetworkTransient(String),

    /// Malformed JSON from the planner. Treated as `NetworkTransient` by
    /// callers but logged with the raw response.
    #[error("[PARSE_ERROR] {0}")]
    ParseError(String),

    /// The model produced no tool calls and no recognized prefix in a
    /// non-conversational turn.
    #[error("[MODEL_REFUSES_TO_ACT] {0}")]
    ModelRefusesToAct(String),

    /// Screen capture failed or was lost mid-utterance.
    #[error("[SCREEN_CAPTURE_LOST] {0}")]
    ScreenCaptureLost(String),

    /// A new utterance arrived, or "stop" was heard, cancelling in-flight work.
    #[error("[USER_INTERRUPT] {0}")]
    UserInterrupt(String),

    /// Invalid or missing configuration.
    #[error("[CONFIG_INVALID] {0}")]
    ConfigError(String),

    /// Request to the inference provider timed out.
    #[error("[TIMEOUT] {0}")]
    Timeout(String),

    /// I/O error (memory file, session log).
    #[error("[IO_ERROR] {0}")]
    Io(#[from] std::io::Error),
}

impl VoxError {
    /// Returns the stable error code for this error.
    ///
    /// Codes are SCREAMING_SNAKE_CASE strings that remain stable across
    /// releases. Use these for programmatic error handling rather than
    /// parsing Display output.
    pub fn code(&self) -> &'static str {
        match self {
            Self::PermissionDenied(_) => "PERMISSION_DENIED",
            Self::NetworkTransient(_) => "NETWORK_TRANSIENT",
            Self::ParseError(_) => "PARSE_ERROR",
            Self::ModelRefusesToAct(_) => "MODEL_REFUSES_TO_ACT",
            Self::ScreenCaptureLost(_) => "SCREEN_CAPTURE_LOST",
            Self::UserInterrupt(_) => "USER_INTERRUPT",
            Self::ConfigError(_) => "CONFIG_INVALID",
            Self::Timeout(_) => "TIMEOUT",
            Self::Io(_) => "IO_ERROR",
        }
    }

    /// Whether the inference client's retry policy should retry this error.
    ///
    /// `NetworkTransient` and the errors treated as its equivalent
    /// (`ParseError`, `Timeout`) are retryable; everything else is not —
    /// retrying a permission denial or a user interrupt would be wrong.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkTransient(_) | Self::ParseError(_) | Self::Timeout(_)
        )
    }
}

/// Convenience alias for orchestration-core results.
pub type Result<T> = std::result::Result<T, VoxError>;
