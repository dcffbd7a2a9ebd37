//! Error types for the mica core.
//!
//! Each variant carries a stable error code (SCREAMING_SNAKE_CASE) that is
//! included in the Display output and accessible via [`MicaError::code()`].
//! Front-ends should branch on codes rather than on Display text.

/// Stable error codes for programmatic error handling.
pub mod error_codes {
    /// A session, folder, block or other record does not exist.
    pub const NOT_FOUND: &str = "NOT_FOUND";

    /// The model is not in the catalog or its file is not downloaded.
    pub const MODEL_NOT_FOUND: &str = "MODEL_NOT_FOUND";

    /// A download or generation for the same target is already running.
    pub const ALREADY_IN_PROGRESS: &str = "ALREADY_IN_PROGRESS";

    /// The operation was cancelled by the caller.
    pub const CANCELLED: &str = "CANCELLED";

    /// Network or disk failure while transferring a model file.
    pub const TRANSFER_FAILED: &str = "TRANSFER_FAILED";

    /// No model is loaded and ready for generation.
    pub const MODEL_NOT_READY: &str = "MODEL_NOT_READY";

    /// The inference engine failed to load the model file.
    pub const MODEL_INIT_FAILED: &str = "MODEL_INIT_FAILED";

    /// The model produced only whitespace.
    pub const EMPTY_GENERATION: &str = "EMPTY_GENERATION";

    /// Generation requested too soon after the previous one.
    pub const RATE_LIMITED: &str = "RATE_LIMITED";

    /// Persistent storage could not be read or written.
    pub const STORAGE_ERROR: &str = "STORAGE_ERROR";

    /// Invalid or unreadable configuration.
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";

    /// Raw I/O failure.
    pub const IO_ERROR: &str = "IO_ERROR";
}

/// Errors produced by the mica core.
///
/// The Display impl formats as `[CODE] message`.
#[derive(Debug, thiserror::Error)]
pub enum MicaError {
    /// A record does not exist.
    #[error("[{}] {}", error_codes::NOT_FOUND, .0)]
    NotFound(String),

    /// The model is unknown or not downloaded.
    #[error("[{}] {}", error_codes::MODEL_NOT_FOUND, .0)]
    ModelNotFound(String),

    /// Duplicate download or generation request.
    #[error("[{}] {}", error_codes::ALREADY_IN_PROGRESS, .0)]
    AlreadyInProgress(String),

    /// Cancelled by the caller.
    #[error("[{}] {}", error_codes::CANCELLED, .0)]
    Cancelled(String),

    /// Network or disk failure during a model download.
    #[error("[{}] {}", error_codes::TRANSFER_FAILED, .0)]
    TransferFailure(String),

    /// Generation requested without a ready model.
    #[error("[{}] {}", error_codes::MODEL_NOT_READY, .0)]
    ModelNotReady(String),

    /// The inference engine rejected the model file.
    #[error("[{}] {}", error_codes::MODEL_INIT_FAILED, .0)]
    ModelInitializationFailed(String),

    /// The model produced an empty (whitespace-only) answer.
    #[error("[{}] {}", error_codes::EMPTY_GENERATION, .0)]
    EmptyGenerationResult(String),

    /// Generation started too soon after the previous one.
    #[error("[{}] {}", error_codes::RATE_LIMITED, .0)]
    RateLimited(String),

    /// Session, memory or preference persistence failed.
    #[error("[{}] {}", error_codes::STORAGE_ERROR, .0)]
    Storage(String),

    /// Configuration could not be parsed or written.
    #[error("[{}] {}", error_codes::CONFIG_INVALID, .0)]
    Config(String),

    /// I/O error.
    #[error("[{}] {}", error_codes::IO_ERROR, .0)]
    Io(#[from] std::io::Error),
}

impl MicaError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => error_codes::NOT_FOUND,
            Self::ModelNotFound(_) => error_codes::MODEL_NOT_FOUND,
            Self::AlreadyInProgress(_) => error_codes::ALREADY_IN_PROGRESS,
            Self::Cancelled(_) => error_codes::CANCELLED,
            Self::TransferFailure(_) => error_codes::TRANSFER_FAILED,
            Self::ModelNotReady(_) => error_codes::MODEL_NOT_READY,
            Self::ModelInitializationFailed(_) => error_codes::MODEL_INIT_FAILED,
            Self::EmptyGenerationResult(_) => error_codes::EMPTY_GENERATION,
            Self::RateLimited(_) => error_codes::RATE_LIMITED,
            Self::Storage(_) => error_codes::STORAGE_ERROR,
            Self::Config(_) => error_codes::CONFIG_INVALID,
            Self::Io(_) => error_codes::IO_ERROR,
        }
    }

    /// Returns the message without the code prefix.
    pub fn message(&self) -> String {
        match self {
            Self::NotFound(m)
            | Self::ModelNotFound(m)
            | Self::AlreadyInProgress(m)
            | Self::Cancelled(m)
            | Self::TransferFailure(m)
            | Self::ModelNotReady(m)
            | Self::ModelInitializationFailed(m)
            | Self::EmptyGenerationResult(m)
            | Self::RateLimited(m)
            | Self::Storage(m)
            | Self::Config(m) => m.clone(),
            Self::Io(e) => e.to_string(),
        }
    }

    /// Returns true if the same request can succeed later without any
    /// other change (user retry of a download, or waiting out a rate limit).
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TransferFailure(_) | Self::RateLimited(_) | Self::Io(_) => true,
            Self::NotFound(_)
            | Self::ModelNotFound(_)
            | Self::AlreadyInProgress(_)
            | Self::Cancelled(_)
            | Self::ModelNotReady(_)
            | Self::ModelInitializationFailed(_)
            | Self::EmptyGenerationResult(_)
            | Self::Storage(_)
            | Self::Config(_) => false,
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, MicaError>;
