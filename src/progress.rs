//! Progress event types for model download and loading.
//!
//! Provides callback-based progress reporting that decouples the download
//! and lifecycle logic from presentation (CLI progress line vs app UI).

use std::path::PathBuf;

/// Progress events emitted during model download and loading.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A model file transfer has started (or resumed).
    DownloadStarted {
        /// Catalog identifier.
        model_id: String,
        /// Total size in bytes, if known.
        total_bytes: Option<u64>,
        /// Bytes already on disk from an earlier attempt.
        resumed_from: u64,
    },

    /// Download progress update, emitted for every received chunk.
    DownloadProgress {
        /// Catalog identifier.
        model_id: String,
        /// Bytes on disk so far, including resumed bytes.
        bytes_downloaded: u64,
        /// Total size in bytes, if known.
        total_bytes: Option<u64>,
        /// `bytes_downloaded / total_bytes`, in `[0, 1]`.
        fraction: f64,
    },

    /// The file was verified and moved to its permanent path.
    DownloadComplete {
        /// Catalog identifier.
        model_id: String,
        /// Final local path.
        path: PathBuf,
    },

    /// The transfer was cancelled. Partial data is kept for resume.
    DownloadCancelled {
        /// Catalog identifier.
        model_id: String,
        /// Bytes retained for the next attempt.
        bytes_retained: u64,
    },

    /// The transfer failed.
    DownloadFailed {
        /// Catalog identifier.
        model_id: String,
        /// Human-readable error description.
        message: String,
    },

    /// Model loading into the inference engine has started.
    LoadStarted {
        /// Catalog identifier.
        model_id: String,
    },

    /// Model loading completed.
    LoadComplete {
        /// Catalog identifier.
        model_id: String,
        /// Time taken to load in seconds.
        duration_secs: f64,
    },
}

impl ProgressEvent {
    /// The model this event refers to.
    pub fn model_id(&self) -> &str {
        match self {
            Self::DownloadStarted { model_id, .. }
            | Self::DownloadProgress { model_id, .. }
            | Self::DownloadComplete { model_id, .. }
            | Self::DownloadCancelled { model_id, .. }
            | Self::DownloadFailed { model_id, .. }
            | Self::LoadStarted { model_id }
            | Self::LoadComplete { model_id, .. } => model_id,
        }
    }
}

/// Callback type for receiving progress events.
pub type ProgressCallback = Box<dyn Fn(ProgressEvent) + Send + Sync>;

/// Download fraction clamped to `[0, 1]`. Unknown totals report 0.
pub fn fraction(bytes_downloaded: u64, total_bytes: Option<u64>) -> f64 {
    match total_bytes {
        Some(0) | None => 0.0,
        Some(total) => (bytes_downloaded as f64 / total as f64).clamp(0.0, 1.0),
    }
}
