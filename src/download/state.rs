//! Per-model download state.

use std::fmt;

/// Where a model's file stands on this device.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum DownloadState {
    /// No usable file. Resume data may still exist after a cancel.
    #[default]
    NotDownloaded,
    /// A transfer is running; `progress` is in `[0, 1]`.
    Downloading { progress: f64 },
    /// The file is present at its permanent path.
    Downloaded,
    /// The last transfer failed. Retry with `start_download`.
    Failed { reason: String },
}

impl DownloadState {
    pub fn is_downloading(&self) -> bool {
        matches!(self, Self::Downloading { .. })
    }

    pub fn is_downloaded(&self) -> bool {
        matches!(self, Self::Downloaded)
    }

    /// Progress fraction, 1.0 once downloaded.
    pub fn progress(&self) -> f64 {
        match self {
            Self::Downloading { progress } => *progress,
            Self::Downloaded => 1.0,
            Self::NotDownloaded | Self::Failed { .. } => 0.0,
        }
    }
}

impl fmt::Display for DownloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotDownloaded => write!(f, "not downloaded"),
            Self::Downloading { progress } => write!(f, "downloading ({:.0}%)", progress * 100.0),
            Self::Downloaded => write!(f, "downloaded"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}
