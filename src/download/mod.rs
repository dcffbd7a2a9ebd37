//! Model file downloads with byte-range resume.
//!
//! - [`DownloadManager`] drives one transfer per model id
//! - [`DownloadState`] is the per-model state machine
//! - [`resume`] owns the `.partial` / `.resume.json` sidecar files
//! - [`integrity`] verifies SHA-256 checksums after completion
//!
//! State machine per model:
//!
//! ```text
//! NotDownloaded --start--> Downloading --ok--> Downloaded --delete--> NotDownloaded
//!                              |  \--cancel--> NotDownloaded (resume data kept)
//!                              \--error--> Failed --start--> Downloading
//! ```

pub mod integrity;
mod manager;
pub mod resume;
mod state;

pub use manager::DownloadManager;
pub use resume::ResumeData;
pub use state::DownloadState;
