//! Resume metadata kept next to a partial download.
//!
//! Layout for a model file `models/<file>`:
//!
//! ```text
//! models/<file>.partial       bytes received so far
//! models/<file>.resume.json   url + validators for If-Range
//! ```
//!
//! The byte offset is always the length of the `.partial` file; the JSON
//! record only says whether those bytes still belong to the same remote
//! object.

use std::path::{Path, PathBuf};

use reqwest::header::{ETAG, HeaderMap, LAST_MODIFIED};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage;

/// Persisted resume token for one model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeData {
    /// URL the partial bytes came from.
    pub url: String,
    /// Bytes on disk when the record was last written.
    #[serde(default)]
    pub bytes_written: u64,
    /// Full object size, if the server reported one.
    #[serde(default)]
    pub total_bytes: Option<u64>,
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub last_modified: Option<String>,
}

impl ResumeData {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Capture `ETag` / `Last-Modified` from a response. Weak ETags are not
    /// valid in `If-Range` and are skipped.
    pub fn record_validators(&mut self, headers: &HeaderMap) {
        self.etag = headers
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.starts_with("W/"))
            .map(str::to_owned);
        self.last_modified = headers
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
    }

    /// Value for the `If-Range` header, strongest validator first.
    pub fn if_range(&self) -> Option<&str> {
        self.etag.as_deref().or(self.last_modified.as_deref())
    }

    /// Load the record for `model_path`, if any.
    pub fn load(model_path: &Path) -> Option<Self> {
        let path = resume_path(model_path);
        if !path.exists() {
            return None;
        }
        storage::read_json(&path).ok()
    }

    /// Persist the record for `model_path`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the record cannot be written.
    pub fn save(&self, model_path: &Path) -> Result<()> {
        storage::write_json_atomic(&resume_path(model_path), self)
    }

    /// Remove both the record and the partial bytes for `model_path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if a file exists but cannot be removed.
    pub fn discard(model_path: &Path) -> Result<()> {
        storage::remove_if_exists(&partial_path(model_path))?;
        storage::remove_if_exists(&resume_path(model_path))
    }
}

/// `models/<file>.partial`
pub fn partial_path(model_path: &Path) -> PathBuf {
    with_suffix(model_path, ".partial")
}

/// `models/<file>.resume.json`
pub fn resume_path(model_path: &Path) -> PathBuf {
    with_suffix(model_path, ".resume.json")
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Bytes already on disk for `model_path`.
pub fn partial_len(model_path: &Path) -> u64 {
    std::fs::metadata(partial_path(model_path))
        .map(|m| m.len())
        .unwrap_or(0)
}

/// Total object size from a `Content-Range: bytes a-b/total` header.
pub fn content_range_total(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get(reqwest::header::CONTENT_RANGE)?.to_str().ok()?;
    let (_, total) = value.rsplit_once('/')?;
    total.trim().parse().ok()
}

/// First byte position from a `Content-Range: bytes a-b/total` header.
pub fn content_range_start(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get(reqwest::header::CONTENT_RANGE)?.to_str().ok()?;
    let range = value.trim().strip_prefix("bytes")?.trim_start();
    let (start, _) = range.split_once('-')?;
    start.trim().parse().ok()
}
