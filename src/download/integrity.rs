//! SHA-256 verification of downloaded model files.
//!
//! Runs on the blocking pool; model files are several GB.

use sha2::{Digest, Sha256};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{MicaError, Result};

/// Outcome of a checksum comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Integrity {
    /// Digest matches the expected value.
    Verified,
    /// No expected digest was provided; nothing was read.
    Skipped,
    /// Digest differs.
    Mismatch { actual: String },
}

/// Compare `path` against an optional expected hex digest (case-insensitive).
///
/// # Errors
///
/// Returns an I/O error if the file cannot be read.
pub async fn verify(path: &Path, expected_sha256: Option<&str>) -> Result<Integrity> {
    let Some(expected) = expected_sha256.map(str::to_owned) else {
        return Ok(Integrity::Skipped);
    };
    let owned: PathBuf = path.to_path_buf();
    let actual = tokio::task::spawn_blocking(move || sha256_hex(&owned))
        .await
        .map_err(|e| MicaError::TransferFailure(format!("checksum task failed: {e}")))??;

    if actual.eq_ignore_ascii_case(&expected) {
        info!(path = %path.display(), "checksum ok");
        Ok(Integrity::Verified)
    } else {
        warn!(path = %path.display(), expected, actual = %actual, "checksum mismatch");
        Ok(Integrity::Mismatch { actual })
    }
}

/// SHA-256 hex digest of a file, read in 64 KiB chunks.
fn sha256_hex(path: &Path) -> io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 65_536];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Hex digest of an in-memory buffer.
pub fn digest_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
