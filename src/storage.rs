//! Small JSON file helpers shared by the persistent stores.
//!
//! Writes are atomic (temp file + fsync + rename) so a crash never leaves a
//! half-written record behind.

use std::io::Write as _;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{MicaError, Result};

/// Serialize `value` as pretty JSON and atomically replace `path`.
///
/// # Errors
///
/// Returns [`MicaError::Storage`] if serialization fails or the temp file
/// cannot be written, synced or renamed into place.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| MicaError::Storage(format!("failed to serialize {}: {e}", path.display())))?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| {
        MicaError::Storage(format!("failed to create directory {}: {e}", dir.display()))
    })?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "record".to_owned());
    // Unique per call so concurrent writers never share a temp file.
    let tmp_path = dir.join(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4()));

    if let Err(e) = write_synced(&tmp_path, json.as_bytes()) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e);
    }

    std::fs::rename(&tmp_path, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp_path);
        MicaError::Storage(format!(
            "failed to rename temp file to {}: {e}",
            path.display()
        ))
    })
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<()> {
    let storage_err = |action: &str, e: std::io::Error| {
        MicaError::Storage(format!("failed to {action} temp file {}: {e}", path.display()))
    };
    let mut file = std::fs::File::create(path).map_err(|e| storage_err("create", e))?;
    file.write_all(bytes).map_err(|e| storage_err("write", e))?;
    file.sync_all().map_err(|e| storage_err("sync", e))
}

/// Read and parse a JSON file.
///
/// # Errors
///
/// Returns [`MicaError::Io`] if the file cannot be read and
/// [`MicaError::Storage`] if it does not parse.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| MicaError::Storage(format!("failed to parse {}: {e}", path.display())))
}

/// Remove a file, treating "already gone" as success.
///
/// # Errors
///
/// Returns [`MicaError::Io`] for any other failure.
pub fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
