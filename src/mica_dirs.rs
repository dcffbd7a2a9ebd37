//! Centralized application directory paths for mica.
//!
//! Uses the [`dirs`] crate for platform-appropriate directory resolution.
//!
//! # Directory Layout
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | App data | `~/Library/Application Support/mica/` | `~/.local/share/mica/` |
//! | Config | `~/Library/Application Support/mica/` | `~/.config/mica/` |
//!
//! Inside the data directory:
//!
//! ```text
//! sessions/<session-id>.json
//! memory.json
//! active_model.json
//! models/<file_name>            (+ .partial / .resume.json while downloading)
//! ```
//!
//! # Environment Overrides
//!
//! - `MICA_DATA_DIR` overrides [`data_dir`]
//! - `MICA_CONFIG_DIR` overrides [`config_dir`]

use std::path::{Path, PathBuf};

/// Application data root directory.
///
/// Resolves to `dirs::data_dir()/mica/` by default. Override with
/// the `MICA_DATA_DIR` environment variable.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("MICA_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("mica"))
        .unwrap_or_else(|| PathBuf::from("/tmp/mica-data"))
}

/// Application config directory.
///
/// Resolves to `dirs::config_dir()/mica/` by default. Override with
/// the `MICA_CONFIG_DIR` environment variable.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("MICA_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("mica"))
        .unwrap_or_else(|| PathBuf::from("/tmp/mica-config"))
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Chat session directory under a data root.
#[must_use]
pub fn sessions_dir(root: &Path) -> PathBuf {
    root.join("sessions")
}

/// Memory folders file under a data root.
#[must_use]
pub fn memory_file(root: &Path) -> PathBuf {
    root.join("memory.json")
}

/// Active model record under a data root.
#[must_use]
pub fn active_model_file(root: &Path) -> PathBuf {
    root.join("active_model.json")
}

/// Downloaded model files under a data root.
#[must_use]
pub fn models_dir(root: &Path) -> PathBuf {
    root.join("models")
}
