//! Configuration types for the mica core.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{MicaError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MicaConfig {
    /// Where sessions, memory, preferences and models live.
    pub storage: StorageConfig,
    /// Model download behaviour.
    pub downloads: DownloadConfig,
    /// Conversation behaviour.
    pub chat: ChatConfig,
}

/// Storage locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for all persisted data.
    pub data_dir: PathBuf,
    /// Model file directory (None = `<data_dir>/models`).
    pub models_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: crate::mica_dirs::data_dir(),
            models_dir: None,
        }
    }
}

impl StorageConfig {
    /// Effective model directory.
    #[must_use]
    pub fn models_dir(&self) -> PathBuf {
        self.models_dir
            .clone()
            .unwrap_or_else(|| crate::mica_dirs::models_dir(&self.data_dir))
    }
}

/// Model download settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Verify SHA-256 checksums after download when the catalog has one.
    pub verify_checksums: bool,
    /// User-Agent header sent with model downloads.
    pub user_agent: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            verify_checksums: true,
            user_agent: format!("mica/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Conversation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Assistant persona placed in the system message of every prompt.
    pub persona: String,
    /// Minimum spacing between two generation starts, in milliseconds.
    pub min_generation_interval_ms: u64,
    /// Delay after the last mutation before the current session is written.
    pub save_debounce_ms: u64,
}

/// Default assistant persona.
pub const DEFAULT_PERSONA: &str = "You are a helpful, concise assistant running entirely on \
this device. Answer clearly and admit when you are unsure.";

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            persona: DEFAULT_PERSONA.to_owned(),
            min_generation_interval_ms: 1_000,
            save_debounce_ms: 1_000,
        }
    }
}

impl MicaConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| MicaError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| MicaError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> PathBuf {
        crate::mica_dirs::config_file()
    }

    /// A config rooted at `data_dir`, everything else default.
    #[must_use]
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageConfig {
                data_dir: data_dir.into(),
                models_dir: None,
            },
            ..Self::default()
        }
    }
}
