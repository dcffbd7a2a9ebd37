//! Static registry of downloadable models.
//!
//! The catalog never changes at runtime. Download and load state live in
//! [`crate::download`] and [`crate::lifecycle`].

use serde::{Deserialize, Serialize};

/// Broad capability class shown in the model picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelCategory {
    /// Small, quick to load, lowest quality.
    Fast,
    /// Reasonable default on most phones.
    Balanced,
    /// Largest models the device can hold.
    Quality,
    /// Tuned for source code.
    Coding,
}

impl std::fmt::Display for ModelCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fast => write!(f, "fast"),
            Self::Balanced => write!(f, "balanced"),
            Self::Quality => write!(f, "quality"),
            Self::Coding => write!(f, "coding"),
        }
    }
}

/// Static information about a model available for download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Unique identifier, no spaces (e.g. `"qwen2.5-0.5b"`).
    pub id: String,
    /// Human-readable name.
    pub display_name: String,
    pub category: ModelCategory,
    /// Remote download URL.
    pub url: String,
    /// File name inside the models directory.
    pub file_name: String,
    /// Approximate download size in MB.
    pub size_mb: u64,
    /// Context window in tokens.
    pub context_length: u32,
    /// Approximate resident memory when loaded, in MB.
    pub ram_mb: u64,
    /// Optional SHA-256 of the file (lowercase hex).
    #[serde(default)]
    pub sha256: Option<String>,
}

/// Lookup table over model descriptors, keyed by identifier.
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: Vec<ModelDescriptor>,
}

impl Catalog {
    /// Build a catalog from explicit entries. Later duplicates of an id are dropped.
    pub fn new(entries: Vec<ModelDescriptor>) -> Self {
        let mut unique: Vec<ModelDescriptor> = Vec::with_capacity(entries.len());
        for entry in entries {
            if unique.iter().all(|e| e.id != entry.id) {
                unique.push(entry);
            }
        }
        Self { entries: unique }
    }

    /// The models bundled with the app.
    pub fn builtin() -> Self {
        Self::new(builtin_entries())
    }

    pub fn get(&self, id: &str) -> Option<&ModelDescriptor> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.entries.iter()
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn builtin_entries() -> Vec<ModelDescriptor> {
    vec![
        ModelDescriptor {
            id: "qwen2.5-0.5b".into(),
            display_name: "Qwen 2.5 0.5B".into(),
            category: ModelCategory::Fast,
            url: "https://huggingface.co/Qwen/Qwen2.5-0.5B-Instruct-GGUF/resolve/main/qwen2.5-0.5b-instruct-q4_k_m.gguf".into(),
            file_name: "qwen2.5-0.5b-instruct-q4_k_m.gguf".into(),
            size_mb: 491,
            context_length: 32_768,
            ram_mb: 800,
            sha256: None,
        },
        ModelDescriptor {
            id: "llama-3.2-1b".into(),
            display_name: "Llama 3.2 1B".into(),
            category: ModelCategory::Balanced,
            url: "https://huggingface.co/bartowski/Llama-3.2-1B-Instruct-GGUF/resolve/main/Llama-3.2-1B-Instruct-Q4_K_M.gguf".into(),
            file_name: "Llama-3.2-1B-Instruct-Q4_K_M.gguf".into(),
            size_mb: 808,
            context_length: 131_072,
            ram_mb: 1_400,
            sha256: None,
        },
        ModelDescriptor {
            id: "gemma-2-2b".into(),
            display_name: "Gemma 2 2B".into(),
            category: ModelCategory::Quality,
            url: "https://huggingface.co/bartowski/gemma-2-2b-it-GGUF/resolve/main/gemma-2-2b-it-Q4_K_M.gguf".into(),
            file_name: "gemma-2-2b-it-Q4_K_M.gguf".into(),
            size_mb: 1_710,
            context_length: 8_192,
            ram_mb: 2_600,
            sha256: None,
        },
        ModelDescriptor {
            id: "qwen2.5-coder-1.5b".into(),
            display_name: "Qwen 2.5 Coder 1.5B".into(),
            category: ModelCategory::Coding,
            url: "https://huggingface.co/Qwen/Qwen2.5-Coder-1.5B-Instruct-GGUF/resolve/main/qwen2.5-coder-1.5b-instruct-q4_k_m.gguf".into(),
            file_name: "qwen2.5-coder-1.5b-instruct-q4_k_m.gguf".into(),
            size_mb: 1_120,
            context_length: 32_768,
            ram_mb: 1_900,
            sha256: None,
        },
    ]
}
