//! Memory folders and blocks: reusable user context injected into prompts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Blocks
// ---------------------------------------------------------------------------

/// A single titled snippet of user context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryBlock {
    pub id: String,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

impl MemoryBlock {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            content: content.into(),
            created_at: now,
            updated_at: now,
            enabled: true,
        }
    }

    /// Approximate prompt cost: one token per four characters.
    pub fn token_estimate(&self) -> usize {
        (self.title.chars().count() + self.content.chars().count()) / 4
    }

    /// The line this block contributes to the prompt context.
    pub fn context_line(&self) -> String {
        format!("• {}: {}", self.title, self.content)
    }
}

// ---------------------------------------------------------------------------
// Folders
// ---------------------------------------------------------------------------

/// A named group of blocks. A disabled folder hides all of its blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryFolder {
    pub id: String,
    pub name: String,
    /// Symbol name or emoji shown next to the folder.
    #[serde(default)]
    pub icon: String,
    /// Display color (e.g. `"#4F8EF7"` or a named color).
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub blocks: Vec<MemoryBlock>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

impl MemoryFolder {
    pub fn new(name: impl Into<String>, icon: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            icon: icon.into(),
            color: color.into(),
            blocks: Vec::new(),
            enabled: true,
        }
    }

    /// Blocks that reach the prompt: none if the folder is disabled,
    /// otherwise the individually enabled ones.
    pub fn enabled_blocks(&self) -> impl Iterator<Item = &MemoryBlock> {
        let folder_enabled = self.enabled;
        self.blocks
            .iter()
            .filter(move |b| folder_enabled && b.enabled)
    }

    pub fn block(&self, block_id: &str) -> Option<&MemoryBlock> {
        self.blocks.iter().find(|b| b.id == block_id)
    }

    pub(crate) fn block_mut(&mut self, block_id: &str) -> Option<&mut MemoryBlock> {
        self.blocks.iter_mut().find(|b| b.id == block_id)
    }
}

fn enabled_by_default() -> bool {
    true
}
