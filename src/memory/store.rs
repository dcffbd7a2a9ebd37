//! JSON-file memory store.
//!
//! All folders live in one file (`memory.json`). Every mutation is written
//! atomically before the call returns; the in-memory copy is only replaced
//! once the write succeeded.
//!
//! Mutations addressed at an unknown folder or block id do nothing and
//! return `Ok(false)` (or `Ok(None)`).

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use tracing::{debug, info, warn};

use super::types::{MemoryBlock, MemoryFolder};
use crate::error::Result;
use crate::storage;

/// Memory store handle. Clones share state.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    path: PathBuf,
    folders: Arc<RwLock<Vec<MemoryFolder>>>,
}

impl MemoryStore {
    /// Open the store at `path`. A missing file is an empty store; a corrupt
    /// one is moved aside to `<path>.corrupt` and the store starts empty.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if a corrupt file cannot be moved aside.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let folders = if path.exists() {
            match storage::read_json::<Vec<MemoryFolder>>(&path) {
                Ok(folders) => folders,
                Err(e) => {
                    let mut backup = path.clone().into_os_string();
                    backup.push(".corrupt");
                    warn!(path = %path.display(), error = %e, "memory file unreadable, moving aside");
                    std::fs::rename(&path, PathBuf::from(backup))?;
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };
        info!(path = %path.display(), folders = folders.len(), "memory store opened");
        Ok(Self {
            path,
            folders: Arc::new(RwLock::new(folders)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of all folders, in creation order.
    pub fn folders(&self) -> Vec<MemoryFolder> {
        self.folders
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn folder(&self, folder_id: &str) -> Option<MemoryFolder> {
        self.folders
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|f| f.id == folder_id)
            .cloned()
    }

    // -----------------------------------------------------------------------
    // Folders
    // -----------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns a storage error if the file cannot be written.
    pub fn create_folder(&self, name: &str, icon: &str, color: &str) -> Result<MemoryFolder> {
        let folder = MemoryFolder::new(name, icon, color);
        let created = folder.clone();
        self.mutate(move |folders| {
            folders.push(folder);
            Some(())
        })?;
        info!(folder = %created.id, name, "memory folder created");
        Ok(created)
    }

    /// Rename / restyle a folder.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the file cannot be written.
    pub fn update_folder(&self, folder_id: &str, name: &str, icon: &str, color: &str) -> Result<bool> {
        self.mutate(|folders| {
            let folder = folders.iter_mut().find(|f| f.id == folder_id)?;
            folder.name = name.to_owned();
            folder.icon = icon.to_owned();
            folder.color = color.to_owned();
            Some(())
        })
        .map(|r| r.is_some())
    }

    /// # Errors
    ///
    /// Returns a storage error if the file cannot be written.
    pub fn delete_folder(&self, folder_id: &str) -> Result<bool> {
        self.mutate(|folders| {
            let pos = folders.iter().position(|f| f.id == folder_id)?;
            folders.remove(pos);
            Some(())
        })
        .map(|r| r.is_some())
    }

    /// # Errors
    ///
    /// Returns a storage error if the file cannot be written.
    pub fn toggle_folder_enabled(&self, folder_id: &str) -> Result<bool> {
        self.mutate(|folders| {
            let folder = folders.iter_mut().find(|f| f.id == folder_id)?;
            folder.enabled = !folder.enabled;
            Some(())
        })
        .map(|r| r.is_some())
    }

    // -----------------------------------------------------------------------
    // Blocks
    // -----------------------------------------------------------------------

    /// Add a block to a folder. `Ok(None)` if the folder does not exist.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the file cannot be written.
    pub fn add_block(&self, folder_id: &str, title: &str, content: &str) -> Result<Option<MemoryBlock>> {
        self.mutate(|folders| {
            let folder = folders.iter_mut().find(|f| f.id == folder_id)?;
            let block = MemoryBlock::new(title, content);
            folder.blocks.push(block.clone());
            Some(block)
        })
    }

    /// # Errors
    ///
    /// Returns a storage error if the file cannot be written.
    pub fn update_block(&self, folder_id: &str, block_id: &str, title: &str, content: &str) -> Result<bool> {
        self.mutate(|folders| {
            let block = folders
                .iter_mut()
                .find(|f| f.id == folder_id)?
                .block_mut(block_id)?;
            block.title = title.to_owned();
            block.content = content.to_owned();
            block.updated_at = Utc::now();
            Some(())
        })
        .map(|r| r.is_some())
    }

    /// # Errors
    ///
    /// Returns a storage error if the file cannot be written.
    pub fn delete_block(&self, folder_id: &str, block_id: &str) -> Result<bool> {
        self.mutate(|folders| {
            let folder = folders.iter_mut().find(|f| f.id == folder_id)?;
            let pos = folder.blocks.iter().position(|b| b.id == block_id)?;
            folder.blocks.remove(pos);
            Some(())
        })
        .map(|r| r.is_some())
    }

    /// # Errors
    ///
    /// Returns a storage error if the file cannot be written.
    pub fn toggle_block_enabled(&self, folder_id: &str, block_id: &str) -> Result<bool> {
        self.mutate(|folders| {
            let block = folders
                .iter_mut()
                .find(|f| f.id == folder_id)?
                .block_mut(block_id)?;
            block.enabled = !block.enabled;
            block.updated_at = Utc::now();
            Some(())
        })
        .map(|r| r.is_some())
    }

    // -----------------------------------------------------------------------
    // Projections
    // -----------------------------------------------------------------------

    /// Prompt context built from every enabled block of every enabled folder.
    ///
    /// ```text
    /// ## Personal
    /// • Name: Alice
    /// • Diet: Vegetarian
    ///
    /// ## Work
    /// • Role: Engineer
    /// ```
    ///
    /// Folders without enabled blocks are left out; if none qualify the
    /// result is empty.
    pub fn formatted_context(&self) -> String {
        let folders = self.folders.read().unwrap_or_else(|e| e.into_inner());
        folders
            .iter()
            .filter_map(|folder| {
                let lines: Vec<String> = folder.enabled_blocks().map(MemoryBlock::context_line).collect();
                if lines.is_empty() {
                    None
                } else {
                    Some(format!("## {}\n{}", folder.name, lines.join("\n")))
                }
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Sum of token estimates over blocks that reach the prompt.
    pub fn total_enabled_tokens(&self) -> usize {
        let folders = self.folders.read().unwrap_or_else(|e| e.into_inner());
        folders
            .iter()
            .flat_map(MemoryFolder::enabled_blocks)
            .map(MemoryBlock::token_estimate)
            .sum()
    }

    /// Number of blocks that reach the prompt.
    pub fn enabled_block_count(&self) -> usize {
        let folders = self.folders.read().unwrap_or_else(|e| e.into_inner());
        folders
            .iter()
            .map(|f| f.enabled_blocks().count())
            .sum()
    }

    /// Apply `f` to a copy of the folders; persist and commit if it returns
    /// `Some`, leave everything untouched if it returns `None`.
    fn mutate<R>(&self, f: impl FnOnce(&mut Vec<MemoryFolder>) -> Option<R>) -> Result<Option<R>> {
        let mut guard = self.folders.write().unwrap_or_else(|e| e.into_inner());
        let mut next = guard.clone();
        let Some(result) = f(&mut next) else {
            debug!("memory mutation addressed an unknown id; ignored");
            return Ok(None);
        };
        storage::write_json_atomic(&self.path, &next)?;
        *guard = next;
        Ok(Some(result))
    }
}
