//! Filesystem-backed session store.
//!
//! Each session is stored as `{dir}/{session_id}.json`. Writes are atomic
//! (temp file + fsync + rename). An in-memory index of summaries, sorted by
//! `updated_at` descending, is rebuilt from the directory on open.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::{debug, info, warn};

use super::types::{ChatSession, SessionSummary};
use crate::error::{MicaError, Result};
use crate::storage;

/// Session store handle. Clones share the index.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
    index: Arc<RwLock<Vec<SessionSummary>>>,
}

impl SessionStore {
    /// Open (or create) the store at `dir` and index existing sessions.
    ///
    /// Unreadable or corrupt files are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`MicaError::Storage`] if the directory cannot be created or listed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            MicaError::Storage(format!(
                "failed to create session directory {}: {e}",
                dir.display()
            ))
        })?;

        let entries = std::fs::read_dir(&dir).map_err(|e| {
            MicaError::Storage(format!(
                "failed to read session directory {}: {e}",
                dir.display()
            ))
        })?;

        let mut index = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            // Skip temp files
            if path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| name.starts_with('.'))
            {
                continue;
            }
            match storage::read_json::<ChatSession>(&path) {
                Ok(session) => index.push(session.summary()),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable session"),
            }
        }
        sort_index(&mut index);
        info!(dir = %dir.display(), sessions = index.len(), "session store opened");

        Ok(Self {
            dir,
            index: Arc::new(RwLock::new(index)),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Insert or replace a session.
    ///
    /// # Errors
    ///
    /// Returns [`MicaError::Storage`] if the file cannot be written.
    pub fn save(&self, session: &ChatSession) -> Result<()> {
        let path = self.session_path(&session.id).ok_or_else(|| {
            MicaError::Storage(format!("invalid session id '{}'", session.id))
        })?;
        storage::write_json_atomic(&path, session)?;

        let mut index = self.index.write().unwrap_or_else(|e| e.into_inner());
        index.retain(|s| s.id != session.id);
        index.push(session.summary());
        sort_index(&mut index);
        debug!(session = %session.id, messages = session.len(), "session saved");
        Ok(())
    }

    /// Load a session. Missing and corrupt records both read as `None`.
    pub fn load(&self, id: &str) -> Option<ChatSession> {
        let path = self.session_path(id)?;
        if !path.exists() {
            return None;
        }
        match storage::read_json(&path) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(session = id, error = %e, "treating corrupt session as missing");
                None
            }
        }
    }

    /// Delete a session. Deleting an unknown id is not an error.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file exists but cannot be removed.
    pub fn delete(&self, id: &str) -> Result<()> {
        if let Some(path) = self.session_path(id) {
            storage::remove_if_exists(&path)?;
        }
        self.index
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|s| s.id != id);
        info!(session = id, "session deleted");
        Ok(())
    }

    /// Session summaries, most recently updated first.
    pub fn list(&self) -> Vec<SessionSummary> {
        self.index
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn count(&self) -> usize {
        self.index.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Sessions whose title or any message contains `query`
    /// (case-insensitive), most recent first. A blank query lists everything.
    pub fn search(&self, query: &str) -> Vec<SessionSummary> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return self.list();
        }
        self.list()
            .into_iter()
            .filter(|summary| {
                if summary
                    .title
                    .as_deref()
                    .is_some_and(|t| t.to_lowercase().contains(&needle))
                {
                    return true;
                }
                self.load(&summary.id).is_some_and(|session| {
                    session
                        .messages
                        .iter()
                        .any(|m| m.content.to_lowercase().contains(&needle))
                })
            })
            .collect()
    }

    /// Set a session's title.
    ///
    /// # Errors
    ///
    /// Returns [`MicaError::NotFound`] if the session does not exist.
    pub fn rename(&self, id: &str, title: &str) -> Result<ChatSession> {
        let mut session = self
            .load(id)
            .ok_or_else(|| MicaError::NotFound(format!("session '{id}' not found")))?;
        session.set_title(title.trim());
        self.save(&session)?;
        Ok(session)
    }

    /// Path for `id`, or `None` if the id could escape the directory.
    fn session_path(&self, id: &str) -> Option<PathBuf> {
        let valid = !id.is_empty()
            && !id.starts_with('.')
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        valid.then(|| self.dir.join(format!("{id}.json")))
    }
}

fn sort_index(index: &mut [SessionSummary]) {
    index.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
}
