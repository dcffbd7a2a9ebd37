//! Persisted "active model" preference.
//!
//! The active model is the user's selection for next use. It survives
//! restarts and is independent of whether the model is loaded. Changes are
//! broadcast on a [`tokio::sync::watch`] channel so the conversation layer
//! can react by loading the new model.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::Result;
use crate::storage;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ActiveModelRecord {
    #[serde(default)]
    active_model: Option<String>,
}

/// Handle to the active model record. Clones share state.
#[derive(Debug, Clone)]
pub struct ActiveModel {
    path: PathBuf,
    tx: Arc<watch::Sender<Option<String>>>,
    // Held across compare, persist and publish.
    write_lock: Arc<Mutex<()>>,
}

impl ActiveModel {
    /// Open the record at `path`. A missing or unreadable file means no
    /// active model.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let current = if path.exists() {
            match storage::read_json::<ActiveModelRecord>(&path) {
                Ok(record) => record.active_model,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "ignoring unreadable active model record");
                    None
                }
            }
        } else {
            None
        };
        let (tx, _rx) = watch::channel(current);
        Self {
            path,
            tx: Arc::new(tx),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Currently active model id.
    pub fn get(&self) -> Option<String> {
        self.tx.borrow().clone()
    }

    /// Persist and publish a new active model.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the record cannot be written. The
    /// in-memory value is left unchanged in that case.
    pub fn set(&self, model_id: Option<String>) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.store(model_id)
    }

    /// Make `model_id` active only if nothing is active yet.
    ///
    /// Returns whether the selection changed. The check and the write happen
    /// under one lock, so two concurrent callers cannot both win.
    ///
    /// # Errors
    ///
    /// Same as [`set`](Self::set).
    pub fn set_if_none(&self, model_id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        if self.tx.borrow().is_some() {
            return Ok(false);
        }
        self.store(Some(model_id.to_owned()))?;
        Ok(true)
    }

    fn store(&self, model_id: Option<String>) -> Result<()> {
        if *self.tx.borrow() == model_id {
            return Ok(());
        }
        storage::write_json_atomic(
            &self.path,
            &ActiveModelRecord {
                active_model: model_id.clone(),
            },
        )?;
        info!(active_model = ?model_id, "active model changed");
        self.tx.send_replace(model_id);
        Ok(())
    }

    /// Receiver that observes every change.
    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.tx.subscribe()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
