//! Coalescing session saves.
//!
//! Every [`SaveDebouncer::schedule`] aborts the pending write and starts a
//! new timer; only the last snapshot within the window reaches disk.

use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Result;
use crate::session::{ChatSession, SessionStore};

/// Delayed, coalescing writer for the current session.
#[derive(Debug)]
pub struct SaveDebouncer {
    store: SessionStore,
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl SaveDebouncer {
    pub fn new(store: SessionStore, delay: Duration) -> Self {
        Self {
            store,
            delay,
            pending: Mutex::new(None),
        }
    }

    /// Save `session` after the delay unless another schedule comes first.
    /// Empty sessions are never written.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn schedule(&self, session: &ChatSession) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = pending.take() {
            handle.abort();
        }
        if session.is_empty() {
            return;
        }

        let store = self.store.clone();
        let snapshot = session.clone();
        let delay = self.delay;
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match store.save(&snapshot) {
                Ok(()) => debug!(session = %snapshot.id, "debounced save"),
                Err(e) => warn!(session = %snapshot.id, error = %e, "debounced save failed"),
            }
        }));
    }

    /// Drop any pending write.
    pub fn cancel(&self) {
        if let Some(handle) = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
        }
    }

    /// Write `session` now (if non-empty), replacing any pending write.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the write fails.
    pub fn flush(&self, session: &ChatSession) -> Result<()> {
        self.cancel();
        if session.is_empty() {
            return Ok(());
        }
        self.store.save(session)
    }

    /// True while a write is scheduled and has not run yet.
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}
