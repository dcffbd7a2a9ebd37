//! Composition root: opens every store from a [`MicaConfig`] and wires them
//! together. Nothing in the crate is global; a front-end holds one [`App`].

use std::sync::Arc;

use tracing::{info, warn};

use crate::active_model::ActiveModel;
use crate::catalog::Catalog;
use crate::chat::Orchestrator;
use crate::config::MicaConfig;
use crate::download::DownloadManager;
use crate::engine::InferenceEngine;
use crate::error::Result;
use crate::lifecycle::ModelLifecycle;
use crate::memory::MemoryStore;
use crate::mica_dirs;
use crate::session::SessionStore;

/// The opened services. Cheap to clone; clones share state.
#[derive(Debug, Clone)]
pub struct App {
    config: MicaConfig,
    active: ActiveModel,
    downloads: DownloadManager,
    sessions: SessionStore,
    memory: MemoryStore,
}

impl App {
    /// Open everything under the configured data directory with the
    /// built-in catalog.
    ///
    /// # Errors
    ///
    /// Returns a storage or I/O error if a directory cannot be created or the
    /// memory file cannot be read.
    pub fn open(config: MicaConfig) -> Result<Self> {
        Self::with_catalog(config, Catalog::builtin())
    }

    /// Like [`open`](Self::open) with an explicit catalog.
    ///
    /// # Errors
    ///
    /// See [`open`](Self::open).
    pub fn with_catalog(config: MicaConfig, catalog: Catalog) -> Result<Self> {
        let root = config.storage.data_dir.clone();
        std::fs::create_dir_all(&root)?;

        let active = ActiveModel::open(mica_dirs::active_model_file(&root));
        let downloads = DownloadManager::new(
            catalog,
            config.storage.models_dir(),
            active.clone(),
            &config.downloads,
        )?;

        // A selection whose file disappeared cannot be loaded.
        if let Some(id) = active.get()
            && !downloads.is_downloaded(&id)
        {
            let fallback = downloads.downloaded_models().into_iter().next();
            warn!(model = %id, fallback = ?fallback, "active model is not downloaded");
            active.set(fallback)?;
        }

        let sessions = SessionStore::open(mica_dirs::sessions_dir(&root))?;
        let memory = MemoryStore::open(mica_dirs::memory_file(&root))?;
        info!(data_dir = %root.display(), "mica opened");

        Ok(Self {
            config,
            active,
            downloads,
            sessions,
            memory,
        })
    }

    pub fn config(&self) -> &MicaConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        self.downloads.catalog()
    }

    pub fn active_model(&self) -> &ActiveModel {
        &self.active
    }

    pub fn downloads(&self) -> &DownloadManager {
        &self.downloads
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    /// A lifecycle controller over `engine`. Nothing is loaded yet.
    pub fn lifecycle(&self, engine: Arc<dyn InferenceEngine>) -> ModelLifecycle {
        ModelLifecycle::new(engine, self.downloads.clone())
    }

    /// A conversation orchestrator over `engine`, starting on a blank session.
    ///
    /// Call [`Orchestrator::sync_active_model`] to load the active model.
    pub fn orchestrator(&self, engine: Arc<dyn InferenceEngine>) -> Orchestrator {
        Orchestrator::new(
            self.sessions.clone(),
            self.memory.clone(),
            self.lifecycle(engine),
            self.active.clone(),
            &self.config.chat,
        )
    }
}
