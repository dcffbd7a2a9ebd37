//! Model lifecycle: which model is resident in the inference engine.
//!
//! The *active* model (user's selection) lives in
//! [`ActiveModel`](crate::active_model::ActiveModel); this controller only
//! tracks the *loaded* model. Selecting a model never loads it; the
//! conversation layer decides when to call [`ModelLifecycle::load_model`].

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::catalog::ModelDescriptor;
use crate::download::DownloadManager;
use crate::engine::InferenceEngine;
use crate::error::{MicaError, Result};
use crate::progress::{ProgressCallback, ProgressEvent};

/// Engine load state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LoadState {
    #[default]
    Uninitialized,
    Loading,
    Ready,
    Error(String),
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Loading => write!(f, "loading"),
            Self::Ready => write!(f, "ready"),
            Self::Error(reason) => write!(f, "error: {reason}"),
        }
    }
}

/// Mediates load/unload against an [`InferenceEngine`].
pub struct ModelLifecycle {
    engine: Arc<dyn InferenceEngine>,
    downloads: DownloadManager,
    state: LoadState,
    loaded_model: Option<String>,
    progress: Option<ProgressCallback>,
}

impl ModelLifecycle {
    pub fn new(engine: Arc<dyn InferenceEngine>, downloads: DownloadManager) -> Self {
        Self {
            engine,
            downloads,
            state: LoadState::Uninitialized,
            loaded_model: None,
            progress: None,
        }
    }

    /// Receive `LoadStarted` / `LoadComplete` events.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn loaded_model(&self) -> Option<&str> {
        self.loaded_model.as_deref()
    }

    /// Catalog entry of the loaded model.
    pub fn loaded_descriptor(&self) -> Option<&ModelDescriptor> {
        self.loaded_model
            .as_deref()
            .and_then(|id| self.downloads.catalog().get(id))
    }

    /// Ready to generate: state is `Ready`, the engine agrees and the
    /// loaded model is still downloaded.
    pub fn is_ready(&self) -> bool {
        self.state == LoadState::Ready
            && self.engine.is_ready()
            && self
                .loaded_model
                .as_deref()
                .is_some_and(|id| self.downloads.state(id).is_downloaded())
    }

    pub fn engine(&self) -> &Arc<dyn InferenceEngine> {
        &self.engine
    }

    pub fn downloads(&self) -> &DownloadManager {
        &self.downloads
    }

    /// Load `model_id` into the engine, unloading whatever was there.
    ///
    /// No-op if the model is already loaded and the engine reports ready.
    ///
    /// # Errors
    ///
    /// - [`MicaError::ModelNotFound`] if the model is not downloaded
    /// - [`MicaError::ModelInitializationFailed`] if the engine rejects it;
    ///   the state becomes [`LoadState::Error`] and nothing is loaded
    pub async fn load_model(&mut self, model_id: &str) -> Result<()> {
        let path = self.downloads.model_path(model_id).ok_or_else(|| {
            MicaError::ModelNotFound(format!("model '{model_id}' is not downloaded"))
        })?;

        if self.loaded_model.as_deref() == Some(model_id) && self.is_ready() {
            return Ok(());
        }

        self.state = LoadState::Loading;
        self.emit(ProgressEvent::LoadStarted {
            model_id: model_id.to_owned(),
        });
        if let Some(previous) = self.loaded_model.take() {
            info!(model = %previous, "unloading previous model");
            self.engine.unload().await;
            self.downloads.set_loaded(None);
        }

        let started = Instant::now();
        match self.engine.load(&path).await {
            Ok(()) => {
                let duration_secs = started.elapsed().as_secs_f64();
                info!(model = model_id, duration_secs, "model loaded");
                self.loaded_model = Some(model_id.to_owned());
                self.downloads.set_loaded(Some(model_id));
                self.state = LoadState::Ready;
                self.emit(ProgressEvent::LoadComplete {
                    model_id: model_id.to_owned(),
                    duration_secs,
                });
                Ok(())
            }
            Err(e) => {
                let reason = e.message();
                warn!(model = model_id, error = %e, "model failed to load");
                self.state = LoadState::Error(reason.clone());
                Err(MicaError::ModelInitializationFailed(reason))
            }
        }
    }

    /// Unload whatever is loaded. Always succeeds.
    pub async fn unload_model(&mut self) {
        if let Some(previous) = self.loaded_model.take() {
            info!(model = %previous, "unloading model");
            self.engine.unload().await;
            self.downloads.set_loaded(None);
        }
        self.state = LoadState::Uninitialized;
    }

    /// Delete a model's files, unloading it first if it is resident.
    ///
    /// # Errors
    ///
    /// Propagates [`DownloadManager::delete_model`] errors.
    pub async fn delete_model(&mut self, model_id: &str) -> Result<()> {
        if self.loaded_model.as_deref() == Some(model_id) {
            self.unload_model().await;
        }
        self.downloads.delete_model(model_id)
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(callback) = &self.progress {
            callback(event);
        }
    }
}

impl fmt::Debug for ModelLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelLifecycle")
            .field("state", &self.state)
            .field("loaded_model", &self.loaded_model)
            .finish_non_exhaustive()
    }
}
