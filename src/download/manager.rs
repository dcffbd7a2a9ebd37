//! Resumable per-model downloads.
//!
//! Each `start_download` call drives one transfer as its own future. All
//! in-flight bookkeeping (state, cancellation token) is keyed by model id.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use futures_util::StreamExt;
use reqwest::StatusCode;
use reqwest::header::{IF_RANGE, RANGE};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::integrity::{self, Integrity};
use super::resume::{self, ResumeData};
use super::state::DownloadState;
use crate::active_model::ActiveModel;
use crate::catalog::{Catalog, ModelDescriptor};
use crate::config::DownloadConfig;
use crate::error::{MicaError, Result};
use crate::progress::{self, ProgressCallback, ProgressEvent};

/// Downloads model files into a models directory. Clones share state.
#[derive(Clone)]
pub struct DownloadManager {
    inner: Arc<Inner>,
}

struct Inner {
    catalog: Catalog,
    models_dir: PathBuf,
    client: reqwest::Client,
    verify_checksums: bool,
    active: ActiveModel,
    states: Mutex<HashMap<String, DownloadState>>,
    in_flight: Mutex<HashMap<String, CancellationToken>>,
    // Model currently resident in an engine; its file must stay on disk.
    loaded: Mutex<Option<String>>,
    progress: RwLock<Option<ProgressCallback>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl std::fmt::Debug for DownloadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadManager")
            .field("models_dir", &self.inner.models_dir)
            .field("states", &*lock(&self.inner.states))
            .finish_non_exhaustive()
    }
}

impl DownloadManager {
    /// Create a manager and rebuild per-model state from the files on disk.
    ///
    /// # Errors
    ///
    /// Returns [`MicaError::Config`] if the HTTP client cannot be built and
    /// an I/O error if the models directory cannot be created.
    pub fn new(
        catalog: Catalog,
        models_dir: impl Into<PathBuf>,
        active: ActiveModel,
        config: &DownloadConfig,
    ) -> Result<Self> {
        let models_dir = models_dir.into();
        std::fs::create_dir_all(&models_dir)?;

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| MicaError::Config(format!("failed to build HTTP client: {e}")))?;

        let states = catalog
            .iter()
            .map(|d| {
                let state = if models_dir.join(&d.file_name).is_file() {
                    DownloadState::Downloaded
                } else {
                    DownloadState::NotDownloaded
                };
                (d.id.clone(), state)
            })
            .collect::<HashMap<_, _>>();

        info!(models_dir = %models_dir.display(), models = states.len(), "download manager ready");

        Ok(Self {
            inner: Arc::new(Inner {
                catalog,
                models_dir,
                client,
                verify_checksums: config.verify_checksums,
                active,
                states: Mutex::new(states),
                in_flight: Mutex::new(HashMap::new()),
                loaded: Mutex::new(None),
                progress: RwLock::new(None),
            }),
        })
    }

    /// Register a callback for download progress events. Replaces any previous one.
    pub fn set_progress_callback(&self, callback: ProgressCallback) {
        let mut slot = self
            .inner
            .progress
            .write()
            .unwrap_or_else(|e| e.into_inner());
        *slot = Some(callback);
    }

    pub fn catalog(&self) -> &Catalog {
        &self.inner.catalog
    }

    pub fn models_dir(&self) -> &Path {
        &self.inner.models_dir
    }

    pub fn active_model(&self) -> &ActiveModel {
        &self.inner.active
    }

    /// Current state of `model_id`. Unknown ids report `NotDownloaded`.
    pub fn state(&self, model_id: &str) -> DownloadState {
        lock(&self.inner.states)
            .get(model_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Every catalog model with its state, in catalog order.
    pub fn states(&self) -> Vec<(String, DownloadState)> {
        let states = lock(&self.inner.states);
        self.inner
            .catalog
            .iter()
            .map(|d| (d.id.clone(), states.get(&d.id).cloned().unwrap_or_default()))
            .collect()
    }

    /// Permanent local path of a downloaded model.
    pub fn model_path(&self, model_id: &str) -> Option<PathBuf> {
        let descriptor = self.inner.catalog.get(model_id)?;
        let path = self.path_for(descriptor);
        (self.state(model_id).is_downloaded() && path.is_file()).then_some(path)
    }

    /// Bytes a resumed transfer would skip.
    pub fn resume_offset(&self, model_id: &str) -> u64 {
        self.inner
            .catalog
            .get(model_id)
            .map(|d| resume::partial_len(&self.path_for(d)))
            .unwrap_or(0)
    }

    /// Downloaded model ids, in catalog order.
    pub fn downloaded_models(&self) -> Vec<String> {
        self.states()
            .into_iter()
            .filter(|(_, s)| s.is_downloaded())
            .map(|(id, _)| id)
            .collect()
    }

    pub fn is_downloaded(&self, model_id: &str) -> bool {
        self.model_path(model_id).is_some()
    }

    /// Model an engine currently holds open, if any.
    pub fn loaded_model(&self) -> Option<String> {
        lock(&self.inner.loaded).clone()
    }

    /// Record which model an engine holds open. Set by the lifecycle.
    pub(crate) fn set_loaded(&self, model_id: Option<&str>) {
        *lock(&self.inner.loaded) = model_id.map(str::to_owned);
    }

    /// Download `model_id` and return its local path.
    ///
    /// Returns immediately if the file is already present. Resumes from a
    /// partial file when one exists for the same URL.
    ///
    /// # Errors
    ///
    /// - [`MicaError::ModelNotFound`] for ids not in the catalog
    /// - [`MicaError::AlreadyInProgress`] if this model is already downloading
    /// - [`MicaError::Cancelled`] if [`cancel_download`](Self::cancel_download) was called
    /// - [`MicaError::TransferFailure`] for network, disk or verification failures
    pub async fn start_download(&self, model_id: &str) -> Result<PathBuf> {
        let descriptor = self
            .inner
            .catalog
            .get(model_id)
            .cloned()
            .ok_or_else(|| MicaError::ModelNotFound(format!("unknown model '{model_id}'")))?;
        let final_path = self.path_for(&descriptor);

        let token = {
            let mut in_flight = lock(&self.inner.in_flight);
            if in_flight.contains_key(model_id) {
                warn!(model = model_id, "download already in progress");
                return Err(MicaError::AlreadyInProgress(format!(
                    "model '{model_id}' is already downloading"
                )));
            }
            if final_path.is_file() {
                drop(in_flight);
                self.set_state(model_id, DownloadState::Downloaded);
                self.adopt_as_active_if_none(model_id);
                return Ok(final_path);
            }
            let token = CancellationToken::new();
            in_flight.insert(model_id.to_owned(), token.clone());
            token
        };
        let _guard = InFlightGuard {
            manager: self,
            model_id,
        };

        self.set_state(model_id, DownloadState::Downloading { progress: 0.0 });
        info!(model = model_id, url = %descriptor.url, "starting download");

        match self.transfer(&descriptor, &final_path, &token).await {
            Ok(()) => {
                self.set_state(model_id, DownloadState::Downloaded);
                info!(model = model_id, path = %final_path.display(), "download complete");
                self.emit(ProgressEvent::DownloadComplete {
                    model_id: model_id.to_owned(),
                    path: final_path.clone(),
                });
                self.adopt_as_active_if_none(model_id);
                Ok(final_path)
            }
            Err(MicaError::Cancelled(msg)) => {
                self.set_state(model_id, DownloadState::NotDownloaded);
                let bytes_retained = resume::partial_len(&final_path);
                info!(model = model_id, bytes_retained, "download cancelled");
                self.emit(ProgressEvent::DownloadCancelled {
                    model_id: model_id.to_owned(),
                    bytes_retained,
                });
                Err(MicaError::Cancelled(msg))
            }
            Err(e) => {
                let reason = e.message();
                warn!(model = model_id, error = %e, "download failed");
                self.set_state(
                    model_id,
                    DownloadState::Failed {
                        reason: reason.clone(),
                    },
                );
                self.emit(ProgressEvent::DownloadFailed {
                    model_id: model_id.to_owned(),
                    message: reason.clone(),
                });
                match e {
                    MicaError::TransferFailure(_) => Err(e),
                    _ => Err(MicaError::TransferFailure(reason)),
                }
            }
        }
    }

    /// Request cooperative cancellation of an in-flight download.
    ///
    /// Partial bytes and resume metadata are kept. The state reads
    /// `NotDownloaded` immediately.
    ///
    /// # Errors
    ///
    /// Returns [`MicaError::NotFound`] if no download is running for `model_id`.
    pub fn cancel_download(&self, model_id: &str) -> Result<()> {
        let in_flight = lock(&self.inner.in_flight);
        let token = in_flight.get(model_id).ok_or_else(|| {
            MicaError::NotFound(format!("no active download for model '{model_id}'"))
        })?;
        token.cancel();
        drop(in_flight);
        self.set_state(model_id, DownloadState::NotDownloaded);
        info!(model = model_id, "cancellation requested");
        Ok(())
    }

    /// Remove the model file and any resume data.
    ///
    /// If the model was active, the first other downloaded model becomes
    /// active (or none).
    ///
    /// # Errors
    ///
    /// - [`MicaError::ModelNotFound`] for ids not in the catalog
    /// - [`MicaError::AlreadyInProgress`] while the model is downloading or
    ///   loaded; use [`ModelLifecycle::delete_model`](crate::lifecycle::ModelLifecycle::delete_model)
    ///   to unload and delete in one step
    pub fn delete_model(&self, model_id: &str) -> Result<()> {
        let descriptor =
            self.inner.catalog.get(model_id).ok_or_else(|| {
                MicaError::ModelNotFound(format!("unknown model '{model_id}'"))
            })?;
        if lock(&self.inner.in_flight).contains_key(model_id) {
            return Err(MicaError::AlreadyInProgress(format!(
                "cancel the download of '{model_id}' before deleting it"
            )));
        }
        if lock(&self.inner.loaded).as_deref() == Some(model_id) {
            warn!(model = model_id, "refusing to delete a loaded model");
            return Err(MicaError::AlreadyInProgress(format!(
                "unload '{model_id}' before deleting it"
            )));
        }

        let path = self.path_for(descriptor);
        crate::storage::remove_if_exists(&path)?;
        ResumeData::discard(&path)?;
        self.set_state(model_id, DownloadState::NotDownloaded);
        info!(model = model_id, "model deleted");

        if self.inner.active.get().as_deref() == Some(model_id) {
            let fallback = self.downloaded_models().into_iter().next();
            info!(model = model_id, fallback = ?fallback, "deleted model was active");
            self.inner.active.set(fallback)?;
        }
        Ok(())
    }

    fn path_for(&self, descriptor: &ModelDescriptor) -> PathBuf {
        self.inner.models_dir.join(&descriptor.file_name)
    }

    fn set_state(&self, model_id: &str, state: DownloadState) {
        lock(&self.inner.states).insert(model_id.to_owned(), state);
    }

    fn emit(&self, event: ProgressEvent) {
        let slot = self
            .inner
            .progress
            .read()
            .unwrap_or_else(|e| e.into_inner());
        if let Some(callback) = slot.as_ref() {
            callback(event);
        }
    }

    fn adopt_as_active_if_none(&self, model_id: &str) {
        if let Err(e) = self.inner.active.set_if_none(model_id) {
            warn!(model = model_id, error = %e, "failed to record active model");
        }
    }

    async fn transfer(
        &self,
        descriptor: &ModelDescriptor,
        final_path: &Path,
        token: &CancellationToken,
    ) -> Result<()> {
        let model_id = descriptor.id.as_str();
        let partial = resume::partial_path(final_path);

        // Partial bytes are only reusable if they came from the same URL.
        let previous = ResumeData::load(final_path);
        let mut offset = resume::partial_len(final_path);
        if offset > 0 && previous.as_ref().is_some_and(|r| r.url != descriptor.url) {
            info!(model = model_id, "catalog URL changed, discarding partial download");
            ResumeData::discard(final_path)?;
            offset = 0;
        }

        let (response, start) = loop {
            let mut request = self.inner.client.get(&descriptor.url);
            if offset > 0 {
                request = request.header(RANGE, format!("bytes={offset}-"));
                if let Some(validator) = previous.as_ref().and_then(|r| r.if_range()) {
                    request = request.header(IF_RANGE, validator);
                }
                info!(model = model_id, offset, "resuming download");
            }

            let response = tokio::select! {
                biased;
                () = token.cancelled() => {
                    return Err(MicaError::Cancelled(format!("download of '{model_id}' cancelled")));
                }
                sent = request.send() => sent.map_err(|e| {
                    MicaError::TransferFailure(format!("failed to start download: {e}"))
                })?,
            };

            let status = response.status();
            let start = match status {
                StatusCode::PARTIAL_CONTENT if offset > 0 => {
                    let range_start = resume::content_range_start(response.headers());
                    if range_start != Some(offset) {
                        // Appending would splice the wrong bytes onto the partial.
                        warn!(
                            model = model_id,
                            offset,
                            range_start = ?range_start,
                            "partial response does not start at the resume offset, restarting from zero"
                        );
                        ResumeData::discard(final_path)?;
                        offset = 0;
                        continue;
                    }
                    offset
                }
                s if s.is_success() => {
                    if offset > 0 {
                        info!(model = model_id, %status, "server ignored range, restarting from zero");
                    }
                    0
                }
                StatusCode::RANGE_NOT_SATISFIABLE => {
                    ResumeData::discard(final_path)?;
                    return Err(MicaError::TransferFailure(
                        "server rejected the resume range; partial data discarded".into(),
                    ));
                }
                s => {
                    return Err(MicaError::TransferFailure(format!(
                        "download failed with status: {s}"
                    )));
                }
            };
            break (response, start);
        };

        let total_bytes = if start > 0 {
            resume::content_range_total(response.headers())
                .or_else(|| response.content_length().map(|len| len + start))
        } else {
            response.content_length()
        };

        let mut record = ResumeData::new(descriptor.url.clone());
        record.record_validators(response.headers());
        record.total_bytes = total_bytes;
        record.bytes_written = start;
        record.save(final_path)?;

        let file = if start > 0 {
            tokio::fs::OpenOptions::new()
                .append(true)
                .open(&partial)
                .await
        } else {
            tokio::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&partial)
                .await
        }
        .map_err(|e| MicaError::TransferFailure(format!("failed to open partial file: {e}")))?;
        let mut file = tokio::io::BufWriter::new(file);

        self.emit(ProgressEvent::DownloadStarted {
            model_id: model_id.to_owned(),
            total_bytes,
            resumed_from: start,
        });

        let mut written = start;
        let mut stream = response.bytes_stream();
        loop {
            let next = tokio::select! {
                biased;
                () = token.cancelled() => None,
                chunk = stream.next() => Some(chunk),
            };
            let chunk = match next {
                None => {
                    let _ = file.flush().await;
                    record.bytes_written = written;
                    record.save(final_path)?;
                    return Err(MicaError::Cancelled(format!(
                        "download of '{model_id}' cancelled"
                    )));
                }
                Some(None) => break,
                Some(Some(Err(e))) => {
                    let _ = file.flush().await;
                    record.bytes_written = written;
                    record.save(final_path)?;
                    return Err(MicaError::TransferFailure(format!("download error: {e}")));
                }
                Some(Some(Ok(chunk))) => chunk,
            };

            if let Err(e) = file.write_all(&chunk).await {
                let _ = file.flush().await;
                record.bytes_written = written;
                record.save(final_path)?;
                return Err(MicaError::TransferFailure(format!("failed to write chunk: {e}")));
            }
            written += chunk.len() as u64;

            let fraction = progress::fraction(written, total_bytes).min(0.999_999);
            self.set_state(model_id, DownloadState::Downloading { progress: fraction });
            debug!(model = model_id, written, total = ?total_bytes, "chunk written");
            self.emit(ProgressEvent::DownloadProgress {
                model_id: model_id.to_owned(),
                bytes_downloaded: written,
                total_bytes,
                fraction,
            });
        }

        file.flush()
            .await
            .map_err(|e| MicaError::TransferFailure(format!("failed to flush file: {e}")))?;
        file.get_ref()
            .sync_all()
            .await
            .map_err(|e| MicaError::TransferFailure(format!("failed to sync file: {e}")))?;
        drop(file);

        if let Some(expected) = total_bytes {
            if written < expected {
                record.bytes_written = written;
                record.save(final_path)?;
                return Err(MicaError::TransferFailure(format!(
                    "connection closed after {written} of {expected} bytes"
                )));
            }
            if written > expected {
                ResumeData::discard(final_path)?;
                return Err(MicaError::TransferFailure(format!(
                    "size mismatch: expected {expected} bytes, got {written}"
                )));
            }
        }

        let expected_sha = if self.inner.verify_checksums {
            descriptor.sha256.as_deref()
        } else {
            None
        };
        if let Integrity::Mismatch { actual } = integrity::verify(&partial, expected_sha).await? {
            ResumeData::discard(final_path)?;
            return Err(MicaError::TransferFailure(format!(
                "checksum mismatch for '{model_id}': got {actual}"
            )));
        }

        // Replaces any existing file in one step.
        tokio::fs::rename(&partial, final_path)
            .await
            .map_err(|e| MicaError::TransferFailure(format!("failed to move file into place: {e}")))?;
        crate::storage::remove_if_exists(&resume::resume_path(final_path))?;

        self.set_state(model_id, DownloadState::Downloading { progress: 1.0 });
        self.emit(ProgressEvent::DownloadProgress {
            model_id: model_id.to_owned(),
            bytes_downloaded: written,
            total_bytes: Some(written),
            fraction: 1.0,
        });
        Ok(())
    }
}

/// Releases the in-flight slot when a transfer future finishes or is dropped.
struct InFlightGuard<'a> {
    manager: &'a DownloadManager,
    model_id: &'a str,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        lock(&self.manager.inner.in_flight).remove(self.model_id);
        let mut states = lock(&self.manager.inner.states);
        if let Some(state) = states.get_mut(self.model_id)
            && state.is_downloading()
        {
            *state = DownloadState::NotDownloaded;
        }
    }
}
