//! Mica: the non-UI core of an on-device chat client.
//!
//! Inference is delegated to an opaque engine behind [`InferenceEngine`];
//! this crate owns everything around it:
//!
//! - **Catalog**: the models the app knows about
//! - **Downloads**: resumable, cancellable, checksummed model downloads
//! - **Lifecycle**: which model is active (persisted) vs loaded (volatile)
//! - **Sessions**: persisted chat transcripts with listing, search and export
//! - **Memory**: user-curated folders of facts injected into every prompt
//! - **Chat**: the orchestrator driving send → stream → persist
//!
//! [`App`] opens all of them from a [`MicaConfig`].

pub mod active_model;
pub mod app;
pub mod catalog;
pub mod chat;
pub mod config;
pub mod download;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod memory;
pub mod mica_dirs;
pub mod progress;
pub mod session;
pub mod storage;

pub use active_model::ActiveModel;
pub use app::App;
pub use catalog::{Catalog, ModelCategory, ModelDescriptor};
pub use chat::{ChatEvent, Orchestrator, StopHandle};
pub use config::MicaConfig;
pub use download::{DownloadManager, DownloadState};
pub use engine::{InferenceEngine, PromptMessage, ScriptedEngine, TokenStream};
pub use error::{MicaError, Result};
pub use lifecycle::{LoadState, ModelLifecycle};
pub use memory::{MemoryBlock, MemoryFolder, MemoryStore};
pub use progress::{ProgressCallback, ProgressEvent};
pub use session::{ChatMessage, ChatRole, ChatSession, SessionStore, SessionSummary};
