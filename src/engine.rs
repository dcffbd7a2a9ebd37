//! The on-device inference capability.
//!
//! The actual engine (llama.cpp bindings, MLC, a platform framework) lives
//! outside this crate. Everything here talks to it through
//! [`InferenceEngine`].

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::Stream;

use crate::error::{MicaError, Result};
use crate::session::ChatRole;

/// One message of a prompt, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptMessage {
    pub role: ChatRole,
    pub content: String,
}

impl PromptMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// A boxed stream of generated text fragments.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Opaque on-device inference capability.
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// Load a model file. Replaces nothing; callers unload first.
    async fn load(&self, path: &Path) -> Result<()>;

    /// Release the loaded model.
    async fn unload(&self);

    /// Start generating a reply to `messages`.
    async fn generate(&self, messages: &[PromptMessage]) -> Result<TokenStream>;

    /// Ask an in-flight generation to stop after the current token.
    fn cancel(&self);

    /// True once a model is loaded and can generate.
    fn is_ready(&self) -> bool;
}

/// Deterministic engine that replays scripted replies token by token.
///
/// Useful for tests and for exercising a front-end without model weights.
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    replies: Mutex<VecDeque<Vec<String>>>,
    prompts: Mutex<Vec<Vec<PromptMessage>>>,
    loaded: Mutex<Option<PathBuf>>,
    load_count: Mutex<usize>,
    fail_load: AtomicBool,
    cancelled: Arc<AtomicBool>,
    token_delay: Duration,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pause between tokens, so a test can stop mid-stream.
    #[must_use]
    pub fn with_token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = delay;
        self
    }

    /// Queue a reply; each string is emitted as one token.
    pub fn push_reply<I, S>(&self, tokens: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(tokens.into_iter().map(Into::into).collect());
    }

    /// Make the next loads fail.
    pub fn fail_loads(&self, fail: bool) {
        self.fail_load.store(fail, Ordering::SeqCst);
    }

    /// Every prompt received so far.
    pub fn prompts(&self) -> Vec<Vec<PromptMessage>> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn loaded_path(&self) -> Option<PathBuf> {
        self.loaded.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of successful loads.
    pub fn load_count(&self) -> usize {
        *self.load_count.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl InferenceEngine for ScriptedEngine {
    async fn load(&self, path: &Path) -> Result<()> {
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(MicaError::ModelInitializationFailed(format!(
                "cannot initialise {}",
                path.display()
            )));
        }
        *self.loaded.lock().unwrap_or_else(|e| e.into_inner()) = Some(path.to_path_buf());
        *self.load_count.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(())
    }

    async fn unload(&self) {
        *self.loaded.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    async fn generate(&self, messages: &[PromptMessage]) -> Result<TokenStream> {
        if !self.is_ready() {
            return Err(MicaError::ModelNotReady("no model loaded".into()));
        }
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(messages.to_vec());
        let tokens = self
            .replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_default();

        self.cancelled.store(false, Ordering::SeqCst);
        let cancelled = Arc::clone(&self.cancelled);
        let delay = self.token_delay;
        let stream = futures_util::stream::unfold(
            tokens.into_iter(),
            move |mut tokens| {
                let cancelled = Arc::clone(&cancelled);
                async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    if cancelled.load(Ordering::SeqCst) {
                        return None;
                    }
                    tokens.next().map(|t| (Ok::<_, MicaError>(t), tokens))
                }
            },
        );
        Ok(Box::pin(stream))
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn is_ready(&self) -> bool {
        self.loaded
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}
