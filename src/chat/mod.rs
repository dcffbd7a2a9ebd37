//! Conversation orchestration: send, stream, stop, regenerate, persist.
//!
//! [`Orchestrator`] owns the active [`ChatSession`](crate::session::ChatSession)
//! and coordinates the model lifecycle, the session store and the memory
//! store. Streaming progress is published as [`ChatEvent`]s.

mod debounce;
mod orchestrator;
mod throttle;

pub use debounce::SaveDebouncer;
pub use orchestrator::{ChatEvent, MEMORY_CONTEXT_PREFIX, Orchestrator, StopHandle};
pub use throttle::GenerationThrottle;
