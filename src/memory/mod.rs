//! User memory: folders of context blocks injected into every prompt.

mod store;
mod types;

pub use store::MemoryStore;
pub use types::{MemoryBlock, MemoryFolder};
