//! Chat sessions: data model, persistence, titles and export.

mod export;
mod store;
pub mod title;
mod types;

pub use export::{EXPORT_FOOTER, export_as_text};
pub use store::SessionStore;
pub use title::{PLACEHOLDER_TITLE, derive_title, title_due};
pub use types::{ChatMessage, ChatRole, ChatSession, SESSION_SCHEMA_VERSION, SessionSummary};
