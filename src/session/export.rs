//! Plain-text transcript export.

use std::fmt::Write as _;

use super::title::PLACEHOLDER_TITLE;
use super::types::ChatSession;

/// Footer line closing every export.
pub const EXPORT_FOOTER: &str = "--- End of conversation ---";

/// Render a session as plain text.
///
/// The output depends only on the session contents, so exporting the same
/// session twice yields the same string. Times are rendered in UTC.
///
/// ```text
/// Chat: Trip planning
/// Created: 2024-05-01 10:00 UTC
///
/// [10:00] You:
/// Where should I go?
///
/// [10:01] Assistant:
/// Lisbon.
///
/// --- End of conversation ---
/// ```
pub fn export_as_text(session: &ChatSession) -> String {
    let mut out = String::new();
    let title = session.title.as_deref().unwrap_or(PLACEHOLDER_TITLE);
    let _ = writeln!(out, "Chat: {title}");
    let _ = writeln!(
        out,
        "Created: {}",
        session.created_at.format("%Y-%m-%d %H:%M UTC")
    );
    out.push('\n');

    for message in &session.messages {
        let _ = writeln!(
            out,
            "[{}] {}:",
            message.created_at.format("%H:%M"),
            message.role.label()
        );
        out.push_str(&message.content);
        out.push_str("\n\n");
    }

    out.push_str(EXPORT_FOOTER);
    out.push('\n');
    out
}
