//! Automatic session titles derived from the first user message.

use super::types::ChatSession;

/// Title used before anything better is known.
pub const PLACEHOLDER_TITLE: &str = "New Chat";

/// Questions up to this many characters (including the `?`) are kept whole.
const QUESTION_MAX_CHARS: usize = 40;
/// Statements are cut to at most this many characters before the ellipsis.
const STATEMENT_MAX_CHARS: usize = 35;
const ELLIPSIS: &str = "...";

/// Whether a session with `message_count` messages should get a new title:
/// as soon as it has two messages and no title, then every four after that.
pub fn title_due(message_count: usize, has_title: bool) -> bool {
    if message_count < 2 {
        return false;
    }
    !has_title || (message_count > 2 && (message_count - 2) % 4 == 0)
}

/// Title for `session`, falling back to [`PLACEHOLDER_TITLE`].
pub fn derive_title(session: &ChatSession) -> String {
    session
        .first_user_message()
        .map(|m| title_from_text(&m.content))
        .unwrap_or_else(|| PLACEHOLDER_TITLE.to_owned())
}

/// Title for a single piece of user text.
pub fn title_from_text(text: &str) -> String {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.is_empty() {
        return PLACEHOLDER_TITLE.to_owned();
    }

    if let Some(q) = normalized.find('?') {
        let question = &normalized[..=q];
        if question.chars().count() <= QUESTION_MAX_CHARS {
            return question.to_owned();
        }
        return with_ellipsis(cut_on_word(question, QUESTION_MAX_CHARS));
    }

    if normalized.chars().count() <= STATEMENT_MAX_CHARS {
        return normalized;
    }
    with_ellipsis(cut_on_word(&normalized, STATEMENT_MAX_CHARS))
}

/// Longest prefix of at most `max` chars that ends on a word boundary.
/// A single word longer than `max` is hard-cut.
fn cut_on_word(text: &str, max: usize) -> &str {
    let end = text
        .char_indices()
        .nth(max)
        .map_or(text.len(), |(i, _)| i);
    let prefix = &text[..end];
    if text[end..].starts_with(' ') || end == text.len() {
        return prefix.trim_end();
    }
    match prefix.rfind(' ') {
        Some(space) if space > 0 => prefix[..space].trim_end(),
        _ => prefix,
    }
}

fn with_ellipsis(prefix: &str) -> String {
    let prefix = prefix.trim_end_matches(|c: char| c.is_ascii_punctuation() && c != '?');
    format!("{prefix}{ELLIPSIS}")
}
