//! Pure title/preview derivation from a message sequence.
//!
//! Both functions are deterministic and depend only on sequence order, so
//! they are recomputed on every save rather than cached anywhere that could
//! go stale.

use crate::models::{ChatMessage, MessageRole};

const TITLE_MAX_CHARS: usize = 50;
const PREVIEW_MAX_CHARS: usize = 60;

pub const DEFAULT_TITLE: &str = "New Chat";
pub const EMPTY_PREVIEW: &str = "No messages yet";
pub const NO_TEXT_PREVIEW: &str = "No text content";

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let mut out: String = text.chars().take(max_chars).collect();
        out.push_str("...");
        out
    } else {
        text.to_string()
    }
}

/// Title for a chat: text of the first user message, falling back to the
/// first message overall, falling back to `"New Chat"`.
pub fn derive_title(messages: &[ChatMessage]) -> String {
    let first_user = messages.iter().find(|m| m.role == MessageRole::User);
    for candidate in [first_user, messages.first()].into_iter().flatten() {
        let text = candidate.text_content();
        if !text.is_empty() {
            return truncate(&text, TITLE_MAX_CHARS);
        }
    }
    DEFAULT_TITLE.to_string()
}

/// Sidebar preview: text of the last message in the sequence.
pub fn derive_preview(messages: &[ChatMessage]) -> String {
    let Some(last) = messages.last() else {
        return EMPTY_PREVIEW.to_string();
    };
    let text = last.text_content();
    if text.is_empty() {
        NO_TEXT_PREVIEW.to_string()
    } else {
        truncate(&text, PREVIEW_MAX_CHARS)
    }
}
