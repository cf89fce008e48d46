//! Flat-prompt conversation parsing
//!
//! Legacy completion endpoints hand us one flat prompt string. When the
//! prompt carries line-anchored speaker tags (`System:`, `User:`,
//! `Assistant:`) it is split back into role messages; otherwise the parse is
//! empty and callers fall back to a single user message.

use crate::message::{ChatMessage, ROLE_ASSISTANT, ROLE_SYSTEM, ROLE_USER};

const SPEAKER_TAGS: &[(&str, &str)] = &[
    ("System:", ROLE_SYSTEM),
    ("User:", ROLE_USER),
    ("Assistant:", ROLE_ASSISTANT),
];

/// Parse a flat prompt into a message list.
///
/// Returns an empty list when no speaker tag opens the conversation; content
/// before the first tag is ignored only if it is whitespace, otherwise the
/// whole prompt is treated as untagged.
pub fn parse_conversation(prompt: &str) -> Vec<ChatMessage> {
    let mut messages: Vec<ChatMessage> = Vec::new();
    let mut current: Option<(String, String)> = None;

    for line in prompt.lines() {
        let trimmed = line.trim_start();
        let tag = SPEAKER_TAGS
            .iter()
            .find(|(tag, _)| trimmed.starts_with(tag));

        match tag {
            Some((tag, role)) => {
                if let Some((role, content)) = current.take() {
                    messages.push(ChatMessage::new(role, content.trim().to_string()));
                }
                let rest = trimmed[tag.len()..].trim_start();
                current = Some((role.to_string(), rest.to_string()));
            }
            None => match current.as_mut() {
                Some((_, content)) => {
                    if !content.is_empty() {
                        content.push('\n');
                    }
                    content.push_str(line);
                }
                // Leading untagged content: only whitespace is tolerated,
                // anything else means the prompt is not in tagged form.
                None if trimmed.is_empty() => {}
                None => return Vec::new(),
            },
        }
    }

    if let Some((role, content)) = current.take() {
        messages.push(ChatMessage::new(role, content.trim().to_string()));
    }
    messages
}
