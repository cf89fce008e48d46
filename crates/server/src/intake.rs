//! Request intake normalization
//!
//! Everything between "JSON body parsed" and "messages handed to the
//! workflow engine": model-field override extraction, tool-probe detection,
//! user/assistant marker policies, and the lifting of image payloads into
//! pseudo-role messages.

use serde::Deserialize;
use serde_json::Value;

use llm_gateway_config::{ConfigStore, UserConfig};
use llm_gateway_core::{parse_conversation, ChatMessage, ROLE_ASSISTANT, ROLE_SYSTEM, ROLE_USER};

/// System-message sentinel some frontends send to ask "would you call a
/// tool?". Answered locally, without a model round-trip.
pub const TOOL_PROBE_SENTINEL: &str =
    "Your task is to choose and return the correct tool(s) from the list of available tools based on the query";

/// One incoming message as the wire carries it. `images` only appears on
/// Ollama chat requests.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub role: String,
    pub content: Option<Value>,
    #[serde(default)]
    pub images: Option<Vec<String>>,
}

impl IncomingMessage {
    /// Content as text; `null` is tolerated as empty.
    pub fn content_text(&self) -> String {
        match &self.content {
            Some(Value::String(text)) => text.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }
}

/// Extract a workflow override from a request's model field.
///
/// Strips a trailing `:latest`, then takes the part after the first `:` (or
/// the whole remainder) as a candidate workflow name. The override only
/// sticks if that workflow actually exists in the shared folder.
pub fn parse_model_field(model: &str, store: &ConfigStore) -> Option<String> {
    if model.is_empty() {
        return None;
    }

    let model = model.strip_suffix(":latest").unwrap_or(model);
    let workflow = match model.split_once(':') {
        Some((_user, workflow)) => workflow,
        None => model,
    };

    if workflow.is_empty() {
        return None;
    }
    if store.workflow_exists_in_shared_folder(workflow) {
        tracing::debug!(workflow, "Workflow override extracted from model field");
        Some(workflow.to_string())
    } else {
        None
    }
}

/// Whether any system message carries the tool-probe sentinel.
pub fn is_tool_probe(messages: &[IncomingMessage]) -> bool {
    messages.iter().any(|message| {
        message.role == ROLE_SYSTEM && message.content_text().contains(TOOL_PROBE_SENTINEL)
    })
}

fn apply_markers(role: &str, content: String, user: &UserConfig) -> String {
    if user.chat_complete_add_user_assistant {
        match role {
            ROLE_USER => format!("User: {content}"),
            ROLE_ASSISTANT => format!("Assistant: {content}"),
            _ => content,
        }
    } else {
        content
    }
}

fn append_missing_assistant(messages: &mut Vec<ChatMessage>, user: &UserConfig) {
    if !user.chat_completion_add_missing_assistant_generator {
        return;
    }
    let last_is_assistant = messages
        .last()
        .map(|message| message.role == ROLE_ASSISTANT)
        .unwrap_or(true);
    if last_is_assistant {
        return;
    }
    let content = if user.chat_complete_add_user_assistant {
        "Assistant:"
    } else {
        ""
    };
    messages.push(ChatMessage::assistant(content));
}

/// Normalize an OpenAI chat request's messages.
pub fn normalize_openai_chat(messages: &[IncomingMessage], user: &UserConfig) -> Vec<ChatMessage> {
    let mut transformed: Vec<ChatMessage> = messages
        .iter()
        .map(|message| {
            ChatMessage::new(
                message.role.clone(),
                apply_markers(&message.role, message.content_text(), user),
            )
        })
        .collect();
    append_missing_assistant(&mut transformed, user);
    transformed
}

/// Normalize an Ollama chat request's messages: per-message `images`
/// arrays become pseudo-role entries inserted before the owning message.
pub fn normalize_ollama_chat(messages: &[IncomingMessage], user: &UserConfig) -> Vec<ChatMessage> {
    let mut transformed: Vec<ChatMessage> = Vec::new();
    for message in messages {
        if let Some(images) = &message.images {
            for image in images {
                transformed.push(ChatMessage::image(image.clone()));
            }
        }
        transformed.push(ChatMessage::new(
            message.role.clone(),
            apply_markers(&message.role, message.content_text(), user),
        ));
    }
    append_missing_assistant(&mut transformed, user);
    transformed
}

/// Turn a legacy completion prompt into messages. A prompt with no speaker
/// tags becomes a single user message.
pub fn messages_from_prompt(prompt: &str) -> Vec<ChatMessage> {
    let messages = parse_conversation(prompt);
    if messages.is_empty() && !prompt.is_empty() {
        return vec![ChatMessage::user(prompt)];
    }
    messages
}

/// Build the message list for `/api/generate`: `system` is prepended to the
/// prompt before parsing, and top-level images append as pseudo-role
/// entries.
pub fn messages_from_generate(prompt: &str, system: &str, images: &[String]) -> Vec<ChatMessage> {
    let full_prompt = format!("{system}{prompt}");
    let mut messages = messages_from_prompt(&full_prompt);
    for image in images {
        messages.push(ChatMessage::image(image.clone()));
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn store_with_shared(root: &Path, workflows: &[&str]) -> ConfigStore {
        for workflow in workflows {
            write(root, &format!("Workflows/_shared/{workflow}.json"), "[]");
        }
        ConfigStore::new(root, "test_user")
    }

    fn message(role: &str, content: &str) -> IncomingMessage {
        IncomingMessage {
            role: role.to_string(),
            content: Some(Value::String(content.to_string())),
            images: None,
        }
    }

    fn marker_user() -> UserConfig {
        UserConfig {
            chat_complete_add_user_assistant: true,
            chat_completion_add_missing_assistant_generator: true,
            ..UserConfig::default()
        }
    }

    #[test]
    fn test_parse_model_field_variants() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_shared(dir.path(), &["CodingWorkflow"]);

        assert_eq!(
            parse_model_field("test_user:CodingWorkflow", &store),
            Some("CodingWorkflow".to_string())
        );
        assert_eq!(
            parse_model_field("test_user:CodingWorkflow:latest", &store),
            Some("CodingWorkflow".to_string())
        );
        assert_eq!(
            parse_model_field("CodingWorkflow:latest", &store),
            Some("CodingWorkflow".to_string())
        );
        assert_eq!(
            parse_model_field("CodingWorkflow", &store),
            Some("CodingWorkflow".to_string())
        );
        // Unknown workflows never become overrides.
        assert_eq!(parse_model_field("test_user:Nope", &store), None);
        assert_eq!(parse_model_field("", &store), None);
    }

    #[test]
    fn test_tool_probe_detection() {
        let probe = vec![
            message("system", &format!("prelude. {TOOL_PROBE_SENTINEL} suffix")),
            message("user", "what is the weather"),
        ];
        assert!(is_tool_probe(&probe));

        let normal = vec![message("system", "you are helpful")];
        assert!(!is_tool_probe(&normal));

        // The sentinel only counts on system messages.
        let user_mention = vec![message("user", TOOL_PROBE_SENTINEL)];
        assert!(!is_tool_probe(&user_mention));
    }

    #[test]
    fn test_openai_chat_markers_and_tail() {
        let messages = vec![message("user", "hi")];
        let transformed = normalize_openai_chat(&messages, &marker_user());
        assert_eq!(transformed.len(), 2);
        assert_eq!(transformed[0].content, "User: hi");
        assert_eq!(transformed[1].role, "assistant");
        assert_eq!(transformed[1].content, "Assistant:");
    }

    #[test]
    fn test_no_tail_when_last_is_assistant() {
        let messages = vec![message("user", "hi"), message("assistant", "hello")];
        let transformed = normalize_openai_chat(&messages, &marker_user());
        assert_eq!(transformed.len(), 2);
        assert_eq!(transformed[1].content, "Assistant: hello");
    }

    #[test]
    fn test_plain_passthrough_without_policies() {
        let messages = vec![message("user", "hi")];
        let transformed = normalize_openai_chat(&messages, &UserConfig::default());
        assert_eq!(transformed.len(), 1);
        assert_eq!(transformed[0].content, "hi");
    }

    #[test]
    fn test_ollama_chat_lifts_images_before_message() {
        let messages = vec![IncomingMessage {
            role: "user".to_string(),
            content: Some(Value::String("look at this".to_string())),
            images: Some(vec!["aW1n".to_string()]),
        }];
        let transformed = normalize_ollama_chat(&messages, &UserConfig::default());
        assert_eq!(transformed.len(), 2);
        assert!(transformed[0].is_image());
        assert_eq!(transformed[0].content, "aW1n");
        assert_eq!(transformed[1].content, "look at this");
    }

    #[test]
    fn test_null_content_tolerated() {
        let incoming = IncomingMessage {
            role: "assistant".to_string(),
            content: Some(Value::Null),
            images: None,
        };
        assert_eq!(incoming.content_text(), "");
    }

    #[test]
    fn test_messages_from_prompt_fallback() {
        let messages = messages_from_prompt("plain prompt");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[0].content, "plain prompt");

        assert!(messages_from_prompt("").is_empty());
    }

    #[test]
    fn test_messages_from_generate_combines_system_and_images() {
        let messages =
            messages_from_generate("prompt text", "system text. ", &["aW1n".to_string()]);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "system text. prompt text");
        assert!(messages[1].is_image());
    }
}
