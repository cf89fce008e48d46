//! Image-bearing handler variants
//!
//! Wrappers over the non-image siblings. Each delegates everything to its
//! inner handler and post-processes the payload to re-attach messages with
//! the `images` pseudo-role in the form its dialect expects.

use serde_json::{json, Value};

use llm_gateway_core::{ChatMessage, NeutralChunk, ROLE_USER};

use crate::handler::{LlmApiHandler, StreamFormat};
use crate::handlers::{OllamaChatHandler, OpenAiChatHandler};

fn collect_images(conversation: &[ChatMessage]) -> Vec<String> {
    conversation
        .iter()
        .filter(|message| message.is_image())
        .map(|message| message.content.clone())
        .collect()
}

fn last_user_message(messages: &mut [Value]) -> Option<&mut Value> {
    messages
        .iter_mut()
        .rev()
        .find(|message| message.get("role").and_then(Value::as_str) == Some(ROLE_USER))
}

/// Ollama `/api/chat` with image attachments: images ride as a base64 array
/// on the last user message.
pub struct OllamaChatImageHandler {
    inner: OllamaChatHandler,
}

impl OllamaChatImageHandler {
    pub fn new(inner: OllamaChatHandler) -> Self {
        Self { inner }
    }
}

impl LlmApiHandler for OllamaChatImageHandler {
    fn endpoint_url(&self, stream: bool) -> String {
        self.inner.endpoint_url(stream)
    }

    fn prepare_payload(
        &self,
        conversation: &[ChatMessage],
        system_prompt: Option<&str>,
        prompt: Option<&str>,
        stream: bool,
    ) -> Value {
        let images = collect_images(conversation);
        let mut payload = self
            .inner
            .prepare_payload(conversation, system_prompt, prompt, stream);

        if !images.is_empty() {
            if let Some(messages) = payload["messages"].as_array_mut() {
                if let Some(message) = last_user_message(messages) {
                    message["images"] = json!(images);
                } else {
                    tracing::warn!("Image payload without a user message to attach to");
                }
            }
        }
        payload
    }

    fn stream_format(&self) -> StreamFormat {
        self.inner.stream_format()
    }

    fn parse_chunk(&self, data: &str) -> Option<NeutralChunk> {
        self.inner.parse_chunk(data)
    }

    fn parse_full_response(&self, response: &Value) -> String {
        self.inner.parse_full_response(response)
    }
}

/// OpenAI `/v1/chat/completions` with image attachments: the last user
/// message's content becomes a content array of text + `image_url` entries.
pub struct OpenAiChatImageHandler {
    inner: OpenAiChatHandler,
}

impl OpenAiChatImageHandler {
    pub fn new(inner: OpenAiChatHandler) -> Self {
        Self { inner }
    }
}

impl LlmApiHandler for OpenAiChatImageHandler {
    fn endpoint_url(&self, stream: bool) -> String {
        self.inner.endpoint_url(stream)
    }

    fn prepare_payload(
        &self,
        conversation: &[ChatMessage],
        system_prompt: Option<&str>,
        prompt: Option<&str>,
        stream: bool,
    ) -> Value {
        let images = collect_images(conversation);
        let mut payload = self
            .inner
            .prepare_payload(conversation, system_prompt, prompt, stream);

        if !images.is_empty() {
            if let Some(messages) = payload["messages"].as_array_mut() {
                if let Some(message) = last_user_message(messages) {
                    let text = message
                        .get("content")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string();
                    let mut content = vec![json!({"type": "text", "text": text})];
                    for image in &images {
                        content.push(json!({
                            "type": "image_url",
                            "image_url": {"url": image},
                        }));
                    }
                    message["content"] = Value::Array(content);
                } else {
                    tracing::warn!("Image payload without a user message to attach to");
                }
            }
        }
        payload
    }

    fn stream_format(&self) -> StreamFormat {
        self.inner.stream_format()
    }

    fn parse_chunk(&self, data: &str) -> Option<NeutralChunk> {
        self.inner.parse_chunk(data)
    }

    fn parse_full_response(&self, response: &Value) -> String {
        self.inner.parse_full_response(response)
    }
}
