//! Backend handler capability set
//!
//! Every backend dialect is described by one implementation of
//! [`LlmApiHandler`]: how to build the URL and payload, how the stream is
//! framed, and how to pull `(token, finish_reason)` out of a frame. The
//! request orchestration itself lives in [`crate::client::LlmBackend`] and
//! is shared across all dialects.

use serde_json::Value;

use llm_gateway_core::{ChatMessage, NeutralChunk};

/// How a backend frames its streaming data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    /// One complete JSON object per line (Ollama).
    LineDelimitedJson,
    /// Server-Sent Events; every `data:` line is a payload (OpenAI).
    SseAnyEvent,
    /// Server-Sent Events; only `data:` lines under the named `event:` are
    /// payloads (KoboldCpp).
    SseNamedEvent(&'static str),
}

/// Per-dialect behavior of one backend endpoint.
pub trait LlmApiHandler: Send + Sync {
    /// Full URL for the request. May depend on whether we stream.
    fn endpoint_url(&self, stream: bool) -> String;

    /// Build the dialect-specific request body from the generic inputs.
    fn prepare_payload(
        &self,
        conversation: &[ChatMessage],
        system_prompt: Option<&str>,
        prompt: Option<&str>,
        stream: bool,
    ) -> Value;

    fn stream_format(&self) -> StreamFormat;

    /// Parse one streaming frame into a neutral chunk.
    ///
    /// Returns `None` (after logging at warn) for malformed frames; the
    /// stream continues.
    fn parse_chunk(&self, data: &str) -> Option<NeutralChunk>;

    /// Extract the final text from a non-streaming response body.
    fn parse_full_response(&self, response: &Value) -> String;
}

/// Flatten a conversation plus optional system/user prompts into one string,
/// for `/completions`-style backends.
pub fn build_prompt_from_conversation(
    conversation: &[ChatMessage],
    system_prompt: Option<&str>,
    prompt: Option<&str>,
) -> String {
    let mut full_prompt = String::new();
    full_prompt.push_str(system_prompt.unwrap_or(""));
    for message in conversation {
        if !message.is_image() {
            full_prompt.push_str(&message.content);
        }
    }
    full_prompt.push_str(prompt.unwrap_or(""));
    full_prompt.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_skips_images() {
        let conversation = vec![
            ChatMessage::user("hello "),
            ChatMessage::image("base64data"),
            ChatMessage::assistant("world"),
        ];
        let prompt = build_prompt_from_conversation(&conversation, Some("sys "), None);
        assert_eq!(prompt, "sys hello world");
    }

    #[test]
    fn test_flatten_trims() {
        let prompt = build_prompt_from_conversation(&[], Some("  sys"), Some("prompt  "));
        assert_eq!(prompt, "sys prompt");
    }
}
