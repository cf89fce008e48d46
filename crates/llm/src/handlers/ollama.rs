//! Ollama backend handlers

use serde_json::{json, Value};

use llm_gateway_core::{ChatMessage, NeutralChunk};
use llm_gateway_config::EndpointConfig;

use crate::handler::{build_prompt_from_conversation, LlmApiHandler, StreamFormat};
use crate::handlers::GenParams;

fn parse_ollama_line(data: &str, content_key: &str) -> Option<NeutralChunk> {
    let parsed: Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(data, "Could not parse Ollama stream data");
            return None;
        }
    };
    let token = match content_key {
        "response" => parsed.get("response").and_then(Value::as_str).unwrap_or(""),
        _ => parsed
            .pointer("/message/content")
            .and_then(Value::as_str)
            .unwrap_or(""),
    };
    let finish_reason = if parsed.get("done").and_then(Value::as_bool) == Some(true) {
        Some("stop".to_string())
    } else {
        None
    };
    Some(NeutralChunk::with_finish(token, finish_reason))
}

/// `/api/chat` backend.
pub struct OllamaChatHandler {
    base_url: String,
    model_name: String,
    gen: GenParams,
}

impl OllamaChatHandler {
    pub fn new(endpoint: &EndpointConfig, gen: GenParams) -> Self {
        Self {
            base_url: endpoint.endpoint.trim_end_matches('/').to_string(),
            model_name: endpoint.model_name_to_send_to_api.clone(),
            gen,
        }
    }
}

impl LlmApiHandler for OllamaChatHandler {
    fn endpoint_url(&self, _stream: bool) -> String {
        format!("{}/api/chat", self.base_url)
    }

    fn prepare_payload(
        &self,
        conversation: &[ChatMessage],
        system_prompt: Option<&str>,
        prompt: Option<&str>,
        stream: bool,
    ) -> Value {
        let mut messages = Vec::new();
        if let Some(system) = system_prompt {
            if !system.is_empty() {
                messages.push(json!({"role": "system", "content": system}));
            }
        }
        for message in conversation {
            if !message.is_image() {
                messages.push(json!({"role": message.role, "content": message.content}));
            }
        }
        if let Some(user) = prompt {
            if !user.is_empty() {
                messages.push(json!({"role": "user", "content": user}));
            }
        }

        // Generation parameters ride under `options`, not the payload root.
        json!({
            "model": self.model_name,
            "messages": messages,
            "stream": stream,
            "options": self.gen.materialize(stream),
        })
    }

    fn stream_format(&self) -> StreamFormat {
        StreamFormat::LineDelimitedJson
    }

    fn parse_chunk(&self, data: &str) -> Option<NeutralChunk> {
        parse_ollama_line(data, "message")
    }

    fn parse_full_response(&self, response: &Value) -> String {
        match response.pointer("/message/content") {
            Some(Value::String(text)) => text.clone(),
            _ => {
                tracing::error!("Could not find message content in Ollama chat response");
                String::new()
            }
        }
    }
}

/// `/api/generate` backend. Sends the flattened prompt with `raw: true` so
/// the backend applies no chat template of its own.
pub struct OllamaGenerateHandler {
    base_url: String,
    model_name: String,
    gen: GenParams,
}

impl OllamaGenerateHandler {
    pub fn new(endpoint: &EndpointConfig, gen: GenParams) -> Self {
        Self {
            base_url: endpoint.endpoint.trim_end_matches('/').to_string(),
            model_name: endpoint.model_name_to_send_to_api.clone(),
            gen,
        }
    }
}

impl LlmApiHandler for OllamaGenerateHandler {
    fn endpoint_url(&self, _stream: bool) -> String {
        format!("{}/api/generate", self.base_url)
    }

    fn prepare_payload(
        &self,
        conversation: &[ChatMessage],
        system_prompt: Option<&str>,
        prompt: Option<&str>,
        stream: bool,
    ) -> Value {
        json!({
            "model": self.model_name,
            "prompt": build_prompt_from_conversation(conversation, system_prompt, prompt),
            "stream": stream,
            "raw": true,
            "options": self.gen.materialize(stream),
        })
    }

    fn stream_format(&self) -> StreamFormat {
        StreamFormat::LineDelimitedJson
    }

    fn parse_chunk(&self, data: &str) -> Option<NeutralChunk> {
        parse_ollama_line(data, "response")
    }

    fn parse_full_response(&self, response: &Value) -> String {
        match response.get("response") {
            Some(Value::String(text)) => text.clone(),
            _ => {
                tracing::error!("Could not find 'response' in Ollama generate response");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> EndpointConfig {
        EndpointConfig {
            endpoint: "http://localhost:11434".to_string(),
            model_name_to_send_to_api: "llama3".to_string(),
            ..EndpointConfig::default()
        }
    }

    #[test]
    fn test_generate_payload_shape() {
        let handler = OllamaGenerateHandler::new(&endpoint(), GenParams::default());
        assert_eq!(
            handler.endpoint_url(true),
            "http://localhost:11434/api/generate"
        );

        let payload =
            handler.prepare_payload(&[ChatMessage::user("hello")], Some("sys "), None, true);
        assert_eq!(payload["model"], "llama3");
        assert_eq!(payload["prompt"], "sys hello");
        assert_eq!(payload["raw"], true);
        assert_eq!(payload["stream"], true);
        assert!(payload["options"].is_object());
    }

    #[test]
    fn test_chat_payload_shape() {
        let handler = OllamaChatHandler::new(&endpoint(), GenParams::default());
        let payload = handler.prepare_payload(&[ChatMessage::user("hi")], None, None, false);
        assert_eq!(payload["stream"], false);
        assert_eq!(payload["messages"][0]["content"], "hi");
    }

    #[test]
    fn test_parse_generate_chunk() {
        let handler = OllamaGenerateHandler::new(&endpoint(), GenParams::default());
        let chunk = handler
            .parse_chunk(r#"{"response":"Hel","done":false}"#)
            .unwrap();
        assert_eq!(chunk.token, "Hel");
        assert!(!chunk.is_stop());

        let last = handler.parse_chunk(r#"{"response":"","done":true}"#).unwrap();
        assert!(last.is_stop());
    }

    #[test]
    fn test_parse_chat_chunk() {
        let handler = OllamaChatHandler::new(&endpoint(), GenParams::default());
        let chunk = handler
            .parse_chunk(r#"{"message":{"role":"assistant","content":"hi"},"done":false}"#)
            .unwrap();
        assert_eq!(chunk.token, "hi");
    }

    #[test]
    fn test_malformed_line_is_none() {
        let handler = OllamaGenerateHandler::new(&endpoint(), GenParams::default());
        assert!(handler.parse_chunk("{broken").is_none());
    }

    #[test]
    fn test_parse_full_responses() {
        let generate = OllamaGenerateHandler::new(&endpoint(), GenParams::default());
        assert_eq!(
            generate.parse_full_response(&json!({"response": "done"})),
            "done"
        );
        assert_eq!(generate.parse_full_response(&json!({})), "");

        let chat = OllamaChatHandler::new(&endpoint(), GenParams::default());
        assert_eq!(
            chat.parse_full_response(&json!({"message": {"content": "done"}})),
            "done"
        );
    }
}
