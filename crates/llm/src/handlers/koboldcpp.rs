//! KoboldCpp backend handler

use serde_json::{json, Value};

use llm_gateway_core::{ChatMessage, NeutralChunk};
use llm_gateway_config::EndpointConfig;

use crate::handler::{build_prompt_from_conversation, LlmApiHandler, StreamFormat};
use crate::handlers::GenParams;

/// KoboldCpp generation backend. Streams from `/api/extra/generate/stream`
/// (SSE with named `message` events, no finish signal; the stream ends when
/// the backend closes it) and uses `/api/v1/generate` for non-streaming.
pub struct KoboldCppHandler {
    base_url: String,
    gen: GenParams,
}

impl KoboldCppHandler {
    pub fn new(endpoint: &EndpointConfig, gen: GenParams) -> Self {
        Self {
            base_url: endpoint.endpoint.trim_end_matches('/').to_string(),
            gen,
        }
    }
}

impl LlmApiHandler for KoboldCppHandler {
    fn endpoint_url(&self, stream: bool) -> String {
        if stream {
            format!("{}/api/extra/generate/stream", self.base_url)
        } else {
            format!("{}/api/v1/generate", self.base_url)
        }
    }

    fn prepare_payload(
        &self,
        conversation: &[ChatMessage],
        system_prompt: Option<&str>,
        prompt: Option<&str>,
        stream: bool,
    ) -> Value {
        let mut payload = Value::Object(self.gen.materialize(stream));
        payload["prompt"] =
            json!(build_prompt_from_conversation(conversation, system_prompt, prompt));
        payload
    }

    fn stream_format(&self) -> StreamFormat {
        StreamFormat::SseNamedEvent("message")
    }

    fn parse_chunk(&self, data: &str) -> Option<NeutralChunk> {
        let parsed: Value = match serde_json::from_str(data) {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(data, "Could not parse KoboldCpp stream data");
                return None;
            }
        };
        let token = parsed.get("token").and_then(Value::as_str).unwrap_or("");
        Some(NeutralChunk::token(token))
    }

    fn parse_full_response(&self, response: &Value) -> String {
        match response.pointer("/results/0/text") {
            Some(Value::String(text)) => text.clone(),
            _ => {
                tracing::error!("Could not find text in KoboldCpp response");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler() -> KoboldCppHandler {
        KoboldCppHandler::new(
            &EndpointConfig {
                endpoint: "http://localhost:5001".to_string(),
                ..EndpointConfig::default()
            },
            GenParams::default(),
        )
    }

    #[test]
    fn test_url_depends_on_stream() {
        assert_eq!(
            handler().endpoint_url(true),
            "http://localhost:5001/api/extra/generate/stream"
        );
        assert_eq!(
            handler().endpoint_url(false),
            "http://localhost:5001/api/v1/generate"
        );
    }

    #[test]
    fn test_stream_format_filters_message_events() {
        assert_eq!(
            handler().stream_format(),
            StreamFormat::SseNamedEvent("message")
        );
    }

    #[test]
    fn test_parse_chunk_has_no_finish_signal() {
        let chunk = handler().parse_chunk(r#"{"token":"Hel"}"#).unwrap();
        assert_eq!(chunk.token, "Hel");
        assert!(chunk.finish_reason.is_none());
    }

    #[test]
    fn test_parse_full_response() {
        let body = json!({"results": [{"text": "done"}]});
        assert_eq!(handler().parse_full_response(&body), "done");
        assert_eq!(handler().parse_full_response(&json!({})), "");
    }
}
