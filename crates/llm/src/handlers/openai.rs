//! OpenAI-compatible backend handlers

use serde_json::{json, Value};

use llm_gateway_core::{ChatMessage, NeutralChunk};
use llm_gateway_config::EndpointConfig;

use crate::handler::{build_prompt_from_conversation, LlmApiHandler, StreamFormat};
use crate::handlers::GenParams;

/// `/v1/chat/completions` backend.
pub struct OpenAiChatHandler {
    base_url: String,
    model_name: String,
    dont_include_model: bool,
    gen: GenParams,
}

impl OpenAiChatHandler {
    pub fn new(endpoint: &EndpointConfig, gen: GenParams) -> Self {
        Self {
            base_url: endpoint.endpoint.trim_end_matches('/').to_string(),
            model_name: endpoint.model_name_to_send_to_api.clone(),
            dont_include_model: endpoint.dont_include_model,
            gen,
        }
    }

    /// Conversation as wire messages, with image pseudo-messages dropped;
    /// system/user prompts become leading/trailing turns.
    fn build_messages(
        conversation: &[ChatMessage],
        system_prompt: Option<&str>,
        prompt: Option<&str>,
    ) -> Vec<Value> {
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
        messages
    }
}

impl LlmApiHandler for OpenAiChatHandler {
    fn endpoint_url(&self, _stream: bool) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    fn prepare_payload(
        &self,
        conversation: &[ChatMessage],
        system_prompt: Option<&str>,
        prompt: Option<&str>,
        stream: bool,
    ) -> Value {
        let mut payload = Value::Object(self.gen.materialize(stream));
        payload["messages"] =
            Value::Array(Self::build_messages(conversation, system_prompt, prompt));
        if !self.dont_include_model {
            payload["model"] = json!(self.model_name);
        }
        payload
    }

    fn stream_format(&self) -> StreamFormat {
        StreamFormat::SseAnyEvent
    }

    fn parse_chunk(&self, data: &str) -> Option<NeutralChunk> {
        let parsed: Value = match serde_json::from_str(data) {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(data, "Could not parse OpenAI chat stream data");
                return None;
            }
        };
        let choice = parsed.get("choices")?.get(0)?;
        let token = choice
            .pointer("/delta/content")
            .and_then(Value::as_str)
            .unwrap_or("");
        let finish_reason = choice
            .get("finish_reason")
            .and_then(Value::as_str)
            .map(str::to_string);
        Some(NeutralChunk::with_finish(token, finish_reason))
    }

    fn parse_full_response(&self, response: &Value) -> String {
        match response.pointer("/choices/0/message/content") {
            Some(Value::String(text)) => text.clone(),
            _ => {
                tracing::error!("Could not find message content in OpenAI chat response");
                String::new()
            }
        }
    }
}

/// Legacy `/v1/completions` backend.
pub struct OpenAiCompletionsHandler {
    base_url: String,
    model_name: String,
    dont_include_model: bool,
    gen: GenParams,
}

impl OpenAiCompletionsHandler {
    pub fn new(endpoint: &EndpointConfig, gen: GenParams) -> Self {
        Self {
            base_url: endpoint.endpoint.trim_end_matches('/').to_string(),
            model_name: endpoint.model_name_to_send_to_api.clone(),
            dont_include_model: endpoint.dont_include_model,
            gen,
        }
    }
}

impl LlmApiHandler for OpenAiCompletionsHandler {
    fn endpoint_url(&self, _stream: bool) -> String {
        format!("{}/v1/completions", self.base_url)
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
        if !self.dont_include_model {
            payload["model"] = json!(self.model_name);
        }
        payload
    }

    fn stream_format(&self) -> StreamFormat {
        StreamFormat::SseAnyEvent
    }

    fn parse_chunk(&self, data: &str) -> Option<NeutralChunk> {
        let parsed: Value = match serde_json::from_str(data) {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(data, "Could not parse OpenAI completions stream data");
                return None;
            }
        };
        let choice = parsed.get("choices")?.get(0)?;
        let token = choice.get("text").and_then(Value::as_str).unwrap_or("");
        let finish_reason = choice
            .get("finish_reason")
            .and_then(Value::as_str)
            .map(str::to_string);
        Some(NeutralChunk::with_finish(token, finish_reason))
    }

    fn parse_full_response(&self, response: &Value) -> String {
        match response.pointer("/choices/0/text") {
            Some(Value::String(text)) => text.clone(),
            _ => {
                tracing::error!("Could not find text in OpenAI completions response");
                String::new()
            }
        }
    }
}
