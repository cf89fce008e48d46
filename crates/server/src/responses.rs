//! Non-streaming response bodies
//!
//! Single source of truth for every complete JSON payload the frontend
//! emits: model listings, finished chat/completion responses, tool-probe
//! short-circuits, and the Ollama version stamp.

use chrono::Utc;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use llm_gateway_config::{ConfigStore, UserConfig};

const NONSTREAM_FINGERPRINT: &str = "wmr_123456789";

/// Builds dialect-specific response payloads against the active user's
/// configuration.
pub struct ResponseBuilder<'a> {
    store: &'a ConfigStore,
    user: &'a UserConfig,
}

impl<'a> ResponseBuilder<'a> {
    pub fn new(store: &'a ConfigStore, user: &'a UserConfig) -> Self {
        Self { store, user }
    }

    /// Model ids advertised to clients: one per shared workflow when the
    /// listing is enabled, otherwise just the username.
    fn model_ids(&self) -> Vec<String> {
        if self.user.allow_shared_workflows {
            let workflows = self.store.available_shared_workflows();
            if !workflows.is_empty() {
                return workflows
                    .into_iter()
                    .map(|workflow| format!("{}:{}", self.store.username(), workflow))
                    .collect();
            }
        }
        vec![self.store.username().to_string()]
    }

    pub fn openai_models(&self) -> Value {
        let created = Utc::now().timestamp();
        let models: Vec<Value> = self
            .model_ids()
            .into_iter()
            .map(|id| {
                json!({
                    "id": id,
                    "object": "model",
                    "created": created,
                    "owned_by": "llm-gateway",
                })
            })
            .collect();
        json!({"object": "list", "data": models})
    }

    pub fn ollama_tags(&self) -> Value {
        let models: Vec<Value> = self
            .model_ids()
            .into_iter()
            .map(|id| {
                let digest = format!("{:x}", Sha256::digest(id.as_bytes()));
                json!({
                    "name": id,
                    "model": format!("{id}:latest"),
                    "modified_at": "2024-11-23T00:00:00Z",
                    "size": 1,
                    "digest": digest,
                    "details": {
                        "format": "gguf",
                        "family": "llm-gateway",
                        "families": null,
                        "parameter_size": "N/A",
                        "quantization_level": "Q8",
                    },
                })
            })
            .collect();
        json!({"models": models})
    }

    pub fn ollama_version(&self) -> Value {
        json!({"version": "0.9"})
    }

    pub fn openai_completion(&self, full_text: &str, model_name: &str) -> Value {
        let created = Utc::now().timestamp();
        json!({
            "id": format!("cmpl-{created}"),
            "object": "text_completion",
            "created": created,
            "model": model_name,
            "system_fingerprint": NONSTREAM_FINGERPRINT,
            "choices": [{
                "text": full_text,
                "index": 0,
                "logprobs": null,
                "finish_reason": "stop",
            }],
            "usage": {},
        })
    }

    pub fn openai_chat_completion(&self, full_text: &str, model_name: &str) -> Value {
        let created = Utc::now().timestamp();
        json!({
            "id": format!("chatcmpl-{created}"),
            "object": "chat.completion",
            "created": created,
            "model": model_name,
            "system_fingerprint": NONSTREAM_FINGERPRINT,
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": full_text,
                },
                "logprobs": null,
                "finish_reason": "stop",
            }],
            "usage": {},
        })
    }

    /// Early response for an OpenAI-dialect tool-selection probe.
    pub fn openai_tool_call(&self, model_name: &str) -> Value {
        let created = Utc::now().timestamp();
        json!({
            "id": format!("chatcmpl-opnwui-tool-{created}"),
            "object": "chat.completion",
            "created": created,
            "model": model_name,
            "system_fingerprint": NONSTREAM_FINGERPRINT,
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": null, "tool_calls": []},
                "logprobs": null,
                "finish_reason": "tool_calls",
            }],
            "usage": {},
        })
    }

    pub fn ollama_generate(&self, full_text: &str, model_name: &str, request_id: &str) -> Value {
        let created = Utc::now().timestamp();
        json!({
            "id": format!("gen-{created}"),
            "object": "text_completion",
            "created": created,
            "model": model_name,
            "response": full_text,
            "choices": [{
                "text": full_text,
                "index": 0,
                "logprobs": null,
                "finish_reason": "stop",
            }],
            "usage": {},
            "request_id": request_id,
        })
    }

    pub fn ollama_chat(&self, full_text: &str, model_name: &str, request_id: &str) -> Value {
        json!({
            "model": model_name,
            "created_at": iso_now(),
            "message": {
                "role": "assistant",
                "content": full_text,
            },
            "done_reason": "stop",
            "done": true,
            "total_duration": 4_505_727_700u64,
            "load_duration": 23_500_100u64,
            "prompt_eval_count": 15,
            "prompt_eval_duration": 4_000_000,
            "eval_count": 392,
            "eval_duration": 4_476_000_000u64,
            "request_id": request_id,
        })
    }

    /// Early response for an Ollama-dialect tool-selection probe.
    pub fn ollama_tool_call(&self, model_name: &str) -> Value {
        json!({
            "model": model_name,
            "created_at": iso_now(),
            "message": {"role": "assistant", "content": ""},
            "done_reason": "stop",
            "done": true,
            "total_duration": 0,
            "load_duration": 0,
            "prompt_eval_count": 0,
            "prompt_eval_duration": 0,
            "eval_count": 0,
            "eval_duration": 0,
        })
    }
}

fn iso_now() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}
