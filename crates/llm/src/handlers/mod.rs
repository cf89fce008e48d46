//! Concrete dialect handlers

pub mod images;
pub mod koboldcpp;
pub mod ollama;
pub mod openai;

pub use images::{OllamaChatImageHandler, OpenAiChatImageHandler};
pub use koboldcpp::KoboldCppHandler;
pub use ollama::{OllamaChatHandler, OllamaGenerateHandler};
pub use openai::{OpenAiChatHandler, OpenAiCompletionsHandler};

use serde_json::{Map, Value};

use llm_gateway_config::{ApiTypeConfig, EndpointConfig, Preset};

/// Generation parameters for one backend call: the preset's bag of options
/// plus the dynamic values (stream flag, token limits) injected under the
/// property names the dialect family declares. Property names are resolved
/// once, at handler construction.
#[derive(Debug, Clone, Default)]
pub struct GenParams {
    base: Map<String, Value>,
    truncate_property_name: Option<String>,
    stream_property_name: Option<String>,
    max_token_property_name: Option<String>,
    max_context_tokens: Option<u64>,
    max_new_tokens: u64,
}

impl GenParams {
    pub fn new(
        preset: Preset,
        api_type: &ApiTypeConfig,
        endpoint: &EndpointConfig,
        max_new_tokens: u64,
    ) -> Self {
        Self {
            base: preset.into_params(),
            truncate_property_name: api_type.truncate_length_property_name.clone(),
            stream_property_name: api_type.stream_property_name.clone(),
            max_token_property_name: api_type.max_new_tokens_property_name.clone(),
            max_context_tokens: endpoint.max_context_token_size,
            max_new_tokens,
        }
    }

    /// The preset parameters with the dynamic values injected.
    pub fn materialize(&self, stream: bool) -> Map<String, Value> {
        let mut params = self.base.clone();
        if let Some(name) = &self.truncate_property_name {
            params.insert(name.clone(), Value::from(self.max_context_tokens));
        }
        if let Some(name) = &self.stream_property_name {
            params.insert(name.clone(), Value::from(stream));
        }
        if let Some(name) = &self.max_token_property_name {
            params.insert(name.clone(), Value::from(self.max_new_tokens));
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn api_type() -> ApiTypeConfig {
        serde_json::from_value(json!({
            "type": "ollamaApiGenerate",
            "truncateLengthPropertyName": "num_ctx",
            "streamPropertyName": "stream",
            "maxNewTokensPropertyName": "num_predict",
            "presetType": "Ollama"
        }))
        .unwrap()
    }

    #[test]
    fn test_dynamic_values_injected() {
        let preset: Preset = serde_json::from_value(json!({"temperature": 0.7})).unwrap();
        let endpoint = EndpointConfig {
            max_context_token_size: Some(8192),
            ..EndpointConfig::default()
        };
        let params = GenParams::new(preset, &api_type(), &endpoint, 400).materialize(true);
        assert_eq!(params["temperature"], json!(0.7));
        assert_eq!(params["num_ctx"], json!(8192));
        assert_eq!(params["stream"], json!(true));
        assert_eq!(params["num_predict"], json!(400));
    }

    #[test]
    fn test_absent_property_names_inject_nothing() {
        let params = GenParams::new(
            Preset::default(),
            &ApiTypeConfig::default(),
            &EndpointConfig::default(),
            400,
        )
        .materialize(false);
        assert!(params.is_empty());
    }
}
