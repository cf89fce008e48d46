//! Backend dialect configuration

use serde::{Deserialize, Serialize};

/// Describes a backend dialect family: its name (the handler-factory key)
/// and the property names under which generation parameters are injected
/// into payloads for that family.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiTypeConfig {
    /// Dialect name, e.g. `ollamaApiGenerate` or `openAIChatCompletion`.
    #[serde(rename = "type")]
    pub api_type: String,

    /// Payload key for the context truncation length, if the dialect has one.
    pub truncate_length_property_name: Option<String>,

    /// Payload key for the stream flag.
    pub stream_property_name: Option<String>,

    /// Payload key for the max-new-tokens limit.
    pub max_new_tokens_property_name: Option<String>,

    /// Preset subfolder this dialect reads generation presets from.
    pub preset_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_shape() {
        let config: ApiTypeConfig = serde_json::from_str(
            r#"{
                "type": "ollamaApiGenerate",
                "truncateLengthPropertyName": "num_ctx",
                "streamPropertyName": "stream",
                "maxNewTokensPropertyName": "num_predict",
                "presetType": "Ollama"
            }"#,
        )
        .unwrap();
        assert_eq!(config.api_type, "ollamaApiGenerate");
        assert_eq!(config.truncate_length_property_name.as_deref(), Some("num_ctx"));
        assert_eq!(config.preset_type, "Ollama");
    }

    #[test]
    fn test_missing_property_names() {
        let config: ApiTypeConfig =
            serde_json::from_str(r#"{"type": "koboldCppGenerate"}"#).unwrap();
        assert!(config.stream_property_name.is_none());
        assert!(config.max_new_tokens_property_name.is_none());
    }
}
