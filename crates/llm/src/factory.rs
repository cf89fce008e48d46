//! Handler factory
//!
//! Compile-time mapping from an api-type's dialect name to its handler.

use llm_gateway_config::{ApiTypeConfig, EndpointConfig, Preset};

use crate::handler::LlmApiHandler;
use crate::handlers::{
    GenParams, KoboldCppHandler, OllamaChatHandler, OllamaChatImageHandler,
    OllamaGenerateHandler, OpenAiChatHandler, OpenAiChatImageHandler, OpenAiCompletionsHandler,
};
use crate::LlmError;

/// Build the handler for an endpoint's dialect.
pub fn build_handler(
    api_type: &ApiTypeConfig,
    endpoint: &EndpointConfig,
    preset: Preset,
    max_new_tokens: u64,
) -> Result<Box<dyn LlmApiHandler>, LlmError> {
    let gen = GenParams::new(preset, api_type, endpoint, max_new_tokens);

    let handler: Box<dyn LlmApiHandler> = match api_type.api_type.as_str() {
        "openAIChatCompletion" => Box::new(OpenAiChatHandler::new(endpoint, gen)),
        "openAIApiChatImageSpecific" => Box::new(OpenAiChatImageHandler::new(
            OpenAiChatHandler::new(endpoint, gen),
        )),
        "openAIV1Completion" => Box::new(OpenAiCompletionsHandler::new(endpoint, gen)),
        "ollamaApiChat" => Box::new(OllamaChatHandler::new(endpoint, gen)),
        "ollamaApiChatImageSpecific" => Box::new(OllamaChatImageHandler::new(
            OllamaChatHandler::new(endpoint, gen),
        )),
        "ollamaApiGenerate" => Box::new(OllamaGenerateHandler::new(endpoint, gen)),
        "koboldCppGenerate" => Box::new(KoboldCppHandler::new(endpoint, gen)),
        other => return Err(LlmError::UnknownApiType(other.to_string())),
    };
    Ok(handler)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_type(name: &str) -> ApiTypeConfig {
        ApiTypeConfig {
            api_type: name.to_string(),
            ..ApiTypeConfig::default()
        }
    }

    #[test]
    fn test_known_dialects_build() {
        let endpoint = EndpointConfig::default();
        for name in [
            "openAIChatCompletion",
            "openAIApiChatImageSpecific",
            "openAIV1Completion",
            "ollamaApiChat",
            "ollamaApiChatImageSpecific",
            "ollamaApiGenerate",
            "koboldCppGenerate",
        ] {
            assert!(
                build_handler(&api_type(name), &endpoint, Preset::default(), 400).is_ok(),
                "dialect {name} should build"
            );
        }
    }

    #[test]
    fn test_unknown_dialect_is_an_error() {
        let result = build_handler(
            &api_type("totallyNewApi"),
            &EndpointConfig::default(),
            Preset::default(),
            400,
        );
        assert!(matches!(result, Err(LlmError::UnknownApiType(name)) if name == "totallyNewApi"));
    }
}
