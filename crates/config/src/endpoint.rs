//! Backend endpoint configuration

use serde::{Deserialize, Serialize};

/// One backend LLM endpoint: where it lives, how to authenticate, and the
/// response post-processing it needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EndpointConfig {
    /// Base URL, e.g. `http://127.0.0.1:11434`.
    pub endpoint: String,

    /// Name of the api-type record describing this endpoint's dialect.
    pub api_type_config_file_name: String,

    /// API key sent as a bearer token. Empty means none.
    pub api_key: String,

    /// Model name forwarded to the backend.
    pub model_name_to_send_to_api: String,

    /// Context window size, forwarded under the api-type's truncation key.
    pub max_context_token_size: Option<u64>,

    /// Left-strip leading line breaks from responses.
    pub trim_beginning_and_end_line_breaks: bool,

    /// Omit the top-level `model` key from payloads that would carry one.
    pub dont_include_model: bool,

    /// Strip `<think>`-style reasoning blocks from responses.
    pub remove_thinking: bool,

    /// Tag text for thinking blocks. Defaults to `think`.
    pub think_tag_text: String,

    /// The backend emits reasoning without an opening tag; everything up to
    /// the first closing tag is thinking.
    pub expect_only_closing_think_tag: bool,

    /// Characters from stream start within which an opening think tag is
    /// still honored.
    pub opening_tag_grace_period: usize,

    /// Strip one of these literals from the start of every response.
    pub remove_custom_text_from_response_start_endpoint_wide: bool,
    pub response_start_text_to_remove_endpoint_wide: Vec<String>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_type_config_file_name: String::new(),
            api_key: String::new(),
            model_name_to_send_to_api: String::new(),
            max_context_token_size: None,
            trim_beginning_and_end_line_breaks: false,
            dont_include_model: false,
            remove_thinking: false,
            think_tag_text: "think".to_string(),
            expect_only_closing_think_tag: false,
            opening_tag_grace_period: 50,
            remove_custom_text_from_response_start_endpoint_wide: false,
            response_start_text_to_remove_endpoint_wide: Vec::new(),
        }
    }
}
