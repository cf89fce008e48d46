//! Frontend API dialects

use serde::{Deserialize, Serialize};

/// The wire dialect a client spoke to us, which fixes the shape of every
/// frame we emit back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiKind {
    OpenAiChatCompletion,
    OpenAiCompletion,
    OllamaChat,
    OllamaGenerate,
}

impl ApiKind {
    /// Ollama dialects frame responses as NDJSON lines and never emit a
    /// `[DONE]` marker.
    pub fn is_ollama(&self) -> bool {
        matches!(self, Self::OllamaChat | Self::OllamaGenerate)
    }

    /// Content type for a streaming response in this dialect.
    pub fn stream_content_type(&self) -> &'static str {
        if self.is_ollama() {
            "application/x-ndjson"
        } else {
            "text/event-stream"
        }
    }
}

impl std::fmt::Display for ApiKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::OpenAiChatCompletion => "openai_chat_completion",
            Self::OpenAiCompletion => "openai_completion",
            Self::OllamaChat => "ollama_chat",
            Self::OllamaGenerate => "ollama_generate",
        };
        f.write_str(name)
    }
}
