//! Dialect-neutral stream chunks

use serde::{Deserialize, Serialize};

/// One unit of backend output, stripped of any dialect framing.
///
/// Backend handlers produce these; the stream transformer consumes them and
/// re-frames for the client's dialect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeutralChunk {
    /// Token text. May be empty (e.g. the terminal chunk).
    #[serde(default)]
    pub token: String,
    /// Upstream finish reason; `"stop"` terminates the stream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

impl NeutralChunk {
    pub fn token(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            finish_reason: None,
        }
    }

    pub fn with_finish(token: impl Into<String>, finish_reason: Option<String>) -> Self {
        Self {
            token: token.into(),
            finish_reason,
        }
    }

    /// Terminal chunk: empty token, `finish_reason == "stop"`.
    pub fn stop() -> Self {
        Self {
            token: String::new(),
            finish_reason: Some("stop".to_string()),
        }
    }

    pub fn is_stop(&self) -> bool {
        self.finish_reason.as_deref() == Some("stop")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_chunk() {
        let chunk = NeutralChunk::stop();
        assert!(chunk.is_stop());
        assert!(chunk.token.is_empty());
        assert!(!NeutralChunk::token("hi").is_stop());
    }
}
