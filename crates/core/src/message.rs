//! Chat message model
//!
//! Messages are kept close to their wire shape: a role string plus content.
//! Image payloads travel as messages with the pseudo-role `images`, inserted
//! by the intake layer and consumed only by image-aware backend handlers.

use serde::{Deserialize, Serialize};

pub const ROLE_SYSTEM: &str = "system";
pub const ROLE_USER: &str = "user";
pub const ROLE_ASSISTANT: &str = "assistant";
pub const ROLE_IMAGES: &str = "images";

/// A single conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ROLE_SYSTEM, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ROLE_USER, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ROLE_ASSISTANT, content)
    }

    /// An image payload disguised as a message, following the turn it
    /// belongs to.
    pub fn image(content: impl Into<String>) -> Self {
        Self::new(ROLE_IMAGES, content)
    }

    pub fn is_image(&self) -> bool {
        self.role == ROLE_IMAGES
    }
}
