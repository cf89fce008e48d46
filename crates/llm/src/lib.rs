//! Backend LLM integration
//!
//! One handler per backend dialect, each implementing a small capability set
//! (endpoint URL, payload preparation, stream framing, chunk parsing, full
//! response parsing). The shared [`client::LlmBackend`] drives both the
//! streaming and non-streaming request paths over any handler, with
//! cancellation-aware iteration and thinking-block removal.

pub mod client;
pub mod factory;
pub mod handler;
pub mod handlers;
pub mod thinking;

pub use client::{BackendClientConfig, LlmBackend};
pub use factory::build_handler;
pub use handler::{LlmApiHandler, StreamFormat};
pub use thinking::{remove_thinking_from_text, ThinkRemover};

use thiserror::Error;

/// Backend request errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Unknown api type: {0}")]
    UnknownApiType(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Network(err.to_string())
    }
}
