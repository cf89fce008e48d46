//! HTTP frontend for the gateway
//!
//! Exposes OpenAI-compatible (`/v1/chat/completions`, `/v1/completions`,
//! `/v1/models`) and Ollama-compatible (`/api/chat`, `/api/generate`,
//! `/api/tags`, `/api/version`) endpoints, translating between the client's
//! dialect and whatever backend the active workflow selects.

pub mod http;
pub mod intake;
pub mod responses;
pub mod state;
pub mod streaming;

pub use http::create_router;
pub use state::AppState;
