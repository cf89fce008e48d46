//! Core types shared across the gateway
//!
//! Holds the dialect-neutral data model (messages, stream chunks, request
//! context), the frontend wire-format builders, and the process-wide
//! cancellation registry.

pub mod api;
pub mod cancellation;
pub mod chunk;
pub mod context;
pub mod message;
pub mod prompt;
pub mod wire;

pub use api::ApiKind;
pub use cancellation::CancellationRegistry;
pub use chunk::NeutralChunk;
pub use context::RequestContext;
pub use message::{ChatMessage, ROLE_ASSISTANT, ROLE_IMAGES, ROLE_SYSTEM, ROLE_USER};
pub use prompt::parse_conversation;
pub use wire::{build_response_json, heartbeat_frame, sse_format};
