//! Workflow execution
//!
//! The engine resolves which workflow a request runs (the request's
//! override, or the user's configured default), executes its responder node
//! against the configured backend, and shapes the output for the client's
//! dialect via the [`transformer::StreamTransformer`].

pub mod engine;
pub mod transformer;

pub use engine::{WorkflowEngine, WorkflowOutput};
pub use transformer::{StreamTransformer, TransformerOptions};

use thiserror::Error;

/// Workflow execution errors
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error(transparent)]
    Config(#[from] llm_gateway_config::ConfigError),

    #[error(transparent)]
    Llm(#[from] llm_gateway_llm::LlmError),

    #[error("Workflow '{0}' has no nodes")]
    EmptyWorkflow(String),
}
