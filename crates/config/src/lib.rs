//! Gateway configuration
//!
//! Configuration lives as a directory of JSON records: one file per user,
//! endpoint, api-type, preset and workflow. This crate owns the typed record
//! definitions and the loader; everything downstream only reads them.

pub mod api_type;
pub mod endpoint;
pub mod loader;
pub mod preset;
pub mod user;
pub mod workflow;

pub use api_type::ApiTypeConfig;
pub use endpoint::EndpointConfig;
pub use loader::ConfigStore;
pub use preset::Preset;
pub use user::UserConfig;
pub use workflow::{WorkflowConfig, WorkflowNodeConfig};

use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unknown workflow: {0}")]
    UnknownWorkflow(String),
}
