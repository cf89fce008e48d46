//! Application state
//!
//! Shared across all handlers. Everything is constructor-injected so tests
//! can assemble a state against a scratch configuration directory.

use std::sync::Arc;

use uuid::Uuid;

use llm_gateway_config::{ConfigStore, UserConfig};
use llm_gateway_core::CancellationRegistry;
use llm_gateway_workflows::WorkflowEngine;

#[derive(Clone)]
pub struct AppState {
    /// Config directory view for the active user.
    pub store: Arc<ConfigStore>,
    /// The active user's settings (message policies, port, listings).
    pub user: Arc<UserConfig>,
    /// Process-wide cancellation registry.
    pub registry: Arc<CancellationRegistry>,
    /// Workflow engine handling every dispatched request.
    pub engine: Arc<WorkflowEngine>,
    /// Identity of this gateway process, minted at startup.
    pub instance_id: Arc<String>,
}

impl AppState {
    pub fn new(store: ConfigStore, user: UserConfig) -> Self {
        let registry = Arc::new(CancellationRegistry::new());
        let engine = Arc::new(WorkflowEngine::new(
            store.clone(),
            user.clone(),
            registry.clone(),
        ));
        Self {
            store: Arc::new(store),
            user: Arc::new(user),
            registry,
            engine,
            instance_id: Arc::new(Uuid::new_v4().to_string()),
        }
    }

    pub fn username(&self) -> &str {
        self.store.username()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_assembly() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(
            ConfigStore::new(dir.path(), "test_user"),
            UserConfig::default(),
        );
        assert_eq!(state.username(), "test_user");
        assert!(!state.instance_id.is_empty());
    }
}
