//! Per-user configuration

use serde::{Deserialize, Serialize};

/// The selected user's gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserConfig {
    /// Port the gateway listens on (bound to 0.0.0.0).
    pub port: u16,

    /// Prefix message content with `User: ` / `Assistant: ` markers.
    pub chat_complete_add_user_assistant: bool,

    /// Append a trailing assistant message when the conversation does not
    /// already end with one.
    pub chat_completion_add_missing_assistant_generator: bool,

    /// Workflow executed when a request carries no override.
    pub custom_workflow: String,

    /// Advertise the `_shared` workflow folder as selectable models.
    pub allow_shared_workflows: bool,

    /// Emit heartbeat frames while the backend is prefilling. When disabled
    /// the streaming layer forwards chunks directly; disconnect detection is
    /// then delayed until the next write.
    pub stream_heartbeats: bool,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            port: 8765,
            chat_complete_add_user_assistant: false,
            chat_completion_add_missing_assistant_generator: false,
            custom_workflow: "DefaultWorkflow".to_string(),
            allow_shared_workflows: false,
            stream_heartbeats: true,
        }
    }
}

impl UserConfig {
    /// Both marker policies enabled: the `Assistant:` prefix-stripping rules
    /// apply on the way back out.
    pub fn strips_assistant_prefix(&self) -> bool {
        self.chat_complete_add_user_assistant
            && self.chat_completion_add_missing_assistant_generator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = UserConfig::default();
        assert_eq!(config.port, 8765);
        assert!(!config.allow_shared_workflows);
        assert!(config.stream_heartbeats);
        assert!(!config.strips_assistant_prefix());
    }

    #[test]
    fn test_camel_case_fields() {
        let config: UserConfig = serde_json::from_str(
            r#"{
                "port": 5000,
                "chatCompleteAddUserAssistant": true,
                "chatCompletionAddMissingAssistantGenerator": true,
                "customWorkflow": "AssistantWorkflow",
                "allowSharedWorkflows": true
            }"#,
        )
        .unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.custom_workflow, "AssistantWorkflow");
        assert!(config.strips_assistant_prefix());
    }
}
