//! Workflow configuration

use serde::{Deserialize, Serialize};

/// One node of a workflow: which endpoint it talks to and how its response
/// is post-processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowNodeConfig {
    /// Endpoint record this node sends its request to.
    pub endpoint_name: String,

    /// Preset record holding this node's generation parameters.
    pub preset: String,

    /// Cap on generated tokens, forwarded under the api-type's
    /// max-new-tokens key.
    pub max_response_size_in_tokens: u64,

    /// Prompts carry `[Sent …]` timestamps; the matching literal is stripped
    /// from response starts.
    #[serde(rename = "addDiscussionIdTimestampsForLLM")]
    pub add_discussion_id_timestamps_for_llm: bool,

    /// Strip one of these literals from the start of the response.
    pub remove_custom_text_from_response_start: bool,
    pub response_start_text_to_remove: Vec<String>,

    /// Generation prompt for group-chat style workflows, e.g. `"Roland:"`.
    /// Reconstructed onto the response when the model omits it.
    pub generation_prompt: Option<String>,
}

impl Default for WorkflowNodeConfig {
    fn default() -> Self {
        Self {
            endpoint_name: String::new(),
            preset: String::new(),
            max_response_size_in_tokens: 400,
            add_discussion_id_timestamps_for_llm: false,
            remove_custom_text_from_response_start: false,
            response_start_text_to_remove: Vec::new(),
            generation_prompt: None,
        }
    }
}

/// A workflow file: an ordered list of nodes. The gateway executes the
/// responder (final) node; upstream nodes belong to the workflow engine
/// proper and are outside this crate's concern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowConfig {
    pub nodes: Vec<WorkflowNodeConfig>,
}

impl WorkflowConfig {
    /// The node whose output is returned to the client.
    pub fn responder(&self) -> Option<&WorkflowNodeConfig> {
        self.nodes.last()
    }
}
