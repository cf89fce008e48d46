//! Single-responder workflow engine

use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;

use llm_gateway_config::{ConfigStore, Preset, UserConfig};
use llm_gateway_core::{CancellationRegistry, ChatMessage, RequestContext};
use llm_gateway_llm::{build_handler, BackendClientConfig, LlmBackend};

use crate::transformer::{StreamTransformer, TransformerOptions};
use crate::WorkflowError;

/// What a workflow run hands back to the dispatcher.
pub enum WorkflowOutput {
    /// Non-streaming: the complete, post-processed text.
    Complete(String),
    /// Streaming: already-framed wire strings, ready to byte-encode.
    Stream(BoxStream<'static, String>),
}

/// Resolves and runs the workflow for a request.
///
/// A request either names a shared workflow through its model field (the
/// override) or falls back to the user's configured workflow. Prompt
/// routing beyond that is somebody else's job; this engine always executes
/// the resolved workflow's responder node.
pub struct WorkflowEngine {
    store: ConfigStore,
    user: UserConfig,
    registry: Arc<CancellationRegistry>,
    client_config: BackendClientConfig,
}

impl WorkflowEngine {
    pub fn new(
        store: ConfigStore,
        user: UserConfig,
        registry: Arc<CancellationRegistry>,
    ) -> Self {
        Self {
            store,
            user,
            registry,
            client_config: BackendClientConfig::default(),
        }
    }

    pub fn with_client_config(mut self, client_config: BackendClientConfig) -> Self {
        self.client_config = client_config;
        self
    }

    /// Execute the workflow for one request.
    pub async fn run(
        &self,
        ctx: &RequestContext,
        messages: Vec<ChatMessage>,
        stream: bool,
    ) -> Result<WorkflowOutput, WorkflowError> {
        let workflow_name = match &ctx.workflow_override {
            Some(name) => {
                tracing::info!(
                    request_id = %ctx.request_id,
                    workflow = %name,
                    "Workflow override active, bypassing routing"
                );
                name.clone()
            }
            None => self.user.custom_workflow.clone(),
        };

        let workflow = self.store.load_workflow(&workflow_name)?;
        let node = workflow
            .responder()
            .ok_or_else(|| WorkflowError::EmptyWorkflow(workflow_name.clone()))?
            .clone();

        let endpoint = self.store.load_endpoint(&node.endpoint_name)?;
        let api_type = self.store.load_api_type(&endpoint.api_type_config_file_name)?;
        let preset = if node.preset.is_empty() {
            Preset::default()
        } else {
            self.store.load_preset(&api_type.preset_type, &node.preset)?
        };

        tracing::debug!(
            request_id = %ctx.request_id,
            workflow = %workflow_name,
            endpoint = %node.endpoint_name,
            api_type = %api_type.api_type,
            stream,
            "Executing responder node"
        );

        let handler =
            build_handler(&api_type, &endpoint, preset, node.max_response_size_in_tokens)?;
        let backend = LlmBackend::new(
            handler,
            endpoint.clone(),
            self.user.strips_assistant_prefix(),
            self.registry.clone(),
            self.client_config.clone(),
        )?;

        if stream {
            let chunks = backend
                .stream(&ctx.request_id, messages, None, None)
                .await?;
            let transformer = StreamTransformer::new(
                &endpoint,
                &node,
                TransformerOptions {
                    api_kind: ctx.api_kind,
                    model_name: ctx.model_name(),
                    request_id: Some(ctx.request_id.clone()),
                    generation_prompt: node.generation_prompt.clone(),
                    strips_assistant_prefix: self.user.strips_assistant_prefix(),
                },
            );
            Ok(WorkflowOutput::Stream(
                transformer.into_stream(chunks).boxed(),
            ))
        } else {
            let text = backend.generate(messages, None, None).await?;
            Ok(WorkflowOutput::Complete(text))
        }
    }
}
