//! Per-request context
//!
//! One `RequestContext` exists per in-flight HTTP request. It carries the
//! minted request id, the frontend dialect and the workflow override, and is
//! passed explicitly through the workflow engine rather than living in
//! process-wide state.

use uuid::Uuid;

use crate::api::ApiKind;

#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique id for this request, echoed in logs and response correlation
    /// fields and used as the cancellation-registry key.
    pub request_id: String,
    /// Frontend dialect the client expects responses in.
    pub api_kind: ApiKind,
    /// Workflow name extracted from the request's `model` field, if the
    /// client asked for a specific shared workflow.
    pub workflow_override: Option<String>,
    /// User the gateway is serving; doubles as the advertised model name.
    pub username: String,
}

impl RequestContext {
    /// Mint a fresh context with a new request id.
    pub fn new(api_kind: ApiKind, username: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            api_kind,
            workflow_override: None,
            username: username.into(),
        }
    }

    pub fn with_override(mut self, workflow_override: Option<String>) -> Self {
        self.workflow_override = workflow_override;
        self
    }

    /// Model name reported to clients: `<user>` or `<user>:<workflow>` when
    /// an override is active.
    pub fn model_name(&self) -> String {
        match &self.workflow_override {
            Some(workflow) => format!("{}:{}", self.username, workflow),
            None => self.username.clone(),
        }
    }
}
