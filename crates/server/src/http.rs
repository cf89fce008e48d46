//! HTTP endpoints
//!
//! The frontend dispatch surface: OpenAI- and Ollama-compatible routes,
//! request-id minting, workflow-override extraction, the tool-probe
//! short-circuit, and the bridge from workflow output to the wire.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use llm_gateway_core::{ApiKind, RequestContext};
use llm_gateway_workflows::{WorkflowError, WorkflowOutput};

use crate::intake::{
    self, is_tool_probe, normalize_ollama_chat, normalize_openai_chat, IncomingMessage,
};
use crate::responses::ResponseBuilder;
use crate::state::AppState;
use crate::streaming::{direct_stream, heartbeat_stream};

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // OpenAI-compatible endpoints (with non-versioned aliases)
        .route("/v1/chat/completions", post(openai_chat))
        .route("/chat/completions", post(openai_chat))
        .route("/v1/completions", post(openai_completions))
        .route("/completions", post(openai_completions))
        .route("/v1/models", get(openai_models))
        .route("/models", get(openai_models))
        // Ollama-compatible endpoints; DELETE cancels by request id
        .route("/api/chat", post(ollama_chat).delete(cancel_request))
        .route("/api/generate", post(ollama_generate).delete(cancel_request))
        .route("/api/tags", get(ollama_tags))
        .route("/api/version", get(ollama_version))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn bad_request(reason: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({"error": reason}))).into_response()
}

fn internal_error(err: &WorkflowError) -> Response {
    tracing::error!(error = %err, "Workflow execution failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": err.to_string()})),
    )
        .into_response()
}

/// Parse a body without caring about the Content-Type header.
fn parse_body(bytes: &Bytes) -> Option<Value> {
    serde_json::from_slice(bytes).ok()
}

/// Validate and decode a `messages` array; every entry needs `role` and
/// `content`.
fn parse_messages(body: &Value) -> Result<Vec<IncomingMessage>, Response> {
    let raw = body
        .get("messages")
        .and_then(Value::as_array)
        .ok_or_else(|| bad_request("The 'messages' field is required."))?;

    let mut messages = Vec::with_capacity(raw.len());
    for entry in raw {
        if entry.get("role").is_none() || entry.get("content").is_none() {
            return Err(bad_request(
                "Each message must have 'role' and 'content' fields.",
            ));
        }
        match serde_json::from_value::<IncomingMessage>(entry.clone()) {
            Ok(message) => messages.push(message),
            Err(_) => {
                return Err(bad_request(
                    "Each message must have 'role' and 'content' fields.",
                ))
            }
        }
    }
    Ok(messages)
}

fn require_model(body: &Value) -> Result<String, Response> {
    match body.get("model").and_then(Value::as_str) {
        Some(model) if !model.is_empty() => Ok(model.to_string()),
        _ => Err(bad_request("The 'model' field is required.")),
    }
}

/// Mint the per-request context: fresh id, dialect, and any workflow
/// override the model field carries.
fn build_context(state: &AppState, api_kind: ApiKind, model: &str) -> RequestContext {
    let workflow_override = intake::parse_model_field(model, &state.store);
    RequestContext::new(api_kind, state.username()).with_override(workflow_override)
}

fn inconsistent_output() -> Response {
    tracing::error!("Workflow output did not match the request's stream flag");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "inconsistent workflow output"})),
    )
        .into_response()
}

/// Wrap a workflow output stream for the wire, heartbeat layer included.
fn streaming_response(state: &AppState, ctx: &RequestContext, output: WorkflowOutput) -> Response {
    let stream = match output {
        WorkflowOutput::Stream(stream) => stream,
        WorkflowOutput::Complete(_) => return inconsistent_output(),
    };

    let body = if state.user.stream_heartbeats {
        heartbeat_stream(
            ctx.api_kind,
            ctx.request_id.clone(),
            state.registry.clone(),
            stream,
        )
    } else {
        direct_stream(ctx.request_id.clone(), state.registry.clone(), stream)
    };

    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(ctx.api_kind.stream_content_type()),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("X-Accel-Buffering", HeaderValue::from_static("no"));
    response
}

/// POST `/v1/chat/completions` (and `/chat/completions`)
async fn openai_chat(State(state): State<AppState>, bytes: Bytes) -> Response {
    let Some(body) = parse_body(&bytes) else {
        return bad_request("Invalid JSON data");
    };
    let model = match require_model(&body) {
        Ok(model) => model,
        Err(response) => return response,
    };
    let messages = match parse_messages(&body) {
        Ok(messages) => messages,
        Err(response) => return response,
    };

    let ctx = build_context(&state, ApiKind::OpenAiChatCompletion, &model);
    tracing::info!(request_id = %ctx.request_id, "ChatCompletions request received");

    let builder = ResponseBuilder::new(&state.store, &state.user);
    if is_tool_probe(&messages) {
        tracing::info!(request_id = %ctx.request_id, "Tool probe detected, returning early");
        return Json(builder.openai_tool_call(&ctx.model_name())).into_response();
    }

    let stream = body.get("stream").and_then(Value::as_bool).unwrap_or(false);
    let transformed = normalize_openai_chat(&messages, &state.user);

    match state.engine.run(&ctx, transformed, stream).await {
        Ok(output) if stream => streaming_response(&state, &ctx, output),
        Ok(WorkflowOutput::Complete(text)) => {
            Json(builder.openai_chat_completion(&text, &ctx.model_name())).into_response()
        }
        Ok(WorkflowOutput::Stream(_)) => {
            inconsistent_output()
        }
        Err(err) => internal_error(&err),
    }
}

/// POST `/v1/completions` (and `/completions`)
async fn openai_completions(State(state): State<AppState>, bytes: Bytes) -> Response {
    let Some(body) = parse_body(&bytes) else {
        return bad_request("Invalid JSON data");
    };
    let model = match require_model(&body) {
        Ok(model) => model,
        Err(response) => return response,
    };

    let ctx = build_context(&state, ApiKind::OpenAiCompletion, &model);
    tracing::info!(request_id = %ctx.request_id, "Completions request received");

    let prompt = body.get("prompt").and_then(Value::as_str).unwrap_or("");
    let stream = body.get("stream").and_then(Value::as_bool).unwrap_or(true);
    let messages = intake::messages_from_prompt(prompt);

    match state.engine.run(&ctx, messages, stream).await {
        Ok(output) if stream => streaming_response(&state, &ctx, output),
        Ok(WorkflowOutput::Complete(text)) => {
            let builder = ResponseBuilder::new(&state.store, &state.user);
            Json(builder.openai_completion(&text, &ctx.model_name())).into_response()
        }
        Ok(WorkflowOutput::Stream(_)) => {
            inconsistent_output()
        }
        Err(err) => internal_error(&err),
    }
}

/// GET `/v1/models` (and `/models`)
async fn openai_models(State(state): State<AppState>) -> Json<Value> {
    Json(ResponseBuilder::new(&state.store, &state.user).openai_models())
}

/// POST `/api/chat`
async fn ollama_chat(State(state): State<AppState>, bytes: Bytes) -> Response {
    let Some(body) = parse_body(&bytes) else {
        return bad_request("Invalid JSON data");
    };
    if body.get("model").is_none() || body.get("messages").is_none() {
        return bad_request("Both 'model' and 'messages' fields are required.");
    }
    let model = match require_model(&body) {
        Ok(model) => model,
        Err(response) => return response,
    };
    let messages = match parse_messages(&body) {
        Ok(messages) => messages,
        Err(response) => return response,
    };

    let ctx = build_context(&state, ApiKind::OllamaChat, &model);
    tracing::info!(request_id = %ctx.request_id, "Ollama chat request received");

    let builder = ResponseBuilder::new(&state.store, &state.user);
    if is_tool_probe(&messages) {
        tracing::info!(request_id = %ctx.request_id, "Tool probe detected, returning early");
        return Json(builder.ollama_tool_call(&ctx.model_name())).into_response();
    }

    // `stream` arrives as a bool or, from some clients, as a string.
    let stream = match body.get("stream") {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(text)) => text.eq_ignore_ascii_case("true"),
        _ => true,
    };
    let transformed = normalize_ollama_chat(&messages, &state.user);

    match state.engine.run(&ctx, transformed, stream).await {
        Ok(output) if stream => streaming_response(&state, &ctx, output),
        Ok(WorkflowOutput::Complete(text)) => {
            Json(builder.ollama_chat(&text, &ctx.model_name(), &ctx.request_id)).into_response()
        }
        Ok(WorkflowOutput::Stream(_)) => {
            inconsistent_output()
        }
        Err(err) => internal_error(&err),
    }
}

/// POST `/api/generate`
async fn ollama_generate(State(state): State<AppState>, bytes: Bytes) -> Response {
    let Some(body) = parse_body(&bytes) else {
        return bad_request("Invalid JSON data");
    };
    let model = match require_model(&body) {
        Ok(model) => model,
        Err(response) => return response,
    };

    let ctx = build_context(&state, ApiKind::OllamaGenerate, &model);
    tracing::info!(request_id = %ctx.request_id, "Ollama generate request received");

    let prompt = body.get("prompt").and_then(Value::as_str).unwrap_or("");
    let system = body.get("system").and_then(Value::as_str).unwrap_or("");
    let stream = body.get("stream").and_then(Value::as_bool).unwrap_or(true);
    let images: Vec<String> = body
        .get("images")
        .and_then(Value::as_array)
        .map(|images| {
            images
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let messages = intake::messages_from_generate(prompt, system, &images);

    match state.engine.run(&ctx, messages, stream).await {
        Ok(output) if stream => streaming_response(&state, &ctx, output),
        Ok(WorkflowOutput::Complete(text)) => {
            let builder = ResponseBuilder::new(&state.store, &state.user);
            Json(builder.ollama_generate(&text, &ctx.model_name(), &ctx.request_id))
                .into_response()
        }
        Ok(WorkflowOutput::Stream(_)) => {
            inconsistent_output()
        }
        Err(err) => internal_error(&err),
    }
}

/// DELETE `/api/chat` and `/api/generate`: cancel by request id.
async fn cancel_request(State(state): State<AppState>, bytes: Bytes) -> Response {
    let Some(body) = parse_body(&bytes) else {
        return bad_request("Invalid JSON data");
    };
    let Some(request_id) = body.get("request_id").and_then(Value::as_str) else {
        return bad_request("The 'request_id' field is required.");
    };
    if request_id.is_empty() {
        return bad_request("The 'request_id' field is required.");
    }

    state.registry.request_cancellation(request_id);
    tracing::info!(request_id, "Cancellation requested via DELETE");
    Json(json!({"status": "cancelled", "request_id": request_id})).into_response()
}

/// GET `/api/tags`
async fn ollama_tags(State(state): State<AppState>) -> Json<Value> {
    Json(ResponseBuilder::new(&state.store, &state.user).ollama_tags())
}

/// GET `/api/version`
async fn ollama_version(State(state): State<AppState>) -> Json<Value> {
    Json(ResponseBuilder::new(&state.store, &state.user).ollama_version())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use llm_gateway_config::{ConfigStore, UserConfig};
    use tower::util::ServiceExt;

    fn test_state(dir: &std::path::Path) -> AppState {
        AppState::new(ConfigStore::new(dir, "test_user"), UserConfig::default())
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            // Deliberately no content-type: intake must tolerate it.
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_models_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let router = create_router(test_state(dir.path()));
        let response = router
            .oneshot(Request::get("/v1/models").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["object"], "list");
        assert_eq!(body["data"][0]["id"], "test_user");
    }

    #[tokio::test]
    async fn test_tags_and_version_endpoints() {
        let dir = tempfile::tempdir().unwrap();
        let router = create_router(test_state(dir.path()));

        let response = router
            .clone()
            .oneshot(Request::get("/api/tags").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["models"][0]["name"], "test_user");

        let response = router
            .oneshot(Request::get("/api/version").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["version"], "0.9");
    }

    #[tokio::test]
    async fn test_missing_model_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let router = create_router(test_state(dir.path()));
        let response = router
            .oneshot(json_request(
                "POST",
                "/v1/chat/completions",
                json!({"messages": [{"role": "user", "content": "hi"}]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("model"));
    }

    #[tokio::test]
    async fn test_missing_messages_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let router = create_router(test_state(dir.path()));
        let response = router
            .oneshot(json_request(
                "POST",
                "/api/chat",
                json!({"model": "test_user"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_message_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let router = create_router(test_state(dir.path()));
        let response = router
            .oneshot(json_request(
                "POST",
                "/v1/chat/completions",
                json!({"model": "test_user", "messages": [{"role": "user"}]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("role"));
    }

    #[tokio::test]
    async fn test_invalid_json_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let router = create_router(test_state(dir.path()));
        let response = router
            .oneshot(
                Request::post("/api/generate")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_openai_tool_probe_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        // No workflow configuration exists, so any engine invocation would
        // surface as a 500; a 200 here proves the short-circuit.
        let router = create_router(test_state(dir.path()));
        let response = router
            .oneshot(json_request(
                "POST",
                "/v1/chat/completions",
                json!({
                    "model": "test_user",
                    "messages": [
                        {"role": "system", "content": crate::intake::TOOL_PROBE_SENTINEL},
                        {"role": "user", "content": "what tools?"}
                    ],
                    "stream": true
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["choices"][0]["finish_reason"], "tool_calls");
        assert_eq!(body["choices"][0]["message"]["tool_calls"], json!([]));
    }

    #[tokio::test]
    async fn test_ollama_tool_probe_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let router = create_router(test_state(dir.path()));
        let response = router
            .oneshot(json_request(
                "POST",
                "/api/chat",
                json!({
                    "model": "test_user",
                    "messages": [
                        {"role": "system", "content": crate::intake::TOOL_PROBE_SENTINEL}
                    ]
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["done"], true);
        assert_eq!(body["done_reason"], "stop");
        assert_eq!(body["message"]["content"], "");
    }

    #[tokio::test]
    async fn test_delete_cancellation_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let registry = state.registry.clone();
        let router = create_router(state);

        let response = router
            .clone()
            .oneshot(json_request(
                "DELETE",
                "/api/chat",
                json!({"request_id": "X"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "cancelled");
        assert_eq!(body["request_id"], "X");
        assert!(registry.is_cancelled("X"));

        // Missing id is a 400.
        let response = router
            .oneshot(json_request("DELETE", "/api/generate", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_workflow_engine_failure_is_500() {
        let dir = tempfile::tempdir().unwrap();
        let router = create_router(test_state(dir.path()));
        let response = router
            .oneshot(json_request(
                "POST",
                "/api/generate",
                json!({"model": "test_user", "prompt": "hi", "stream": false}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
