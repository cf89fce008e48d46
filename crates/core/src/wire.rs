//! Frontend wire-format builders
//!
//! Streaming chunk payloads and SSE/NDJSON framing for each supported
//! frontend dialect. Non-streaming response bodies live with the server's
//! response builder; only the per-token shapes shared by the stream
//! transformer and the heartbeat layer are defined here.

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::api::ApiKind;

/// Fingerprint echoed in OpenAI-style streaming chunks.
const SYSTEM_FINGERPRINT: &str = "fp_44709d6fcb";

/// Build one streaming chunk payload in the given dialect.
///
/// `finish_reason == Some("stop")` marks the terminal frame (`done: true`
/// for Ollama dialects). When `request_id` is provided it is echoed into the
/// payload for client-side correlation.
pub fn build_response_json(
    api_kind: ApiKind,
    token: &str,
    finish_reason: Option<&str>,
    model_name: &str,
    request_id: Option<&str>,
) -> String {
    let timestamp = Utc::now().timestamp();
    let created_at_iso = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();

    let done = finish_reason == Some("stop");
    let mut response = match api_kind {
        ApiKind::OllamaGenerate => json!({
            "model": model_name,
            "created_at": created_at_iso,
            "response": token,
            "done": done,
        }),
        ApiKind::OllamaChat => json!({
            "model": model_name,
            "created_at": created_at_iso,
            "message": {
                "role": "assistant",
                "content": token,
            },
            "done": done,
        }),
        ApiKind::OpenAiCompletion => json!({
            "id": format!("cmpl-{}", Uuid::new_v4()),
            "object": "text_completion",
            "created": timestamp,
            "choices": [{
                "text": token,
                "index": 0,
                "logprobs": null,
                "finish_reason": finish_reason,
            }],
            "model": model_name,
            "system_fingerprint": SYSTEM_FINGERPRINT,
        }),
        ApiKind::OpenAiChatCompletion => json!({
            "id": format!("chatcmpl-{}", Uuid::new_v4()),
            "object": "chat.completion.chunk",
            "created": timestamp,
            "model": model_name,
            "system_fingerprint": SYSTEM_FINGERPRINT,
            "choices": [{
                "index": 0,
                "delta": { "content": token },
                "logprobs": null,
                "finish_reason": finish_reason,
            }],
        }),
    };

    // The Ollama terminal frame carries a done_reason and nominal timing
    // fields alongside done: true.
    if done && api_kind.is_ollama() {
        response["done_reason"] = json!("stop");
        for field in [
            "total_duration",
            "load_duration",
            "prompt_eval_count",
            "prompt_eval_duration",
            "eval_count",
            "eval_duration",
        ] {
            response[field] = json!(0);
        }
    }

    if let Some(id) = request_id {
        response["request_id"] = json!(id);
    }

    response.to_string()
}

/// Frame one payload for the wire: `data: …\n\n` for OpenAI dialects, a bare
/// NDJSON line for Ollama dialects.
pub fn sse_format(data: &str, api_kind: ApiKind) -> String {
    if api_kind.is_ollama() {
        format!("{data}\n")
    } else {
        format!("data: {data}\n\n")
    }
}

/// Keep-alive frame emitted while the backend is still prefilling.
///
/// The OpenAI frame is an SSE comment; the Ollama frame has to be a valid
/// NDJSON line, so an empty-content assistant message is used. Clients that
/// render empty-content frames will see spurious empty tokens from the
/// latter; that matches the Ollama dialect's documented limitation.
pub fn heartbeat_frame(api_kind: ApiKind) -> &'static [u8] {
    if api_kind.is_ollama() {
        b"{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":false}\n"
    } else {
        b":\n\n"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn parse(api_kind: ApiKind, token: &str, finish: Option<&str>) -> Value {
        let raw = build_response_json(api_kind, token, finish, "test_user", None);
        serde_json::from_str(&raw).unwrap()
    }

    #[test]
    fn test_openai_chat_chunk_shape() {
        let chunk = parse(ApiKind::OpenAiChatCompletion, "Hel", None);
        assert_eq!(chunk["object"], "chat.completion.chunk");
        assert_eq!(chunk["choices"][0]["delta"]["content"], "Hel");
        assert!(chunk["choices"][0]["finish_reason"].is_null());
        assert_eq!(chunk["system_fingerprint"], SYSTEM_FINGERPRINT);
        assert!(chunk["id"].as_str().unwrap().starts_with("chatcmpl-"));
    }

    #[test]
    fn test_openai_completion_chunk_shape() {
        let chunk = parse(ApiKind::OpenAiCompletion, "lo", Some("stop"));
        assert_eq!(chunk["object"], "text_completion");
        assert_eq!(chunk["choices"][0]["text"], "lo");
        assert_eq!(chunk["choices"][0]["finish_reason"], "stop");
        assert!(chunk["id"].as_str().unwrap().starts_with("cmpl-"));
    }

    #[test]
    fn test_ollama_generate_chunk_shape() {
        let chunk = parse(ApiKind::OllamaGenerate, "Hel", None);
        assert_eq!(chunk["model"], "test_user");
        assert_eq!(chunk["response"], "Hel");
        assert_eq!(chunk["done"], false);

        let last = parse(ApiKind::OllamaGenerate, "", Some("stop"));
        assert_eq!(last["done"], true);
        assert_eq!(last["done_reason"], "stop");
        assert_eq!(last["eval_duration"], 0);
    }

    #[test]
    fn test_ollama_chat_chunk_shape() {
        let chunk = parse(ApiKind::OllamaChat, "hi", None);
        assert_eq!(chunk["message"]["role"], "assistant");
        assert_eq!(chunk["message"]["content"], "hi");
        assert_eq!(chunk["done"], false);
    }

    #[test]
    fn test_request_id_echo() {
        let raw =
            build_response_json(ApiKind::OllamaChat, "x", None, "test_user", Some("req-42"));
        let chunk: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(chunk["request_id"], "req-42");
    }

    #[test]
    fn test_sse_framing() {
        assert_eq!(
            sse_format("{}", ApiKind::OpenAiChatCompletion),
            "data: {}\n\n"
        );
        assert_eq!(sse_format("{}", ApiKind::OllamaChat), "{}\n");
    }

    #[test]
    fn test_heartbeats() {
        assert_eq!(heartbeat_frame(ApiKind::OpenAiChatCompletion), b":\n\n");
        let ollama = heartbeat_frame(ApiKind::OllamaChat);
        let parsed: Value = serde_json::from_slice(&ollama[..ollama.len() - 1]).unwrap();
        assert_eq!(parsed["message"]["content"], "");
        assert_eq!(parsed["done"], false);
    }
}
