//! Backend request orchestration
//!
//! [`LlmBackend`] drives one endpoint through its dialect handler: it opens
//! the HTTP call, decodes the stream framing, filters thinking blocks, and
//! yields neutral chunks. Cancellation-aware: an abort callback registered
//! under the request id interrupts an in-flight read immediately, and the
//! read loop re-checks the registry before every line.

use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use futures::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;
use tokio::sync::Notify;

use llm_gateway_core::{CancellationRegistry, NeutralChunk, ChatMessage};
use llm_gateway_config::EndpointConfig;

use crate::handler::{LlmApiHandler, StreamFormat};
use crate::thinking::{remove_thinking_from_text, ThinkRemover};
use crate::LlmError;

/// Rolling buffer cap for first-chunk assistant-prefix assembly.
const FIRST_CHUNK_BUFFER_CAP: usize = 20;

/// Timeouts and retry policy for backend calls.
#[derive(Debug, Clone)]
pub struct BackendClientConfig {
    pub connect_timeout: Duration,
    /// Generous by design: single tokens can be minutes apart during
    /// prefill. Client-facing liveness comes from heartbeats, not from this.
    pub read_timeout: Duration,
    pub retries: u32,
    pub initial_backoff: Duration,
}

impl Default for BackendClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(14_400),
            retries: 3,
            initial_backoff: Duration::from_secs(1),
        }
    }
}

/// One configured backend endpoint plus its dialect handler.
pub struct LlmBackend {
    handler: Arc<dyn LlmApiHandler>,
    client: reqwest::Client,
    registry: Arc<CancellationRegistry>,
    endpoint: EndpointConfig,
    strips_assistant_prefix: bool,
    config: BackendClientConfig,
}

impl LlmBackend {
    pub fn new(
        handler: Box<dyn LlmApiHandler>,
        endpoint: EndpointConfig,
        strips_assistant_prefix: bool,
        registry: Arc<CancellationRegistry>,
        config: BackendClientConfig,
    ) -> Result<Self, LlmError> {
        let mut headers = HeaderMap::new();
        if !endpoint.api_key.is_empty() {
            let value = format!("Bearer {}", endpoint.api_key);
            if let Ok(value) = HeaderValue::from_str(&value) {
                headers.insert(AUTHORIZATION, value);
            }
        }

        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            handler: Arc::from(handler),
            client,
            registry,
            endpoint,
            strips_assistant_prefix,
            config,
        })
    }

    /// Open a streaming call and return the neutral chunk stream.
    ///
    /// The stream always terminates with a `finish_reason == "stop"` chunk,
    /// preceded by any content the think remover was still holding.
    pub async fn stream(
        &self,
        request_id: &str,
        conversation: Vec<ChatMessage>,
        system_prompt: Option<String>,
        prompt: Option<String>,
    ) -> Result<impl Stream<Item = NeutralChunk> + Send + 'static, LlmError> {
        let payload = self.handler.prepare_payload(
            &conversation,
            system_prompt.as_deref(),
            prompt.as_deref(),
            true,
        );
        let url = self.handler.endpoint_url(true);

        let response = self.client.post(&url).json(&payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }
        tracing::info!(request_id, url = %url, status = %status, "Backend stream opened");

        // The abort callback wakes the read loop, which exits and drops the
        // response, closing the upstream connection.
        let cancel = Arc::new(Notify::new());
        {
            let cancel = cancel.clone();
            self.registry
                .register_abort_callback(request_id, move || cancel.notify_one());
        }

        let handler = self.handler.clone();
        let registry = self.registry.clone();
        let format = handler.stream_format();
        let mut remover = ThinkRemover::new(&self.endpoint);
        let mut trimmer = FirstChunkTrimmer::new(
            self.strips_assistant_prefix,
            self.endpoint.trim_beginning_and_end_line_breaks,
        );
        let request_id = request_id.to_string();

        Ok(stream! {
            let mut body = response.bytes_stream();
            // Bytes, not a String: a multi-byte character may straddle two
            // network chunks, so only complete lines get decoded.
            let mut line_buffer: Vec<u8> = Vec::new();
            let mut current_event: Option<String> = None;
            let mut done = false;

            'read: while !done {
                let next = tokio::select! {
                    _ = cancel.notified() => {
                        tracing::info!(request_id, "Backend stream closed by abort callback");
                        break 'read;
                    }
                    next = body.next() => next,
                };
                let Some(chunk) = next else { break };
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        if registry.is_cancelled(&request_id) {
                            tracing::info!(request_id, "Backend read interrupted by cancellation");
                        } else {
                            tracing::error!(request_id, error = %err, "Backend stream read failed");
                        }
                        break;
                    }
                };
                line_buffer.extend_from_slice(&bytes);

                while let Some(newline) = line_buffer.iter().position(|byte| *byte == b'\n') {
                    let line = String::from_utf8_lossy(&line_buffer[..newline])
                        .trim()
                        .to_string();
                    line_buffer.drain(..=newline);

                    if registry.is_cancelled(&request_id) {
                        tracing::info!(request_id, "Cancellation observed, exiting backend read loop");
                        break 'read;
                    }
                    if line.is_empty() {
                        continue;
                    }

                    let data = match format {
                        StreamFormat::LineDelimitedJson => Some(line),
                        StreamFormat::SseAnyEvent | StreamFormat::SseNamedEvent(_) => {
                            if let Some(event) = line.strip_prefix("event:") {
                                current_event = Some(event.trim().to_string());
                                None
                            } else if let Some(payload) = line.strip_prefix("data:") {
                                match format {
                                    StreamFormat::SseNamedEvent(name)
                                        if current_event.as_deref() != Some(name) => None,
                                    _ => Some(payload.trim().to_string()),
                                }
                            } else {
                                None
                            }
                        }
                    };
                    let Some(data) = data else { continue };

                    if data == "[DONE]" {
                        done = true;
                        break;
                    }

                    let Some(parsed) = handler.parse_chunk(&data) else { continue };
                    let at_finish = parsed.finish_reason.is_some();

                    let filtered = remover.process_delta(&parsed.token);
                    if !filtered.is_empty() {
                        if let Some(out) = trimmer.feed(&filtered, at_finish) {
                            if !out.is_empty() {
                                yield NeutralChunk::token(out);
                            }
                        }
                    }

                    if parsed.is_stop() {
                        done = true;
                        break;
                    }
                }
            }

            let residual = trimmer.flush(&remover.finalize());
            if !residual.is_empty() {
                yield NeutralChunk::token(residual);
            }
            yield NeutralChunk::stop();

            registry.unregister_abort_callbacks(&request_id);
        })
    }

    /// Non-streaming call with retry.
    pub async fn generate(
        &self,
        conversation: Vec<ChatMessage>,
        system_prompt: Option<String>,
        prompt: Option<String>,
    ) -> Result<String, LlmError> {
        let payload = self.handler.prepare_payload(
            &conversation,
            system_prompt.as_deref(),
            prompt.as_deref(),
            false,
        );
        let url = self.handler.endpoint_url(false);

        let mut backoff = self.config.initial_backoff;
        let mut last_error = None;

        for attempt in 0..self.config.retries {
            if attempt > 0 {
                tracing::warn!(
                    attempt,
                    retries = self.config.retries,
                    "Backend request failed, retrying in {:?}",
                    backoff
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }

            match self.execute_request(&url, &payload).await {
                Ok(body) => {
                    let text = self.handler.parse_full_response(&body);
                    if text.is_empty() {
                        return Ok(String::new());
                    }

                    let mut text = remove_thinking_from_text(&text, &self.endpoint);
                    if self.endpoint.trim_beginning_and_end_line_breaks {
                        text = text.trim_start().to_string();
                    }
                    if text.contains("Assistant:") {
                        text = remove_assistant_prefix(&text);
                    }
                    tracing::debug!(chars = text.len(), "Backend returned full response");
                    return Ok(text);
                }
                Err(err) if Self::is_retryable(&err) => last_error = Some(err),
                Err(err) => return Err(err),
            }
        }

        Err(last_error
            .unwrap_or_else(|| LlmError::Network("Max retries exceeded".to_string())))
    }

    async fn execute_request(&self, url: &str, payload: &Value) -> Result<Value, LlmError> {
        let response = self.client.post(url).json(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json()
            .await
            .map_err(|err| LlmError::InvalidResponse(err.to_string()))
    }

    /// Network failures and backend 5xx are worth retrying; 4xx are not.
    fn is_retryable(error: &LlmError) -> bool {
        match error {
            LlmError::Network(_) => true,
            LlmError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Strip a leading `Assistant:` marker, tolerating surrounding whitespace.
pub fn remove_assistant_prefix(text: &str) -> String {
    let text = text.trim_start();
    match text.strip_prefix("Assistant:") {
        Some(rest) => rest.trim_start().to_string(),
        None => text.to_string(),
    }
}

/// Rolling buffer over the first tokens of a stream, so a stale
/// `Assistant:` echoed by the backend can be stripped before anything
/// reaches the client. Past the cap (or the finish signal) tokens pass
/// through untouched.
struct FirstChunkTrimmer {
    strip_assistant: bool,
    lstrip: bool,
    buffer: String,
    processed: bool,
}

impl FirstChunkTrimmer {
    fn new(strip_assistant: bool, lstrip: bool) -> Self {
        Self {
            strip_assistant,
            lstrip,
            buffer: String::new(),
            processed: false,
        }
    }

    /// Feed filtered content; returns the content to emit once the prefix
    /// question is settled, `None` while still buffering.
    fn feed(&mut self, content: &str, at_finish: bool) -> Option<String> {
        if self.processed {
            return Some(content.to_string());
        }

        self.buffer.push_str(content);
        if self.lstrip {
            let trimmed = self.buffer.trim_start();
            if trimmed.len() != self.buffer.len() {
                self.buffer = trimmed.to_string();
            }
        }

        if self.strip_assistant && self.buffer.contains("Assistant:") {
            self.processed = true;
            return Some(remove_assistant_prefix(&std::mem::take(&mut self.buffer)));
        }
        if self.buffer.chars().count() > FIRST_CHUNK_BUFFER_CAP || at_finish {
            self.processed = true;
            return Some(std::mem::take(&mut self.buffer));
        }
        None
    }

    /// Combine whatever is still buffered with the remover's residual.
    fn flush(&mut self, residual: &str) -> String {
        if self.processed {
            residual.to_string()
        } else {
            let mut out = std::mem::take(&mut self.buffer);
            out.push_str(residual);
            out.trim_start().to_string()
        }
    }
}
