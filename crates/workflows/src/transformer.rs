//! Client-facing stream shaping
//!
//! [`StreamTransformer`] turns the neutral chunk stream coming out of a
//! backend handler into framed wire-format strings for the client's
//! dialect. On the way it repairs the start of the response: group-chat
//! speaker reconstruction, configured literal prefixes, prompt timestamps
//! and stale `Assistant:` markers are handled with optimistic prefix
//! matching, so that well-behaved streams pass through with no added
//! latency once the first bytes rule every prefix out.

use futures::{Stream, StreamExt};

use llm_gateway_config::{EndpointConfig, WorkflowNodeConfig};
use llm_gateway_core::{build_response_json, sse_format, ApiKind, NeutralChunk};

const TIMESTAMP_TEXT: &str = "[Sent less than a minute ago]";

/// Non-prefix-related construction inputs.
#[derive(Debug, Clone)]
pub struct TransformerOptions {
    pub api_kind: ApiKind,
    pub model_name: String,
    /// Echoed into every emitted frame when present.
    pub request_id: Option<String>,
    /// Speaker prefix to reconstruct for group-chat workflows, e.g.
    /// `"Roland:"`.
    pub generation_prompt: Option<String>,
    /// Both add-user/assistant policies are active, so a leading
    /// `Assistant:` must be stripped.
    pub strips_assistant_prefix: bool,
}

/// Stateful per-stream transformer. Drive it with [`Self::process_chunk`]
/// and [`Self::finalize`], or wrap a whole stream with
/// [`Self::into_stream`].
pub struct StreamTransformer {
    options: TransformerOptions,

    workflow_custom_enabled: bool,
    workflow_literals: Vec<String>,
    endpoint_custom_enabled: bool,
    endpoint_literals: Vec<String>,
    add_timestamps: bool,
    trim_whitespace: bool,

    /// Every literal the buffer could still turn out to start with.
    prefixes_to_strip: Vec<String>,
    prefix_buffer_limit: usize,
    should_buffer: bool,

    prefix_buffer: String,
    prefixes_processed: bool,
    reconstruction_applied: bool,
    full_response_text: String,
}

impl StreamTransformer {
    pub fn new(
        endpoint: &EndpointConfig,
        node: &WorkflowNodeConfig,
        options: TransformerOptions,
    ) -> Self {
        let workflow_custom_enabled = node.remove_custom_text_from_response_start;
        let endpoint_custom_enabled =
            endpoint.remove_custom_text_from_response_start_endpoint_wide;

        let workflow_literals: Vec<String> = node
            .response_start_text_to_remove
            .iter()
            .filter(|text| !text.is_empty())
            .cloned()
            .collect();
        let endpoint_literals: Vec<String> = endpoint
            .response_start_text_to_remove_endpoint_wide
            .iter()
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .collect();

        let mut prefixes_to_strip = Vec::new();
        if workflow_custom_enabled {
            prefixes_to_strip.extend(workflow_literals.iter().cloned());
        }
        if endpoint_custom_enabled {
            prefixes_to_strip.extend(endpoint_literals.iter().cloned());
        }
        if node.add_discussion_id_timestamps_for_llm {
            prefixes_to_strip.push(TIMESTAMP_TEXT.to_string());
            prefixes_to_strip.push(format!("{TIMESTAMP_TEXT} "));
        }
        if options.strips_assistant_prefix {
            prefixes_to_strip.push("Assistant:".to_string());
        }
        prefixes_to_strip.sort();
        prefixes_to_strip.dedup();

        let prefix_buffer_limit = if workflow_custom_enabled && endpoint_custom_enabled {
            200
        } else {
            100
        };

        let stripping_needed = endpoint.trim_beginning_and_end_line_breaks
            || workflow_custom_enabled
            || endpoint_custom_enabled
            || node.add_discussion_id_timestamps_for_llm
            || options.strips_assistant_prefix;
        let should_buffer = stripping_needed || options.generation_prompt.is_some();

        Self {
            trim_whitespace: endpoint.trim_beginning_and_end_line_breaks,
            add_timestamps: node.add_discussion_id_timestamps_for_llm,
            options,
            workflow_custom_enabled,
            workflow_literals,
            endpoint_custom_enabled,
            endpoint_literals,
            prefixes_to_strip,
            prefix_buffer_limit,
            should_buffer,
            prefix_buffer: String::new(),
            prefixes_processed: false,
            reconstruction_applied: false,
            full_response_text: String::new(),
        }
    }

    /// Concatenation of all content fragments emitted so far, for logging
    /// and downstream summarization.
    pub fn full_response_text(&self) -> &str {
        &self.full_response_text
    }

    /// Whether more of the configured prefixes could still match: the
    /// buffer partially matches, or is a prefix of, some literal. Once this
    /// is false the buffer can be released immediately.
    fn matches_partial_prefix(&self) -> bool {
        let lstripped = self.prefix_buffer.trim_start();
        if lstripped.is_empty() {
            // Possibly just leading whitespace before a prefix; keep going.
            return true;
        }
        self.prefixes_to_strip
            .iter()
            .any(|prefix| prefix.starts_with(lstripped) || lstripped.starts_with(prefix))
    }

    fn requires_complex_buffering(&self) -> bool {
        self.options.generation_prompt.is_some() || !self.prefixes_to_strip.is_empty()
    }

    /// Apply reconstruction and the sequential prefix-stripping rules to the
    /// buffered start of the stream.
    fn process_prefixes_from_buffer(&mut self) -> String {
        let mut content = std::mem::take(&mut self.prefix_buffer);

        if let Some(generation_prompt) = &self.options.generation_prompt {
            if !self.reconstruction_applied {
                let lstripped = content.trim_start();
                let llm_has_prefix = lstripped
                    .split_whitespace()
                    .next()
                    .is_some_and(|word| word.ends_with(':'));
                if !llm_has_prefix {
                    tracing::debug!(
                        prompt = %generation_prompt.trim(),
                        "Reconstructing group-chat speaker prefix"
                    );
                    content = format!("{} {}", generation_prompt.trim(), lstripped);
                    self.reconstruction_applied = true;
                }
            }
        }

        let mut content = content.trim_start().to_string();

        if self.workflow_custom_enabled {
            for literal in &self.workflow_literals {
                if content.starts_with(literal.as_str()) {
                    content = content[literal.len()..].trim_start().to_string();
                    break;
                }
            }
        }

        if self.endpoint_custom_enabled {
            for literal in &self.endpoint_literals {
                if content.starts_with(literal.as_str()) {
                    content = content[literal.len()..].trim_start().to_string();
                    break;
                }
            }
        }

        if self.add_timestamps {
            if let Some(rest) = content.strip_prefix(TIMESTAMP_TEXT) {
                content = rest.strip_prefix(' ').unwrap_or(rest).trim_start().to_string();
            }
        }

        if self.options.strips_assistant_prefix {
            if let Some(rest) = content.strip_prefix("Assistant:") {
                content = rest.trim_start().to_string();
            }
        }

        content
    }

    fn frame(&self, token: &str, finish_reason: Option<&str>) -> String {
        let payload = build_response_json(
            self.options.api_kind,
            token,
            finish_reason,
            &self.options.model_name,
            self.options.request_id.as_deref(),
        );
        sse_format(&payload, self.options.api_kind)
    }

    /// Consume one neutral chunk; returns zero or more framed strings.
    ///
    /// The caller stops feeding chunks once one carries a finish reason,
    /// then calls [`Self::finalize`].
    pub fn process_chunk(&mut self, chunk: &NeutralChunk) -> Vec<String> {
        let mut content_to_yield = String::new();

        if self.should_buffer && !self.prefixes_processed {
            self.prefix_buffer.push_str(&chunk.token);

            let buffer_full =
                self.prefix_buffer.chars().count() > self.prefix_buffer_limit;
            let is_done = chunk.finish_reason.is_some();

            let should_process = if self.requires_complex_buffering() {
                if !self.matches_partial_prefix() {
                    tracing::debug!("Optimistic prefix match failed, releasing buffer");
                    true
                } else {
                    buffer_full || is_done
                }
            } else if self.trim_whitespace {
                !self.prefix_buffer.trim().is_empty() || is_done
            } else {
                buffer_full || is_done
            };

            if should_process {
                content_to_yield = self.process_prefixes_from_buffer();
                self.prefixes_processed = true;
            }
        } else {
            content_to_yield = chunk.token.clone();
        }

        if content_to_yield.is_empty() {
            Vec::new()
        } else {
            self.full_response_text.push_str(&content_to_yield);
            vec![self.frame(&content_to_yield, None)]
        }
    }

    /// Flush the buffer if it never released, then emit the terminal frame
    /// (and the `[DONE]` marker for OpenAI dialects).
    pub fn finalize(&mut self) -> Vec<String> {
        let mut frames = Vec::new();

        if self.should_buffer && !self.prefixes_processed {
            let content = self.process_prefixes_from_buffer();
            self.prefixes_processed = true;
            if !content.is_empty() {
                self.full_response_text.push_str(&content);
                frames.push(self.frame(&content, None));
            }
        }

        frames.push(self.frame("", Some("stop")));
        if !self.options.api_kind.is_ollama() {
            frames.push(sse_format("[DONE]", self.options.api_kind));
        }
        frames
    }

    /// Wrap an entire neutral chunk stream into a framed string stream.
    pub fn into_stream(
        mut self,
        input: impl Stream<Item = NeutralChunk> + Send + 'static,
    ) -> impl Stream<Item = String> + Send + 'static {
        async_stream::stream! {
            futures::pin_mut!(input);
            while let Some(chunk) = input.next().await {
                for frame in self.process_chunk(&chunk) {
                    yield frame;
                }
                if chunk.finish_reason.is_some() {
                    break;
                }
            }
            for frame in self.finalize() {
                yield frame;
            }
            tracing::debug!(
                chars = self.full_response_text.len(),
                "Stream transform complete"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn options(api_kind: ApiKind) -> TransformerOptions {
        TransformerOptions {
            api_kind,
            model_name: "test_user".to_string(),
            request_id: None,
            generation_prompt: None,
            strips_assistant_prefix: false,
        }
    }

    fn plain_transformer(api_kind: ApiKind) -> StreamTransformer {
        StreamTransformer::new(
            &EndpointConfig::default(),
            &WorkflowNodeConfig::default(),
            options(api_kind),
        )
    }

    fn run(transformer: &mut StreamTransformer, tokens: &[&str]) -> Vec<String> {
        let mut frames = Vec::new();
        for token in tokens {
            frames.extend(transformer.process_chunk(&NeutralChunk::token(*token)));
        }
        frames.extend(transformer.process_chunk(&NeutralChunk::stop()));
        frames.extend(transformer.finalize());
        frames
    }

    fn content_of(frame: &str, api_kind: ApiKind) -> String {
        let raw = frame
            .strip_prefix("data: ")
            .unwrap_or(frame)
            .trim_end();
        let parsed: Value = serde_json::from_str(raw).unwrap();
        match api_kind {
            ApiKind::OpenAiChatCompletion => parsed["choices"][0]["delta"]["content"]
                .as_str()
                .unwrap_or("")
                .to_string(),
            ApiKind::OpenAiCompletion => parsed["choices"][0]["text"]
                .as_str()
                .unwrap_or("")
                .to_string(),
            ApiKind::OllamaGenerate => {
                parsed["response"].as_str().unwrap_or("").to_string()
            }
            ApiKind::OllamaChat => parsed["message"]["content"]
                .as_str()
                .unwrap_or("")
                .to_string(),
        }
    }

    #[test]
    fn test_identity_when_no_rules_active() {
        let mut transformer = plain_transformer(ApiKind::OllamaGenerate);
        let frames = run(&mut transformer, &["Hel", "lo ", "world"]);

        // Three content frames plus the terminal frame; no [DONE] for Ollama.
        assert_eq!(frames.len(), 4);
        let text: String = frames[..3]
            .iter()
            .map(|frame| content_of(frame, ApiKind::OllamaGenerate))
            .collect();
        assert_eq!(text, "Hello world");
        assert_eq!(transformer.full_response_text(), "Hello world");

        let last: Value = serde_json::from_str(frames[3].trim_end()).unwrap();
        assert_eq!(last["done"], true);
    }

    #[test]
    fn test_openai_frame_sequence_ends_with_done_marker() {
        let mut transformer = plain_transformer(ApiKind::OpenAiChatCompletion);
        let frames = run(&mut transformer, &["Hel", "lo"]);

        assert_eq!(frames.len(), 4);
        assert!(frames.iter().all(|frame| frame.starts_with("data: ")));
        assert_eq!(frames[3], "data: [DONE]\n\n");

        let terminal: Value =
            serde_json::from_str(frames[2].strip_prefix("data: ").unwrap().trim_end()).unwrap();
        assert_eq!(terminal["choices"][0]["finish_reason"], "stop");
    }

    #[test]
    fn test_workflow_then_endpoint_literal_stripping() {
        let endpoint = EndpointConfig {
            remove_custom_text_from_response_start_endpoint_wide: true,
            response_start_text_to_remove_endpoint_wide: vec![" Sure, ".to_string()],
            ..EndpointConfig::default()
        };
        let node = WorkflowNodeConfig {
            remove_custom_text_from_response_start: true,
            response_start_text_to_remove: vec!["Roland:".to_string()],
            ..WorkflowNodeConfig::default()
        };
        let mut transformer =
            StreamTransformer::new(&endpoint, &node, options(ApiKind::OllamaGenerate));

        // Each rule consumes what the previous one left behind.
        let frames = run(&mut transformer, &["Roland: Sure, here it is"]);
        assert_eq!(transformer.full_response_text(), "here it is");
        assert!(!frames.is_empty());
    }

    #[test]
    fn test_at_most_one_workflow_literal_removed() {
        let node = WorkflowNodeConfig {
            remove_custom_text_from_response_start: true,
            response_start_text_to_remove: vec!["Aa".to_string(), "Bb".to_string()],
            ..WorkflowNodeConfig::default()
        };
        let mut transformer = StreamTransformer::new(
            &EndpointConfig::default(),
            &node,
            options(ApiKind::OllamaGenerate),
        );
        run(&mut transformer, &["AaBb rest"]);
        // Only the first matching literal goes; "Bb" survives.
        assert_eq!(transformer.full_response_text(), "Bb rest");
    }

    #[test]
    fn test_timestamp_stripping_with_and_without_space() {
        for input in [
            "[Sent less than a minute ago] reply",
            "[Sent less than a minute ago]reply",
        ] {
            let node = WorkflowNodeConfig {
                add_discussion_id_timestamps_for_llm: true,
                ..WorkflowNodeConfig::default()
            };
            let mut transformer = StreamTransformer::new(
                &EndpointConfig::default(),
                &node,
                options(ApiKind::OllamaGenerate),
            );
            run(&mut transformer, &[input]);
            assert_eq!(transformer.full_response_text(), "reply");
        }
    }

    #[test]
    fn test_assistant_prefix_stripping() {
        let mut transformer = StreamTransformer::new(
            &EndpointConfig::default(),
            &WorkflowNodeConfig::default(),
            TransformerOptions {
                strips_assistant_prefix: true,
                ..options(ApiKind::OpenAiChatCompletion)
            },
        );
        run(&mut transformer, &["Assistant: hi there"]);
        assert_eq!(transformer.full_response_text(), "hi there");
    }

    #[test]
    fn test_reconstruction_when_speaker_missing() {
        let mut transformer = StreamTransformer::new(
            &EndpointConfig::default(),
            &WorkflowNodeConfig::default(),
            TransformerOptions {
                generation_prompt: Some("Roland:".to_string()),
                ..options(ApiKind::OllamaGenerate)
            },
        );
        run(&mut transformer, &["hello there"]);
        assert_eq!(transformer.full_response_text(), "Roland: hello there");
    }

    #[test]
    fn test_no_reconstruction_when_speaker_present() {
        let mut transformer = StreamTransformer::new(
            &EndpointConfig::default(),
            &WorkflowNodeConfig::default(),
            TransformerOptions {
                generation_prompt: Some("Roland:".to_string()),
                ..options(ApiKind::OllamaGenerate)
            },
        );
        run(&mut transformer, &["Marcus: hello"]);
        assert_eq!(transformer.full_response_text(), "Marcus: hello");
    }

    #[test]
    fn test_optimistic_release_on_first_mismatch() {
        let node = WorkflowNodeConfig {
            remove_custom_text_from_response_start: true,
            response_start_text_to_remove: vec!["Roland:".to_string()],
            ..WorkflowNodeConfig::default()
        };
        let mut transformer = StreamTransformer::new(
            &EndpointConfig::default(),
            &node,
            options(ApiKind::OllamaGenerate),
        );

        // "xy" cannot start any configured literal, so the very first chunk
        // is released instead of being buffered.
        let frames = transformer.process_chunk(&NeutralChunk::token("xy"));
        assert_eq!(frames.len(), 1);
        assert_eq!(content_of(&frames[0], ApiKind::OllamaGenerate), "xy");
    }

    #[test]
    fn test_live_prefix_candidate_keeps_buffering() {
        let node = WorkflowNodeConfig {
            remove_custom_text_from_response_start: true,
            response_start_text_to_remove: vec!["Roland:".to_string()],
            ..WorkflowNodeConfig::default()
        };
        let mut transformer = StreamTransformer::new(
            &EndpointConfig::default(),
            &node,
            options(ApiKind::OllamaGenerate),
        );

        // "Rol" is still a prefix of "Roland:".
        assert!(transformer.process_chunk(&NeutralChunk::token("Rol")).is_empty());
        // The rest settles it and the literal is stripped.
        transformer.process_chunk(&NeutralChunk::token("and: hi"));
        transformer.finalize();
        assert_eq!(transformer.full_response_text(), "hi");
    }

    #[test]
    fn test_buffer_cap_forces_release() {
        let node = WorkflowNodeConfig {
            remove_custom_text_from_response_start: true,
            response_start_text_to_remove: vec!["Roland:".to_string()],
            ..WorkflowNodeConfig::default()
        };
        let mut transformer = StreamTransformer::new(
            &EndpointConfig::default(),
            &node,
            options(ApiKind::OllamaGenerate),
        );

        // A buffer that starts with the literal stays a live candidate
        // forever, so only the cap can release it: the 101st character
        // forces it.
        let hundred = format!("Roland:{}", "x".repeat(93));
        assert!(transformer.process_chunk(&NeutralChunk::token(&hundred)).is_empty());
        let frames = transformer.process_chunk(&NeutralChunk::token("y"));
        assert_eq!(frames.len(), 1);
        assert_eq!(transformer.full_response_text(), format!("{}y", "x".repeat(93)));
    }

    #[test]
    fn test_raised_cap_with_both_literal_levels() {
        let endpoint = EndpointConfig {
            remove_custom_text_from_response_start_endpoint_wide: true,
            response_start_text_to_remove_endpoint_wide: vec!["E".to_string()],
            ..EndpointConfig::default()
        };
        let node = WorkflowNodeConfig {
            remove_custom_text_from_response_start: true,
            response_start_text_to_remove: vec!["W".to_string()],
            ..WorkflowNodeConfig::default()
        };
        let transformer =
            StreamTransformer::new(&endpoint, &node, options(ApiKind::OllamaGenerate));
        assert_eq!(transformer.prefix_buffer_limit, 200);
    }

    #[test]
    fn test_full_response_text_excludes_terminal_frame() {
        let mut transformer = plain_transformer(ApiKind::OllamaChat);
        run(&mut transformer, &["a", "b"]);
        assert_eq!(transformer.full_response_text(), "ab");
    }

    #[test]
    fn test_request_id_echoed_in_frames() {
        let mut transformer = StreamTransformer::new(
            &EndpointConfig::default(),
            &WorkflowNodeConfig::default(),
            TransformerOptions {
                request_id: Some("req-7".to_string()),
                ..options(ApiKind::OllamaChat)
            },
        );
        let frames = run(&mut transformer, &["x"]);
        for frame in &frames {
            let parsed: Value = serde_json::from_str(frame.trim_end()).unwrap();
            assert_eq!(parsed["request_id"], "req-7");
        }
    }

    #[tokio::test]
    async fn test_stream_adapter_matches_state_machine() {
        let transformer = plain_transformer(ApiKind::OpenAiChatCompletion);
        let input = futures::stream::iter(vec![
            NeutralChunk::token("Hel"),
            NeutralChunk::token("lo"),
            NeutralChunk::stop(),
        ]);
        let frames: Vec<String> = transformer.into_stream(input).collect().await;
        assert_eq!(frames.len(), 4);
        assert_eq!(frames.last().unwrap(), "data: [DONE]\n\n");
    }
}
