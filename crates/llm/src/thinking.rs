//! Thinking-block removal
//!
//! Reasoning models wrap internal monologue in `<think>…</think>`-style
//! blocks that must not reach the client. [`ThinkRemover`] strips them from
//! a token stream; [`remove_thinking_from_text`] applies the same rules to a
//! complete response.
//!
//! Two modes, selected per endpoint:
//!
//! - **Standard**: honor an opening tag appearing within a grace window of
//!   characters from stream start, swallow through the matching closing tag.
//!   If the window lapses without an opening tag, all checking stops and
//!   content passes through verbatim.
//! - **Closing-only**: the backend emits reasoning without an opening tag;
//!   everything up to and including the first closing tag is discarded.

use regex::{Regex, RegexBuilder};

use llm_gateway_config::EndpointConfig;

/// Stateful stream filter. One instance per backend call.
pub struct ThinkRemover {
    remove_thinking: bool,
    expect_only_closing: bool,
    opening_tag_window: usize,
    close_tag_re: Regex,
    open_tag_re: Regex,

    buffer: String,
    in_think_block: bool,
    opening_tag_check_complete: bool,
    thinking_handled: bool,
    consumed_open_tag: String,
}

/// First occurrence of the closing tag, optionally preceded by whitespace;
/// the match swallows trailing spaces and one newline. Case-insensitive.
fn close_tag_regex(tag: &str) -> Regex {
    RegexBuilder::new(&format!(r"\s*</{}>[ \t\r]*\n?", regex::escape(tag)))
        .case_insensitive(true)
        .build()
        .expect("closing think tag pattern")
}

fn open_tag_regex(tag: &str) -> Regex {
    RegexBuilder::new(&format!(r"<{}\b[^>]*>", regex::escape(tag)))
        .case_insensitive(true)
        .build()
        .expect("opening think tag pattern")
}

fn char_count(s: &str) -> usize {
    s.chars().count()
}

impl ThinkRemover {
    pub fn new(endpoint: &EndpointConfig) -> Self {
        if endpoint.remove_thinking {
            tracing::debug!(
                mode = if endpoint.expect_only_closing_think_tag {
                    "closing_tag_only"
                } else {
                    "standard"
                },
                tag = %endpoint.think_tag_text,
                grace_period = endpoint.opening_tag_grace_period,
                "ThinkRemover initialized"
            );
        }

        Self {
            remove_thinking: endpoint.remove_thinking,
            expect_only_closing: endpoint.expect_only_closing_think_tag,
            opening_tag_window: endpoint.opening_tag_grace_period,
            close_tag_re: close_tag_regex(&endpoint.think_tag_text),
            open_tag_re: open_tag_regex(&endpoint.think_tag_text),
            buffer: String::new(),
            in_think_block: false,
            opening_tag_check_complete: false,
            thinking_handled: false,
            consumed_open_tag: String::new(),
        }
    }

    /// Feed one delta; returns the content that is now safe to emit, which
    /// may be empty while the state is still undecided.
    pub fn process_delta(&mut self, delta: &str) -> String {
        if !self.remove_thinking {
            return delta.to_string();
        }

        self.buffer.push_str(delta);
        let mut content_to_yield = String::new();

        if self.expect_only_closing {
            if self.thinking_handled {
                content_to_yield = std::mem::take(&mut self.buffer);
            } else if let Some(found) = self.close_tag_re.find(&self.buffer) {
                tracing::debug!("Closing tag found in closing-only mode, discarding preceding content");
                self.thinking_handled = true;
                content_to_yield = self.buffer[found.end()..].to_string();
                self.buffer.clear();
            }
            return content_to_yield;
        }

        loop {
            let buffer_before = self.buffer.len();

            if self.in_think_block {
                match self.close_tag_re.find(&self.buffer) {
                    Some(found) => {
                        tracing::debug!("Closing think tag found, resuming stream output");
                        self.in_think_block = false;
                        self.consumed_open_tag.clear();
                        self.buffer = self.buffer[found.end()..].to_string();
                    }
                    None => break,
                }
            } else {
                if self.opening_tag_check_complete {
                    content_to_yield.push_str(&self.buffer);
                    self.buffer.clear();
                    break;
                }

                if let Some(found) = self.open_tag_re.find(&self.buffer) {
                    if char_count(&self.buffer[..found.start()]) <= self.opening_tag_window {
                        tracing::debug!("Opening think tag within grace period, entering think block");
                        self.in_think_block = true;
                        self.consumed_open_tag = found.as_str().to_string();
                        self.buffer = self.buffer[found.end()..].to_string();
                    } else {
                        tracing::debug!("Opening tag outside the grace period, disabling checks");
                        self.opening_tag_check_complete = true;
                        content_to_yield.push_str(&self.buffer);
                        self.buffer.clear();
                        break;
                    }
                } else if char_count(&self.buffer) > self.opening_tag_window {
                    tracing::debug!(
                        grace_period = self.opening_tag_window,
                        "Grace period exceeded without an opening tag"
                    );
                    self.opening_tag_check_complete = true;
                    content_to_yield.push_str(&self.buffer);
                    self.buffer.clear();
                    break;
                } else {
                    break;
                }
            }

            if self.buffer.len() == buffer_before {
                break;
            }
        }

        content_to_yield
    }

    /// Flush whatever the stream end leaves behind.
    ///
    /// An unterminated standard-mode block is emitted verbatim (open tag
    /// included) rather than silently dropped; an unterminated closing-only
    /// buffer is discarded.
    pub fn finalize(&mut self) -> String {
        if !self.remove_thinking {
            return String::new();
        }

        if self.in_think_block {
            if let Some(found) = self.close_tag_re.find(&self.buffer) {
                tracing::debug!("Found closing tag during finalization");
                return self.buffer[found.end()..].to_string();
            }
            tracing::warn!("Finalizing stream inside an unterminated think block, flushing buffer as-is");
            let mut flushed = std::mem::take(&mut self.consumed_open_tag);
            flushed.push_str(&std::mem::take(&mut self.buffer));
            return flushed;
        }

        if self.expect_only_closing && !self.thinking_handled {
            tracing::warn!("Stream ended in closing-only mode without a closing tag, discarding buffer");
            self.buffer.clear();
            return String::new();
        }

        std::mem::take(&mut self.buffer)
    }
}

/// Batch equivalent of [`ThinkRemover`] for non-streaming responses.
pub fn remove_thinking_from_text(text: &str, endpoint: &EndpointConfig) -> String {
    if !endpoint.remove_thinking {
        return text.to_string();
    }

    let close_tag_re = close_tag_regex(&endpoint.think_tag_text);

    if endpoint.expect_only_closing_think_tag {
        return match close_tag_re.find(text) {
            Some(found) => text[found.end()..].to_string(),
            None => {
                tracing::debug!("Closing-only mode: no closing tag found, returning empty string");
                String::new()
            }
        };
    }

    let open_tag_re = open_tag_regex(&endpoint.think_tag_text);
    let window_end = text
        .char_indices()
        .nth(endpoint.opening_tag_grace_period)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());

    // The whole opening tag must sit inside the grace window.
    let Some(open) = open_tag_re.find(&text[..window_end]) else {
        return text.to_string();
    };

    match close_tag_re.find_at(text, open.end()) {
        Some(close) => text[close.end()..].to_string(),
        // Opening tag without a closing one: do not lose content.
        None => text.to_string(),
    }
}
