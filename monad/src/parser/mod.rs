//! Streaming response parser.
//!
//! A stateful, chunk-fed classifier that separates chain-of-thought
//! (`<think>…</think>`) from answer content while tolerating code fences,
//! tags split across chunk boundaries, and orphaned closing tags. Tool-call
//! extraction over the fully-accumulated text lives in [`tool_call`].
//!
//! Per chunk the parser emits newly-classified thinking and content plus a
//! reclassification flag. On an orphaned `</think>` everything accumulated as
//! content so far (including this chunk's) is relocated to thinking; live
//! deltas already emitted are not retracted, so external consumers should
//! take the corrected split from the finalized message.

mod tool_call;

pub use tool_call::{extract_tool_calls, ParsedToolCall};

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";
const FENCE: &str = "```";

/// Above this buffer size a trailing partial fence is no longer held back.
const PARTIAL_FENCE_HOLD_LIMIT: usize = 1000;

/// Output of one [`StreamingParser::feed`] call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParsedChunk {
    /// Newly classified thinking text, if any.
    pub thinking: Option<String>,
    /// Newly classified content text, if any.
    pub content: Option<String>,
    /// True when an orphaned `</think>` moved accumulated content into
    /// thinking during this chunk.
    pub reclassified: bool,
}

/// Finalized split of one full message.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParsedMessage {
    pub thinking: String,
    pub content: String,
}

/// Incremental `<think>` / content classifier.
#[derive(Debug, Default)]
pub struct StreamingParser {
    buffer: String,
    thinking: String,
    content: String,
    inside_think: bool,
    inside_code_block: bool,
}

/// Smallest index whose suffix is a non-empty proper prefix of `tag`.
fn partial_suffix(buffer: &str, tag: &str) -> Option<usize> {
    let start = buffer.len().saturating_sub(tag.len() - 1);
    for (i, _) in buffer.char_indices() {
        if i < start {
            continue;
        }
        let suffix = &buffer[i..];
        if !suffix.is_empty() && suffix.len() < tag.len() && tag.starts_with(suffix) {
            return Some(i);
        }
    }
    None
}

impl StreamingParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the parser to its initial state for the next message.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn emit(&self, text: &str, out_thinking: &mut String, out_content: &mut String) {
        if text.is_empty() {
            return;
        }
        if self.inside_think {
            out_thinking.push_str(text);
        } else {
            out_content.push_str(text);
        }
    }

    fn holds_partial_fence(&self) -> bool {
        (self.buffer.ends_with('`'))
            && !self.buffer.ends_with(FENCE)
            && self.buffer.len() < PARTIAL_FENCE_HOLD_LIMIT
    }

    /// Feeds one chunk, returning text newly classified by this call.
    pub fn feed(&mut self, chunk: &str) -> ParsedChunk {
        self.buffer.push_str(chunk);
        let mut out_thinking = String::new();
        let mut out_content = String::new();
        let mut reclassified = false;

        loop {
            if self.buffer.is_empty() {
                break;
            }

            if self.inside_code_block {
                if let Some(pos) = self.buffer.find(FENCE) {
                    let upto = pos + FENCE.len();
                    let text: String = self.buffer.drain(..upto).collect();
                    self.emit(&text, &mut out_thinking, &mut out_content);
                    self.inside_code_block = false;
                    continue;
                }
                if self.holds_partial_fence() {
                    break;
                }
                let text = std::mem::take(&mut self.buffer);
                self.emit(&text, &mut out_thinking, &mut out_content);
                break;
            }

            // Rule 1: a full fence outranks tag matching.
            if let Some(pos) = self.buffer.find(FENCE) {
                let tag_pos = if self.inside_think {
                    self.buffer.find(THINK_CLOSE)
                } else {
                    match (self.buffer.find(THINK_OPEN), self.buffer.find(THINK_CLOSE)) {
                        (Some(a), Some(b)) => Some(a.min(b)),
                        (a, b) => a.or(b),
                    }
                };
                if tag_pos.map_or(true, |t| pos < t) {
                    let upto = pos + FENCE.len();
                    let text: String = self.buffer.drain(..upto).collect();
                    self.emit(&text, &mut out_thinking, &mut out_content);
                    self.inside_code_block = true;
                    continue;
                }
            }

            // Rule 2: a trailing partial fence holds the buffer.
            if self.holds_partial_fence() {
                break;
            }

            if self.inside_think {
                // Rule 3: a full close tag ends the thinking span.
                if let Some(pos) = self.buffer.find(THINK_CLOSE) {
                    let text: String = self.buffer.drain(..pos).collect();
                    out_thinking.push_str(&text);
                    self.buffer.drain(..THINK_CLOSE.len());
                    self.inside_think = false;
                    continue;
                }
                // Rule 4: hold a trailing partial close tag.
                if let Some(split) = partial_suffix(&self.buffer, THINK_CLOSE) {
                    let text: String = self.buffer.drain(..split).collect();
                    out_thinking.push_str(&text);
                    break;
                }
                // Rule 8: flush as thinking.
                let text = std::mem::take(&mut self.buffer);
                out_thinking.push_str(&text);
                break;
            }

            let open_pos = self.buffer.find(THINK_OPEN);
            let close_pos = self.buffer.find(THINK_CLOSE);
            match (open_pos, close_pos) {
                // Rule 5: open tag starts a thinking span.
                (Some(open), Some(close)) if open < close => {
                    let text: String = self.buffer.drain(..open).collect();
                    out_content.push_str(&text);
                    self.buffer.drain(..THINK_OPEN.len());
                    self.inside_think = true;
                    continue;
                }
                // Rule 5: open tag starts a thinking span (no close tag present).
                (Some(open), None) => {
                    let text: String = self.buffer.drain(..open).collect();
                    out_content.push_str(&text);
                    self.buffer.drain(..THINK_OPEN.len());
                    self.inside_think = true;
                    continue;
                }
                // Rule 7: orphaned close tag reclassifies accumulated content.
                (_, Some(close)) => {
                    let text: String = self.buffer.drain(..close).collect();
                    out_content.push_str(&text);
                    self.buffer.drain(..THINK_CLOSE.len());
                    reclassified = true;
                    continue;
                }
                (None, None) => {
                    // Rule 6: hold a trailing partial tag (either kind).
                    let split = match (
                        partial_suffix(&self.buffer, THINK_OPEN),
                        partial_suffix(&self.buffer, THINK_CLOSE),
                    ) {
                        (Some(a), Some(b)) => Some(a.min(b)),
                        (a, b) => a.or(b),
                    };
                    if let Some(split) = split {
                        let text: String = self.buffer.drain(..split).collect();
                        out_content.push_str(&text);
                        break;
                    }
                    // Rule 8: flush as content.
                    let text = std::mem::take(&mut self.buffer);
                    out_content.push_str(&text);
                    break;
                }
            }
        }

        self.thinking.push_str(&out_thinking);
        self.content.push_str(&out_content);
        if reclassified {
            let relocated = std::mem::take(&mut self.content);
            self.thinking.push_str(&relocated);
        }

        ParsedChunk {
            thinking: (!out_thinking.is_empty()).then_some(out_thinking),
            content: (!out_content.is_empty()).then_some(out_content),
            reclassified,
        }
    }

    /// Flushes held text and returns the final trimmed split.
    pub fn finalize(&mut self) -> ParsedMessage {
        if !self.buffer.is_empty() {
            let text = std::mem::take(&mut self.buffer);
            if self.inside_think {
                self.thinking.push_str(&text);
            } else {
                self.content.push_str(&text);
            }
        }
        ParsedMessage {
            thinking: self.thinking.trim().to_string(),
            content: self.content.trim().to_string(),
        }
    }
}
