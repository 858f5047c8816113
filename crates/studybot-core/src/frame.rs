//! Event-stream frame parsing
//!
//! The parser is a pure function over an accumulated text buffer. It dispatches
//! every complete frame it finds and hands back whatever follows the last frame
//! delimiter so the caller can prepend it to the next delta.
//!
//! Two end-of-stream conventions are recognized:
//! - the literal `[DONE]` payload
//! - a JSON payload whose `reply` field is the empty string

use serde::Deserialize;
use tracing::debug;

/// Literal payload signalling the end of the stream
pub const DONE_SENTINEL: &str = "[DONE]";

const FRAME_DELIMITER: &str = "\n\n";

/// One parsed frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame<'a> {
    pub event: Option<&'a str>,
    pub data: String,
}

/// What a frame means for the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    /// End-of-stream sentinel
    Completion,
    /// Non-empty reply text
    Reply(String),
    /// Valid frame carrying nothing to dispatch, or a payload that failed to parse
    Skip,
}

/// Result of one parser pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseOutcome {
    /// Unconsumed tail; becomes the session buffer
    pub remainder: String,
    /// A completion sentinel was seen
    pub completed: bool,
}

#[derive(Deserialize)]
struct ReplyPayload {
    #[serde(default)]
    reply: Option<serde_json::Value>,
}

/// Parse all complete frames in `buffer`, invoking `on_reply` for each content frame
///
/// Parsing stops at the first completion sentinel; frames after it are not
/// dispatched and the remainder is empty.
pub fn parse_frames<F>(buffer: &str, mut on_reply: F) -> ParseOutcome
where
    F: FnMut(&str),
{
    // A trailing CR may be the first half of a CRLF still in flight
    let (body, held_cr) = match buffer.strip_suffix('\r') {
        Some(body) => (body, true),
        None => (buffer, false),
    };

    let normalized = normalize_line_endings(body);
    let mut parts: Vec<&str> = normalized.split(FRAME_DELIMITER).collect();
    let tail = parts.pop().unwrap_or_default();

    for raw in parts {
        let Some(frame) = parse_frame(raw) else {
            continue;
        };

        match classify(&frame) {
            FrameKind::Completion => {
                debug!(event = ?frame.event, "Completion frame received");
                return ParseOutcome {
                    remainder: String::new(),
                    completed: true,
                };
            }
            FrameKind::Reply(text) => on_reply(&text),
            FrameKind::Skip => {}
        }
    }

    let mut remainder = tail.to_string();
    if held_cr {
        remainder.push('\r');
    }

    ParseOutcome {
        remainder,
        completed: false,
    }
}

/// Parse `remainder` as though the stream had terminated it with a blank line
///
/// Used once at end-of-stream to pick up a trailing frame that never received
/// its delimiter.
pub fn finish_frames<F>(remainder: &str, on_reply: F) -> ParseOutcome
where
    F: FnMut(&str),
{
    if remainder.trim().is_empty() {
        return ParseOutcome::default();
    }

    let mut terminated = String::with_capacity(remainder.len() + FRAME_DELIMITER.len());
    terminated.push_str(remainder);
    terminated.push_str(FRAME_DELIMITER);
    parse_frames(&terminated, on_reply)
}

/// Extract the event name and joined data lines from one raw frame
///
/// Returns `None` for frames without any `data:` line (comments, keep-alives).
pub fn parse_frame(raw: &str) -> Option<Frame<'_>> {
    let mut event = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in raw.split('\n') {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => event = Some(value),
            "data" => data_lines.push(value),
            _ => {}
        }
    }

    if data_lines.is_empty() {
        return None;
    }

    Some(Frame {
        event,
        data: data_lines.join("\n"),
    })
}

/// Decide what a frame means: completion first, then content
pub fn classify(frame: &Frame<'_>) -> FrameKind {
    if frame.data.trim() == DONE_SENTINEL {
        return FrameKind::Completion;
    }

    match serde_json::from_str::<ReplyPayload>(&frame.data) {
        Ok(ReplyPayload {
            reply: Some(serde_json::Value::String(reply)),
        }) => {
            if reply.is_empty() {
                FrameKind::Completion
            } else {
                FrameKind::Reply(reply)
            }
        }
        Ok(_) => FrameKind::Skip,
        Err(e) => {
            debug!(
                "Skipping unparseable stream frame ({} bytes): {}",
                frame.data.len(),
                e
            );
            FrameKind::Skip
        }
    }
}

fn normalize_line_endings(text: &str) -> String {
    if !text.contains('\r') {
        return text.to_string();
    }
    text.replace("\r\n", "\n").replace('\r', "\n")
}
