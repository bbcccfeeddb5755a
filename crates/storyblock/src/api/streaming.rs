//! Server-Sent Events (SSE) streaming for the OpenRouter chat completions API.
//!
//! Provides [`StreamEvent`] and [`OpenRouterClient::chat_stream_live`], which
//! reads the response body chunk by chunk and hands each parsed event to a
//! callback as it arrives.

use std::borrow::Cow;

use crate::citations::Citation;
use crate::{Annotation, ChatRequest, OpenRouterClient, UsageInfo};
use serde::Deserialize;
use tracing::{debug, trace, warn};

/// Error text used whenever the backend refuses to produce content.
/// Matched by [`crate::generate::user_friendly_error_message`].
pub const SAFETY_BLOCK_MESSAGE: &str = "response blocked by the safety filters";

/// A single event from an SSE stream.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// An incremental text content delta.
    TextDelta(String),
    /// A URL citation reported by the web-search plugin.
    Citation(Citation),
    /// Token usage information (sent in the final chunk).
    Usage(UsageInfo),
    /// The stream is complete.
    Done,
    /// The backend reported an error mid-stream.
    Error(String),
}

/// Raw SSE data chunk from the OpenRouter API.
#[derive(Deserialize, Debug)]
struct StreamChunk {
    choices: Option<Vec<StreamChoice>>,
    usage: Option<UsageInfo>,
    error: Option<StreamError>,
}

#[derive(Deserialize, Debug)]
struct StreamError {
    message: String,
}

#[derive(Deserialize, Debug)]
struct StreamChoice {
    delta: Option<StreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct StreamDelta {
    content: Option<String>,
    annotations: Option<Vec<Annotation>>,
}

impl OpenRouterClient {
    /// Send a chat completion request with SSE streaming, invoking
    /// `on_event` for each event as it arrives off the wire.
    ///
    /// The full event list is also returned. It always ends with
    /// [`StreamEvent::Done`], even when the server closes the connection
    /// without sending `data: [DONE]`.
    pub async fn chat_stream_live(
        &self,
        body: &ChatRequest,
        mut on_event: impl FnMut(&StreamEvent),
    ) -> Result<Vec<StreamEvent>, String> {
        let mut stream_body =
            serde_json::to_value(body).map_err(|e| format!("failed to serialize request: {e}"))?;
        stream_body["stream"] = serde_json::Value::Bool(true);

        debug!(
            "Sending streaming chat request: model={}, max_tokens={}",
            body.model.as_deref().unwrap_or("(none)"),
            body.max_tokens
        );

        let mut resp = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(&stream_body)
            .send()
            .await
            .map_err(|e| format!("streaming request failed: {e}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(format!("OpenRouter API HTTP {status}: {text}"));
        }

        // Read incrementally via chunk() so long generations don't hit a
        // single-body timeout.
        let mut events = Vec::new();
        // Raw bytes: a multi-byte character may straddle two chunks, so
        // only complete lines are decoded.
        let mut buffer: Vec<u8> = Vec::new();
        let mut done = false;

        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|e| format!("failed to read streaming chunk: {e}"))?
        {
            buffer.extend_from_slice(&chunk);

            while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=newline_pos).collect();
                if process_line(decode_line(&line).trim(), &mut events, &mut on_event) {
                    done = true;
                    break;
                }
            }

            if done {
                break;
            }
        }

        // Incomplete final line.
        if !done {
            let remaining = decode_line(&buffer);
            done = process_line(remaining.trim(), &mut events, &mut on_event);
        }

        if !done {
            let ev = StreamEvent::Done;
            on_event(&ev);
            events.push(ev);
        }

        debug!("Live stream completed with {} events", events.len());
        Ok(events)
    }
}

/// Decode one complete SSE line. Invalid sequences are replaced rather
/// than failing the whole stream.
fn decode_line(line: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(line)
}

/// Handle one SSE line. Returns `true` once the terminal `[DONE]` marker
/// has been seen.
fn process_line(
    line: &str,
    events: &mut Vec<StreamEvent>,
    on_event: &mut impl FnMut(&StreamEvent),
) -> bool {
    if line.is_empty() || line.starts_with(':') {
        return false;
    }
    if line == "data: [DONE]" {
        let ev = StreamEvent::Done;
        on_event(&ev);
        events.push(ev);
        return true;
    }
    if let Some(data) = line.strip_prefix("data: ") {
        let before = events.len();
        parse_sse_data(data, events);
        for ev in &events[before..] {
            on_event(ev);
        }
    }
    false
}

/// Parse a single SSE `data:` payload into stream events.
pub(crate) fn parse_sse_data(data: &str, events: &mut Vec<StreamEvent>) {
    let chunk = match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            warn!("Failed to parse SSE chunk: {e}, data: {data}");
            return;
        }
    };

    if let Some(err) = chunk.error {
        events.push(StreamEvent::Error(classify_stream_error(&err.message)));
    }

    if let Some(usage) = chunk.usage {
        events.push(StreamEvent::Usage(usage));
    }

    for choice in chunk.choices.unwrap_or_default() {
        if let Some(delta) = choice.delta {
            if let Some(content) = delta.content
                && !content.is_empty()
            {
                events.push(StreamEvent::TextDelta(content));
            }
            for annotation in delta.annotations.unwrap_or_default() {
                if let Some(citation) = annotation.citation() {
                    events.push(StreamEvent::Citation(citation));
                }
            }
        }
        match choice.finish_reason.as_deref() {
            Some("content_filter") => {
                events.push(StreamEvent::Error(format!(
                    "{SAFETY_BLOCK_MESSAGE} (finish_reason=content_filter)"
                )));
            }
            Some(reason) => trace!("Stream finish_reason: {reason}"),
            None => {}
        }
    }
}

/// Normalize moderation errors to [`SAFETY_BLOCK_MESSAGE`].
fn classify_stream_error(message: &str) -> String {
    let lower = message.to_lowercase();
    if ["safety", "moderation", "flagged", "content_filter"]
        .iter()
        .any(|p| lower.contains(p))
    {
        format!("{SAFETY_BLOCK_MESSAGE}: {message}")
    } else {
        format!("stream error: {message}")
    }
}

/// Assemble a complete text string from a sequence of stream events.
pub fn collect_text(events: &[StreamEvent]) -> String {
    let mut text = String::new();
    for event in events {
        if let StreamEvent::TextDelta(delta) = event {
            text.push_str(delta);
        }
    }
    text
}

/// Citations reported in a sequence of stream events, in arrival order.
pub fn collect_citations(events: &[StreamEvent]) -> Vec<Citation> {
    events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Citation(c) => Some(c.clone()),
            _ => None,
        })
        .collect()
}

/// The first error reported in a sequence of stream events.
pub fn first_error(events: &[StreamEvent]) -> Option<&str> {
    events.iter().find_map(|e| match e {
        StreamEvent::Error(msg) => Some(msg.as_str()),
        _ => None,
    })
}

/// Extract usage info from stream events (if present).
pub fn extract_usage(events: &[StreamEvent]) -> Option<UsageInfo> {
    for event in events.iter().rev() {
        if let StreamEvent::Usage(usage) = event {
            return Some(usage.clone());
        }
    }
    None
}
