pub mod decoder;

pub use decoder::FrameDecoder;

use serde::{Deserialize, Serialize};

/// Terminal sentinel emitted by the provider at end of stream.
pub const DONE_SENTINEL: &str = "[DONE]";

// ---------------------------------------------------------------------------
// Upstream wire types — one decoded SSE data payload
// ---------------------------------------------------------------------------

/// One parsed upstream chunk (`chat.completion.chunk` shape).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamChoice {
    #[serde(default)]
    pub delta: StreamDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

/// One per-chunk tool-call fragment. The provider fragments both the name
/// (sent once, in full) and the arguments (appended token by token) across
/// many chunks, multiplexing concurrent calls by `index`.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallDelta {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<FunctionDelta>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FunctionDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

impl StreamChoice {
    /// Whether this choice carries the terminal marker for a tool-call round.
    #[must_use]
    pub fn finished_with_tool_calls(&self) -> bool {
        self.finish_reason.as_deref() == Some("tool_calls")
    }
}

// ---------------------------------------------------------------------------
// Client-facing events
// ---------------------------------------------------------------------------

/// Tagged union written to the client-facing SSE stream as
/// `{"type": ..., "value": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum OutgoingEvent {
    ToolCallStart {
        tool: String,
        args: serde_json::Value,
    },
    /// `result` is the JSON serialization of the tool's output value.
    ToolCallResult {
        tool: String,
        result: String,
    },
    ToolCallError {
        error: String,
    },
    /// One incremental text delta; the client concatenates.
    FinalAnswer(String),
    /// Unrecoverable stream-level failure, emitted at most once before close.
    Error(String),
}

/// Frame an event as one SSE record: `data: <json>\n\n`.
#[must_use]
pub fn encode_event(event: &OutgoingEvent) -> bytes::Bytes {
    let json = serde_json::to_string(event).unwrap_or_else(|_| {
        // Serialization of these enum shapes cannot fail; keep the stream
        // alive if it ever does.
        String::from("{\"type\":\"error\",\"value\":\"serialization failure\"}")
    });
    let mut out = String::with_capacity(10 + json.len());
    out.push_str("data: ");
    out.push_str(&json);
    out.push_str("\n\n");
    bytes::Bytes::from(out)
}
