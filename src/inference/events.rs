//! Normalized event stream produced by decoding the inference backend's SSE
//! frames (§4.3.3, §9).
//!
//! The backend's wire format is `message_start → content_block_start →
//! content_block_delta* → content_block_stop → ... → message_delta →
//! message_stop`. [`LlmEvent`] flattens that into the shape the pipeline
//! actually consumes: text deltas as they stream, and one `ToolCallEnd` per
//! content block once its partial-JSON argument buffer is complete.

use serde::{Deserialize, Serialize};

/// One decoded event from a streaming inference response.
#[derive(Debug, Clone, PartialEq)]
pub enum LlmEvent {
    /// `message_start`.
    StreamStart { request_id: String, model: String },
    /// `content_block_delta` with a text delta.
    TextDelta { text: String },
    /// `content_block_start` for a `tool_use` block.
    ToolCallStart { call_id: String, function_name: String },
    /// `content_block_delta` with a partial-JSON delta for a tool_use block.
    ToolCallArgsDelta { call_id: String, args_fragment: String },
    /// `content_block_stop` for a tool_use block: its argument buffer is complete.
    ToolCallEnd { call_id: String },
    /// `message_delta` carrying the stop reason, followed by the terminator.
    StreamEnd { finish_reason: FinishReason },
    /// Connection or decode failure mid-stream.
    StreamError { error: String },
}

/// Normalized stop reason (§4.3.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// `end_turn`: the model produced a complete response with no tool calls.
    Stop,
    /// `max_tokens`.
    Length,
    /// `tool_use`: at least one tool-use block was emitted.
    ToolCalls,
    /// The user interrupted the stream.
    Cancelled,
    /// Any value not covered above.
    Other,
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Stop => "stop",
            Self::Length => "length",
            Self::ToolCalls => "tool_calls",
            Self::Cancelled => "cancelled",
            Self::Other => "other",
        };
        write!(f, "{s}")
    }
}

impl FinishReason {
    /// Map the backend's `stop_reason` string onto a normalized reason.
    pub fn from_stop_reason(raw: &str) -> Self {
        match raw {
            "end_turn" | "stop_sequence" => Self::Stop,
            "max_tokens" => Self::Length,
            "tool_use" => Self::ToolCalls,
            _ => Self::Other,
        }
    }
}
