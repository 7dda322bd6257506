//! Stable span names and field keys for tracing the orchestration core.
//!
//! ```text
//! voxpilot.inference.request
//!   └─> voxpilot.tool.execute
//! voxpilot.pipeline.round (parallel to inference spans)
//! voxpilot.narration.speak (parallel to the above)
//! ```

/// Root span for a single streamed inference request.
pub const SPAN_INFERENCE_REQUEST: &str = "voxpilot.inference.request";

/// Span for one direct-execution round or planner block (§4.3).
pub const SPAN_PIPELINE_ROUND: &str = "voxpilot.pipeline.round";

/// Span for executing one computer-control tool call.
pub const SPAN_TOOL_EXECUTE: &str = "voxpilot.tool.execute";

/// Span for one narration-queue speak operation.
pub const SPAN_NARRATION_SPEAK: &str = "voxpilot.narration.speak";

/// Inference provider name field.
pub const FIELD_PROVIDER: &str = "provider";

/// Request identifier field (UUID).
pub const FIELD_REQUEST_ID: &str = "request_id";

/// Pipeline round or block index (1-indexed).
pub const FIELD_ROUND: &str = "round";

/// Planner block index within a `PipelineResponse` (0-indexed).
pub const FIELD_BLOCK_INDEX: &str = "block_index";

/// Computer-control action name field (e.g. "click", "type").
pub const FIELD_ACTION: &str = "action";

/// Tool name field.
pub const FIELD_TOOL_NAME: &str = "tool_name";

/// Build a span for one streamed inference request.
#[macro_export]
macro_rules! inference_request_span {
    ($provider:expr, $request_id:expr) => {
        tracing::info_span!(
            $crate::observability::spans::SPAN_INFERENCE_REQUEST,
            { $crate::observability::spans::FIELD_PROVIDER } = $provider,
            { $crate::observability::spans::FIELD_REQUEST_ID } = $request_id,
        )
    };
}

/// Build a span for one pipeline round or planner block.
#[macro_export]
macro_rules! pipeline_round_span {
    ($round:expr) => {
        tracing::info_span!(
            $crate::observability::spans::SPAN_PIPELINE_ROUND,
            { $crate::observability::spans::FIELD_ROUND } = $round,
        )
    };
}

/// Build a span for one computer-control action execution.
#[macro_export]
macro_rules! tool_execute_span {
    ($action:expr) => {
        tracing::info_span!(
            $crate::observability::spans::SPAN_TOOL_EXECUTE,
            { $crate::observability::spans::FIELD_ACTION } = $action,
        )
    };
}

/// Build a span for one narration-queue speak operation.
#[macro_export]
macro_rules! narration_speak_span {
    () => {
        tracing::info_span!($crate::observability::spans::SPAN_NARRATION_SPEAK)
    };
}
