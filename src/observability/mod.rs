//! Structured tracing, secret redaction, and the rolling session log.
//!
//! Spans are emitted at the boundaries called out in §4.9: inference
//! requests, pipeline rounds, tool execution, and narration. Use the
//! constants and macros in [`spans`] rather than ad hoc `info_span!` calls so
//! field names stay consistent across the crate.

pub mod redact;
pub mod session_log;
pub mod spans;

pub use redact::{RedactedString, redact_all, redact_api_key, redact_auth_header};
pub use session_log::SessionLog;
pub use spans::{
    FIELD_ACTION, FIELD_BLOCK_INDEX, FIELD_PROVIDER, FIELD_REQUEST_ID, FIELD_ROUND, FIELD_TOOL_NAME,
    SPAN_INFERENCE_REQUEST, SPAN_NARRATION_SPEAK, SPAN_PIPELINE_ROUND, SPAN_TOOL_EXECUTE,
};
