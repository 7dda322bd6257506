//! The voice loop: utterance lifecycle, simple/complex routing, the
//! clarification bridge, and wait-for-done polling (§4.5).

pub mod clarification;
pub mod loop_;
pub mod routing;
pub mod utterance;

pub use clarification::ClarificationBridge;
pub use loop_::{
    InterpretedInput, LoopOutcomeSummary, SpecialToken, SpeculativePayload, TaskCompletionBox, TranscriptOutcome,
    VoiceLoopDeps, classify_special_token, handle_transcript, hold_for_narration, listen_and_handle, random_filler,
};
pub use routing::is_simple_command;
pub use utterance::{Utterance, UtteranceStatus, next_utterance_id};
