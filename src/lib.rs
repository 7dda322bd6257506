//! Voxpilot: a voice-first computer-use agent orchestration core.
//!
//! Listens for a spoken request, routes it through a fast streaming
//! tool-calling executor or a slower planner that decomposes and
//! replans, and drives whatever action sink and screen source the host
//! application wires in. Concrete audio capture, TTS synthesis, and
//! input-device backends are external collaborators; this crate defines
//! the traits they implement and the orchestration logic around them.

pub mod action;
pub mod config;
pub mod error;
pub mod inference;
pub mod narration;
pub mod observability;
pub mod perf;
pub mod pipeline;
pub mod screen;
pub mod session;
pub mod speculative;
pub mod stt;
pub mod voice;

pub use config::VoxConfig;
pub use error::{Result, VoxError};
