//! Session context and long-term memory (§3, §6).

pub mod context;
pub mod memory;

pub use context::SessionContext;
pub use memory::MemoryStore;
