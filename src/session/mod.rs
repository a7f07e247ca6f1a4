//! Session engine module for Kaiwa
//!
//! Conversation orchestration: persistence, generation cycles, cancellation,
//! and observer notifications.

pub mod engine;
pub mod events;

pub use engine::{SessionEngine, SessionState, DEFAULT_TITLE};
pub use events::SessionEvent;
