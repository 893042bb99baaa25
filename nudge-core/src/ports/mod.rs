//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. The engine
//! depends only on these traits, not on concrete implementations.

mod gateway;
mod trigger_log;

pub use gateway::{Gateway, TransactionFilter};
pub use trigger_log::TriggerLog;
