//! Notes collection engine library
//!
//! This library owns a set of short text notes with hashtags, pins, an
//! archive, a basket and per-note reminders, derives the filtered list a UI
//! shows, and tracks multi-select state over it.

mod cli;
mod clock;
mod config;
mod engine;
mod errors;
mod filter;
mod helper;
mod link_preview;
mod note;
mod note_store;
mod persist_worker;
mod persistence;
mod selection;
mod storage;
mod types;

// Re-export key components
pub use cli::*;
pub use clock::*;
pub use config::*;
pub use engine::*;
pub use errors::*;
pub use filter::*;
pub use helper::*;
pub use link_preview::*;
pub use note::*;
pub use note_store::*;
pub use persist_worker::*;
pub use persistence::*;
pub use selection::*;
pub use storage::*;
pub use types::*;
