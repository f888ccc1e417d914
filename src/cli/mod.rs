//! Command-line driver for the notepad engine.
mod app;
mod args;

pub use app::*;
pub use args::*;
