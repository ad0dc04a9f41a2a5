//! Sotto library modules.
//!
//! The binary in `main.rs` is a thin CLI over these.

pub mod config;
pub mod controller;
pub mod daemon;
pub mod engine;
pub mod input;
pub mod output;
pub mod status;
