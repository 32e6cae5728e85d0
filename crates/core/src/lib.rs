//! Shared foundations for the frame pacer workspace.
//!
//! This crate provides the pieces every other crate leans on:
//! - Error types and result aliases
//! - Logging initialization
//! - TOML configuration for the window and the frame ring
//! - A frame clock for delta time and frame-rate reporting

pub mod config;

mod clock;
mod error;
mod logging;

pub use clock::FrameClock;
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use logging::init_logging;
