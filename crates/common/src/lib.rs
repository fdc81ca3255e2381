//! Shared utilities, configuration, and error handling for Newsrelay
//!
//! This crate provides common functionality used across the Newsrelay workspace:
//! - Configuration management following 12-factor principles
//! - Error types and handling
//! - State machine error types

pub mod config;
pub mod error;
pub mod state;

pub use config::Config;
pub use error::{Error, Result};
pub use state::StateError;
