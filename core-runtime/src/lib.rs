//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the collection core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Generic event bus
//!
//! Other crates depend on this one for the logging conventions, the
//! configuration builder and the broadcast channel that carries change
//! notifications from a collection backend to its consumers.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
