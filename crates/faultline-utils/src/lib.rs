//! # Faultline Utilities
//!
//! Shared utilities, logging, config, and helpers for Faultline.
//!
//! This crate provides common functionality used across the Faultline workspace,
//! including the logging setup built on `tracing`.

pub mod logging;

// Re-export commonly used logging functions for convenience
pub use logging::{init_logging, init_logging_with_level, LogFormat, LogLevel, LoggingError};
pub use tracing::{debug, error, info, trace, warn};
