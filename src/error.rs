//! Error types for framepump
//!
//! Defines crate-wide error types using thiserror for clear error propagation.

use crate::driver::DriverError;
use thiserror::Error;

/// Main error type for framepump
#[derive(Error, Debug)]
pub enum Error {
    /// Device configuration or parameter negotiation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation not valid in the current device state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Error reported by the output driver
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// Command channel send or receive failure
    #[error("Command channel error: {0}")]
    CommandChannel(String),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using framepump Error
pub type Result<T> = std::result::Result<T, Error>;
