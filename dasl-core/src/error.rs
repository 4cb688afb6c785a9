//! Error types for DASL
//!
//! This module defines the error types used throughout DASL.

use thiserror::Error;

/// The main error type for DASL operations
#[derive(Error, Debug)]
pub enum Error {
    /// An insert policy name could not be parsed
    #[error("unknown insert policy: {0}")]
    UnknownPolicy(String),

    /// Structural corruption was detected by the validator
    #[error("corruption detected: {0}")]
    Corruption(String),
}

/// A specialized Result type for DASL operations
pub type Result<T> = std::result::Result<T, Error>;
