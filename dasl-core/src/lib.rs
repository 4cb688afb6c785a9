//! Core types and traits for DASL
//!
//! This crate contains the fundamental types and error handling used
//! throughout the DASL project. It provides:
//!
//! - Common error types with [`Error`] and [`Result`]
//! - The [`Key`] type and its reserved empty-slot sentinel
//! - The [`InsertPolicy`] selector for the index's construction modes
//!
//! # Example
//!
//! ```
//! use dasl_core::{InsertPolicy, Key, EMPTY_KEY};
//!
//! let key: Key = 42;
//! assert_ne!(key, EMPTY_KEY);
//! let policy = InsertPolicy::default();
//! assert_eq!(policy, InsertPolicy::UnevenSplit);
//! ```

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;
