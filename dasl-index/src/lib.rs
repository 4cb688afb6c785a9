//! DASL: a dense-array skip list
//!
//! This crate implements a single-writer, in-memory ordered index over
//! non-zero 64-bit keys. Unlike a classic skip list, every node packs
//! up to four keys with parallel downward references, so each level is
//! a linked list of small sorted arrays:
//!
//! ```text
//! level 2   head ─▶ [ 5 | 83 ]
//!                     │    │
//! level 1   head ─▶ [ 5 | 31 ] ─▶ [ 83 | 97 ]
//!                     │    │         │    │
//! level 0   head ─▶ [5,7] ─▶ [31,42] ─▶ [83,90] ─▶ [97]
//! ```
//!
//! The slot-0 key of a node (its *leader*) doubles as the key that
//! higher levels index it under. Insertion keeps three things aligned
//! at once: order inside each array, order across each level, and the
//! leader copies held by upper levels.
//!
//! # Example
//!
//! ```
//! use dasl_index::DenseSkipList;
//!
//! let mut index = DenseSkipList::new();
//! for key in [31, 7, 83, 42] {
//!     index.insert(key);
//! }
//! assert!(index.contains(42));
//! assert!(!index.contains(40));
//! assert_eq!(index.scan(8, 2), 42); // second key at or above 8
//! ```

pub mod config;
pub mod index;

pub use config::IndexConfig;
pub use index::{DenseSkipList, NodeFill};
