//! Core types used throughout DASL
//!
//! This module contains the fundamental data types that form the basis
//! of DASL's data model and configuration.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A key in the index, a fixed-width unsigned 64-bit integer
pub type Key = u64;

/// The reserved key value that marks an empty slot inside a node's
/// key array. Callers must not insert it.
pub const EMPTY_KEY: Key = 0;

/// The construction mode of the index, fixed when it is created
///
/// The modes share one search structure and differ only in how an
/// insertion handles a full node:
///
/// - [`UnevenSplit`](InsertPolicy::UnevenSplit) peels as few keys as
///   possible into the new sibling, favoring utilization on sorted
///   workloads.
/// - [`EvenSplit`](InsertPolicy::EvenSplit) always moves half the
///   node, giving tighter worst-case bounds.
/// - [`RaiseOnly`](InsertPolicy::RaiseOnly) and
///   [`SearchOnly`](InsertPolicy::SearchOnly) avoid splitting by
///   shifting the overflow key into the successor node when it has
///   room; they differ in the intra-node search primitive they run.
/// - [`FullHeightArray`](InsertPolicy::FullHeightArray) draws a random
///   height per key and writes a full column at once, without splits
///   or cascades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum InsertPolicy {
    /// Split a full node by peeling off as little as one key
    #[default]
    UnevenSplit,
    /// Split a full node into two halves
    EvenSplit,
    /// Shift overflow into the successor node, scalar linear search
    RaiseOnly,
    /// Shift overflow into the successor node, hybrid search
    SearchOnly,
    /// Random-height column insertion, no splitting
    FullHeightArray,
}

impl FromStr for InsertPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "usplit" | "uneven-split" => Ok(InsertPolicy::UnevenSplit),
            "esplit" | "even-split" => Ok(InsertPolicy::EvenSplit),
            "raise" => Ok(InsertPolicy::RaiseOnly),
            "search" => Ok(InsertPolicy::SearchOnly),
            "array" => Ok(InsertPolicy::FullHeightArray),
            other => Err(Error::UnknownPolicy(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_names_parse() {
        assert_eq!(
            "usplit".parse::<InsertPolicy>().unwrap(),
            InsertPolicy::UnevenSplit
        );
        assert_eq!(
            "esplit".parse::<InsertPolicy>().unwrap(),
            InsertPolicy::EvenSplit
        );
        assert_eq!(
            "array".parse::<InsertPolicy>().unwrap(),
            InsertPolicy::FullHeightArray
        );
        assert!("btree".parse::<InsertPolicy>().is_err());
    }
}
