//! Intra-node search primitives
//!
//! All variants answer the same question about a node's key array:
//! which slot holds the largest live key at most the target? They
//! exist because the best answer-finding strategy depends on how full
//! the node is: the branchless probe touches `log2(ARR_SIZE)` slots no
//! matter what, while the two-wide scan wins on half-empty nodes that
//! fit in a single vector compare. Results must be identical.

use super::node::ARR_SIZE;
use dasl_core::{Key, EMPTY_KEY};

/// Branchless binary probe over the full array width.
///
/// Data-oblivious: the cursor advances by a shrinking power-of-two
/// step whenever the probed slot holds a live key at most the target.
/// Returns the raw cursor, which is 0 both when slot 0 is the answer
/// and when every live key is greater than the target; [`find_max_le`]
/// applies that correction.
pub(crate) fn probe(keys: &[Key; ARR_SIZE], target: Key) -> usize {
    let mut cursor = 0;
    let mut step = ARR_SIZE / 2;
    while step != 0 {
        let key = keys[cursor + step];
        let advance = (key != EMPTY_KEY && key <= target) as usize;
        cursor += step * advance;
        step /= 2;
    }
    cursor
}

/// Corrected probe: the last live slot at most the target, or `None`
/// when the node's leader is already greater (the "before slot 0"
/// case).
pub(crate) fn find_max_le(keys: &[Key; ARR_SIZE], target: Key) -> Option<usize> {
    let cursor = probe(keys, target);
    let key = keys[cursor];
    if key == EMPTY_KEY || key > target {
        None
    } else {
        Some(cursor)
    }
}

/// Scalar linear scan over the first `len` slots.
pub(crate) fn scan_linear(keys: &[Key; ARR_SIZE], len: usize, target: Key) -> Option<usize> {
    let mut best = None;
    for (slot, &key) in keys[..len].iter().enumerate() {
        if key > target {
            break;
        }
        best = Some(slot);
    }
    best
}

/// Two-wide linear scan.
///
/// Compares lane pairs the way a 2x64-bit vector greater-than does,
/// keeping the highest lane at most the target, with a scalar tail for
/// an odd length. The pair loop is written so the compiler can lower
/// it to a single 128-bit compare per step.
pub(crate) fn scan_pairwise(keys: &[Key; ARR_SIZE], len: usize, target: Key) -> Option<usize> {
    let mut best = None;
    let mut slot = 0;
    while slot + 2 <= len {
        let lane0 = keys[slot] <= target;
        let lane1 = keys[slot + 1] <= target;
        if lane1 {
            best = Some(slot + 1);
        } else if lane0 {
            best = Some(slot);
        }
        slot += 2;
    }
    if slot < len && keys[slot] <= target {
        best = Some(slot);
    }
    best
}
