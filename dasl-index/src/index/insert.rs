//! The insertion engine
//!
//! Insertion descends once, then runs a bottom-up loop. At each level
//! the target location falls into one of three positions (the level
//! is empty, the insertion lands in front of the first node, or it
//! lands inside or after a node on the path), crossed with whether the
//! target node still has room. A mutation that creates a node or fills
//! one exactly promotes the affected node's leader to the next level,
//! so splits cascade upward; any mutation that displaces a node's
//! slot-0 key rewrites the copies of that key held by upper levels.
//!
//! How a full node is handled is the only thing the insert policies
//! disagree on: the split policies divide it (unevenly or evenly), the
//! raise policies shift the overflow key into the successor node, and
//! full-height array construction never reaches this code at all. It
//! places a whole column of random height in one pass.

use dasl_core::{InsertPolicy, Key};
use log::{debug, trace};
use rand::Rng;

use super::node::{NodeId, ARR_SIZE, HALF};
use super::skiplist::{DenseSkipList, MAX_HEIGHT};

/// Chance of a column growing one more level is 1 in this.
const BRANCHING_FACTOR: u32 = 4;

/// Outcome of one level of the cascade.
enum Step {
    /// The mutation completed; nothing propagates upward.
    Done,
    /// `node` was created or exactly filled; its leader `key` must be
    /// indexed one level up, with the new slot's downward reference
    /// aimed at `node`.
    Promote { key: Key, node: NodeId },
}

impl DenseSkipList {
    /// Inserts `key`. Idempotent: re-inserting an existing key leaves
    /// the structure untouched. The key must not be 0.
    pub fn insert(&mut self, key: Key) {
        debug_assert_ne!(key, 0, "key 0 is reserved for empty slots");
        match self.policy {
            InsertPolicy::FullHeightArray => self.insert_array(key),
            _ => self.insert_cascade(key),
        }
    }

    fn insert_cascade(&mut self, key: Key) {
        let mut prev = self.descend(key);

        // The descent lands on the only level-0 node that could hold
        // the key, so this check is complete.
        if !self.is_head(prev[0]) && self.node(prev[0]).position_of(key).is_some() {
            return;
        }

        let mut level = 0;
        let mut ins = key;
        let mut child = NodeId::NIL;
        loop {
            let head = self.head(level);
            let step = if prev[level] == head && self.node(head).forward.is_nil() {
                self.start_level(level, ins, child)
            } else if prev[level] == head {
                self.insert_after_head(level, ins, child, &mut prev)
            } else {
                self.insert_between(level, ins, child, &mut prev)
            };
            match step {
                Step::Done => break,
                Step::Promote { key, node } => {
                    if level + 1 == MAX_HEIGHT {
                        // Height is capped: the key is placed below,
                        // it just stops being indexed higher up.
                        break;
                    }
                    level += 1;
                    if level >= self.max_height {
                        self.max_height = level + 1;
                        debug!("index height grew to {}", self.max_height);
                    }
                    ins = key;
                    child = node;
                }
            }
        }
        self.key_count += 1;
    }

    /// The level is empty: the key starts it as a single-key node.
    fn start_level(&mut self, level: usize, ins: Key, child: NodeId) -> Step {
        let node = self.alloc(ins, child);
        self.link_after(self.head(level), node);
        Step::Done
    }

    /// The insertion lands in front of the level's first node.
    fn insert_after_head(
        &mut self,
        level: usize,
        ins: Key,
        child: NodeId,
        prev: &mut [NodeId; MAX_HEIGHT],
    ) -> Step {
        let first = self.node(self.head(level)).forward;
        if !self.node(first).is_full() {
            return self.insert_into(level, first, ins, child, prev, false);
        }
        if self.node(first).leader() == ins {
            // A lower-level prepend already rewrote this node's slot 0
            // to the promotion key; it is indexed, stop here.
            return Step::Done;
        }
        // The descent stopped at the head, so the key precedes every
        // key at this level.
        debug_assert!(ins < self.node(first).leader());
        match self.policy {
            InsertPolicy::EvenSplit => self.split_even_first(level, first, ins, child, prev),
            InsertPolicy::UnevenSplit => {
                let node = self.alloc(ins, child);
                self.link_after(self.head(level), node);
                prev[level] = node;
                Step::Promote { key: ins, node }
            }
            InsertPolicy::RaiseOnly | InsertPolicy::SearchOnly => {
                // The raise policies leave the fresh node unindexed;
                // it gets promoted once it fills.
                let node = self.alloc(ins, child);
                self.link_after(self.head(level), node);
                prev[level] = node;
                Step::Done
            }
            InsertPolicy::FullHeightArray => {
                unreachable!("full-height construction does not cascade")
            }
        }
    }

    /// The insertion lands inside or right after `prev[level]`.
    fn insert_between(
        &mut self,
        level: usize,
        ins: Key,
        child: NodeId,
        prev: &mut [NodeId; MAX_HEIGHT],
    ) -> Step {
        if !self.node(prev[level]).is_full() {
            return self.insert_into(level, prev[level], ins, child, prev, true);
        }
        match self.policy {
            InsertPolicy::UnevenSplit => self.split_uneven(level, ins, child, prev),
            InsertPolicy::EvenSplit => self.split_even(level, ins, child, prev),
            InsertPolicy::RaiseOnly | InsertPolicy::SearchOnly => {
                self.raise_overflow(level, ins, child, prev)
            }
            InsertPolicy::FullHeightArray => {
                unreachable!("full-height construction does not cascade")
            }
        }
    }

    /// Places `ins` inside `target`, which has room.
    ///
    /// Shared by the at-head and between-nodes cases. `gated` adds the
    /// between-nodes condition that an exact fill only cascades while
    /// the parent position is still the level head; otherwise the
    /// node's leader is already indexed above and promotion would stop
    /// at the duplicate check anyway.
    fn insert_into(
        &mut self,
        level: usize,
        target: NodeId,
        ins: Key,
        child: NodeId,
        prev: &mut [NodeId; MAX_HEIGHT],
        gated: bool,
    ) -> Step {
        let found = self.locate(self.node(target), ins);
        if let Some(slot) = found {
            if self.node(target).keys[slot] == ins {
                // Promotion key already indexed at this level.
                return Step::Done;
            }
        }
        let slot = found.map_or(0, |found| found + 1);
        if slot == self.node(target).len() {
            let node = self.node_mut(target);
            node.keys[slot] = ins;
            node.down[slot] = child;
            node.len += 1;
        } else {
            let old_leader = self.node(target).leader();
            self.node_mut(target).shift_in(slot, ins, child);
            self.shift_count += 1;
            if found.is_none() {
                // The key became the new leader; higher levels still
                // reference the old one.
                self.repair_leaders(level + 1, old_leader, ins, prev);
            }
        }
        let cascade = self.node(target).is_full()
            && (!gated || (level + 1 < MAX_HEIGHT && prev[level + 1] == self.head(level + 1)));
        if cascade {
            Step::Promote {
                key: self.node(target).leader(),
                node: target,
            }
        } else {
            Step::Done
        }
    }

    /// Uneven split: peel as little as possible off the full node.
    fn split_uneven(
        &mut self,
        level: usize,
        ins: Key,
        child: NodeId,
        prev: &mut [NodeId; MAX_HEIGHT],
    ) -> Step {
        let target = prev[level];
        self.split_count += 1;
        let slot = self
            .locate(self.node(target), ins)
            .expect("between-nodes insertion follows a leader at most the key");
        debug_assert_ne!(self.node(target).keys[slot], ins);
        if slot == ARR_SIZE - 1 {
            // Overflow past the last slot: the key gets its own node.
            let node = self.alloc(ins, child);
            self.link_after(target, node);
            prev[level] = node;
            return Step::Promote { key: ins, node };
        }
        let sibling = self.split_off_upper(target);
        if slot < HALF {
            let at_end = slot + 1 == self.node(target).len();
            self.node_mut(target).shift_in(slot + 1, ins, child);
            if !at_end {
                self.shift_count += 1;
            }
        } else {
            self.node_mut(sibling).shift_in(slot - HALF + 1, ins, child);
            self.shift_count += 1;
        }
        prev[level] = sibling;
        Step::Promote {
            key: self.node(sibling).leader(),
            node: sibling,
        }
    }

    /// Even split: both sides keep half the keys, then `ins` joins
    /// whichever side covers its range.
    fn split_even(
        &mut self,
        level: usize,
        ins: Key,
        child: NodeId,
        prev: &mut [NodeId; MAX_HEIGHT],
    ) -> Step {
        let target = prev[level];
        self.split_count += 1;
        let slot = self
            .locate(self.node(target), ins)
            .expect("between-nodes insertion follows a leader at most the key");
        debug_assert_ne!(self.node(target).keys[slot], ins);
        let sibling = self.split_off_upper(target);
        if slot < HALF {
            let at_end = slot + 1 == self.node(target).len();
            self.node_mut(target).shift_in(slot + 1, ins, child);
            if !at_end {
                self.shift_count += 1;
            }
        } else {
            self.node_mut(sibling).shift_in(slot - HALF + 1, ins, child);
            self.shift_count += 1;
        }
        prev[level] = sibling;
        Step::Promote {
            key: self.node(sibling).leader(),
            node: sibling,
        }
    }

    /// Even split of the level's first node when the key precedes the
    /// whole level: the upper half moves out and the key becomes the
    /// left half's new leader.
    fn split_even_first(
        &mut self,
        level: usize,
        first: NodeId,
        ins: Key,
        child: NodeId,
        prev: &mut [NodeId; MAX_HEIGHT],
    ) -> Step {
        self.split_count += 1;
        let sibling = self.split_off_upper(first);
        let old_leader = self.node(first).leader();
        self.node_mut(first).shift_in(0, ins, child);
        self.shift_count += 1;
        self.repair_leaders(level + 1, old_leader, ins, prev);
        // The promotion must land in the node that indexes the first
        // node, which the descent never visited since the key precedes
        // the whole level. Aim the upper path at each level's first
        // node instead.
        for upper in level + 1..self.max_height {
            prev[upper] = self.node(self.head(upper)).forward;
        }
        prev[level] = sibling;
        Step::Promote {
            key: self.node(sibling).leader(),
            node: sibling,
        }
    }

    /// Raise policies: instead of splitting, the overflow key moves
    /// into the successor node when it has room.
    fn raise_overflow(
        &mut self,
        level: usize,
        ins: Key,
        child: NodeId,
        prev: &mut [NodeId; MAX_HEIGHT],
    ) -> Step {
        let target = prev[level];
        if ins > self.node(target).last_key() {
            // The key itself is the overflow.
            return match self.spill_right(level, target, ins, child, prev) {
                (node, true) => {
                    prev[level] = node;
                    Step::Promote { key: ins, node }
                }
                (_, false) => Step::Done,
            };
        }
        let slot = self
            .locate(self.node(target), ins)
            .expect("between-nodes insertion follows a leader at most the key");
        if self.node(target).keys[slot] == ins {
            return Step::Done;
        }
        // Peel the last key off to make room, insert in place.
        let peeled = self.node(target).last_key();
        let peeled_child = self.node(target).down[ARR_SIZE - 1];
        {
            let node = self.node_mut(target);
            node.keys.copy_within(slot + 1..ARR_SIZE - 1, slot + 2);
            node.down.copy_within(slot + 1..ARR_SIZE - 1, slot + 2);
            node.keys[slot + 1] = ins;
            node.down[slot + 1] = child;
        }
        self.shift_count += 1;
        match self.spill_right(level, target, peeled, peeled_child, prev) {
            (node, true) => {
                prev[level] = node;
                Step::Promote { key: peeled, node }
            }
            (_, false) => Step::Done,
        }
    }

    /// Moves an overflow key to the right: in front of the successor
    /// node when it has room, otherwise into a fresh node linked after
    /// `target`. Returns the node that received the key and whether it
    /// was newly created.
    fn spill_right(
        &mut self,
        level: usize,
        target: NodeId,
        key: Key,
        child: NodeId,
        prev: &[NodeId; MAX_HEIGHT],
    ) -> (NodeId, bool) {
        let forward = self.node(target).forward;
        if !forward.is_nil() && !self.node(forward).is_full() {
            let old_leader = self.node(forward).leader();
            self.node_mut(forward).shift_in(0, key, child);
            self.shift_count += 1;
            self.repair_leaders(level + 1, old_leader, key, prev);
            (forward, false)
        } else {
            let node = self.alloc(key, child);
            self.link_after(target, node);
            (node, true)
        }
    }

    /// Splits the upper half of `target` into a new sibling linked
    /// right after it.
    fn split_off_upper(&mut self, target: NodeId) -> NodeId {
        let sibling_node = self.node_mut(target).split_upper();
        let sibling = self.push_node(sibling_node);
        self.node_mut(target).forward = sibling;
        self.shift_count += 1;
        trace!(
            "split node {} at leader {}",
            target.0,
            self.node(target).leader()
        );
        sibling
    }

    /// Rewrites upper-level copies of a displaced leader key.
    ///
    /// A leader appears on a contiguous run of levels and sits in
    /// slot 0 everywhere except its topmost occurrence, so the walk
    /// stops at the first level where the repaired slot is not slot 0,
    /// or where the key is not indexed at all.
    fn repair_leaders(&mut self, from: usize, old: Key, new: Key, prev: &[NodeId; MAX_HEIGHT]) {
        for level in from..self.max_height {
            let mut repaired = None;
            for candidate in [prev[level], self.node(prev[level]).forward] {
                if candidate.is_nil() || self.is_head(candidate) {
                    continue;
                }
                if let Some(slot) = self.node(candidate).position_of(old) {
                    self.node_mut(candidate).keys[slot] = new;
                    repaired = Some(slot);
                    break;
                }
            }
            if repaired != Some(0) {
                break;
            }
        }
    }

    /// Full-height array construction: the key's final height is drawn
    /// up front and a full column is written bottom-up, without splits
    /// or cascades.
    ///
    /// The column stops early if the key lands in a non-leader slot:
    /// a downward reference must aim at the leader of its target, and
    /// this mode never splits a node to make the key one.
    fn insert_array(&mut self, key: Key) {
        let mut prev = self.descend(key);
        if !self.is_head(prev[0]) && self.node(prev[0]).position_of(key).is_some() {
            return;
        }
        let height = self.random_height();
        let mut child = NodeId::NIL;
        for level in 0..height {
            let (landed, as_leader) = self.place_in_column(level, key, child, &mut prev);
            if level >= self.max_height {
                self.max_height = level + 1;
            }
            if !as_leader {
                break;
            }
            child = landed;
        }
        self.key_count += 1;
    }

    /// Places `key` at one level of a full-height column. Returns the node
    /// that received it and whether it sits in slot 0 there.
    fn place_in_column(
        &mut self,
        level: usize,
        key: Key,
        child: NodeId,
        prev: &mut [NodeId; MAX_HEIGHT],
    ) -> (NodeId, bool) {
        let head = self.head(level);
        let target = prev[level];
        if target == head {
            let first = self.node(head).forward;
            if first.is_nil() || self.node(first).is_full() {
                let node = self.alloc(key, child);
                self.link_after(head, node);
                prev[level] = node;
                (node, true)
            } else {
                let old_leader = self.node(first).leader();
                self.node_mut(first).shift_in(0, key, child);
                self.shift_count += 1;
                self.repair_leaders(level + 1, old_leader, key, prev);
                (first, true)
            }
        } else if self.node(target).is_full() {
            if key > self.node(target).last_key() {
                let (landed, created) = self.spill_right(level, target, key, child, prev);
                if created {
                    prev[level] = landed;
                }
                (landed, true)
            } else {
                // Peel the last key out to make room for this one.
                let peeled = self.node(target).last_key();
                let peeled_child = self.node(target).down[ARR_SIZE - 1];
                let slot = self
                    .locate(self.node(target), key)
                    .expect("the column target leads with a key at most the new one");
                {
                    let node = self.node_mut(target);
                    node.keys.copy_within(slot + 1..ARR_SIZE - 1, slot + 2);
                    node.down.copy_within(slot + 1..ARR_SIZE - 1, slot + 2);
                    node.keys[slot + 1] = key;
                    node.down[slot + 1] = child;
                }
                self.shift_count += 1;
                self.spill_right(level, target, peeled, peeled_child, prev);
                (target, false)
            }
        } else {
            let slot = self
                .locate(self.node(target), key)
                .expect("the column target leads with a key at most the new one");
            let at_end = slot + 1 == self.node(target).len();
            self.node_mut(target).shift_in(slot + 1, key, child);
            if !at_end {
                self.shift_count += 1;
            }
            (target, false)
        }
    }

    /// Geometric column height: each extra level survives with
    /// probability 1 in [`BRANCHING_FACTOR`], capped at the height
    /// limit.
    fn random_height(&mut self) -> usize {
        let mut height = 1;
        while height < MAX_HEIGHT && self.rng.gen_ratio(1, BRANCHING_FACTOR) {
            height += 1;
        }
        height
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;

    fn with_policy(policy: InsertPolicy) -> DenseSkipList {
        DenseSkipList::with_config(IndexConfig {
            policy,
            level_seed: Some(0x5eed),
        })
    }

    fn level_keys(index: &DenseSkipList, level: usize) -> Vec<Key> {
        let mut keys = Vec::new();
        let mut x = index.node(index.head(level)).forward;
        while !x.is_nil() {
            let node = index.node(x);
            keys.extend_from_slice(&node.keys[..node.len()]);
            x = node.forward;
        }
        keys
    }

    fn level_nodes(index: &DenseSkipList, level: usize) -> Vec<Vec<Key>> {
        let mut nodes = Vec::new();
        let mut x = index.node(index.head(level)).forward;
        while !x.is_nil() {
            let node = index.node(x);
            nodes.push(node.keys[..node.len()].to_vec());
            x = node.forward;
        }
        nodes
    }

    #[test]
    fn uneven_split_keeps_the_key_left_of_the_peel() {
        let mut index = with_policy(InsertPolicy::UnevenSplit);
        for key in [10, 20, 30, 40] {
            index.insert(key);
        }
        index.insert(25);
        assert_eq!(
            level_nodes(&index, 0),
            vec![vec![10, 20, 25], vec![30, 40]]
        );
        assert_eq!(level_keys(&index, 1), vec![10, 30]);
        assert_eq!(index.split_count(), 1);
        index.validate().unwrap();
    }

    #[test]
    fn uneven_split_gives_a_trailing_key_its_own_node() {
        let mut index = with_policy(InsertPolicy::UnevenSplit);
        for key in [10, 20, 30, 40] {
            index.insert(key);
        }
        index.insert(45);
        assert_eq!(
            level_nodes(&index, 0),
            vec![vec![10, 20, 30, 40], vec![45]]
        );
        assert_eq!(level_keys(&index, 1), vec![10, 45]);
        index.validate().unwrap();
    }

    #[test]
    fn even_split_always_moves_half() {
        let mut index = with_policy(InsertPolicy::EvenSplit);
        for key in [10, 20, 30, 40] {
            index.insert(key);
        }
        index.insert(45);
        assert_eq!(
            level_nodes(&index, 0),
            vec![vec![10, 20], vec![30, 40, 45]]
        );
        assert_eq!(level_keys(&index, 1), vec![10, 30]);
        index.validate().unwrap();
    }

    #[test]
    fn even_split_at_the_front_renames_the_leader() {
        let mut index = with_policy(InsertPolicy::EvenSplit);
        for key in [10, 20, 30, 40] {
            index.insert(key);
        }
        index.insert(5);
        assert_eq!(level_nodes(&index, 0), vec![vec![5, 10, 20], vec![30, 40]]);
        assert_eq!(level_keys(&index, 1), vec![5, 30]);
        for key in [5, 10, 20, 30, 40] {
            assert!(index.contains(key), "missing {key}");
        }
        index.validate().unwrap();
    }

    #[test]
    fn raise_shifts_overflow_into_the_successor() {
        let mut index = with_policy(InsertPolicy::RaiseOnly);
        for key in [10, 20, 30, 40] {
            index.insert(key);
        }
        index.insert(25);
        // 40 overflows into a fresh node; no split happened.
        assert_eq!(
            level_nodes(&index, 0),
            vec![vec![10, 20, 25, 30], vec![40]]
        );
        assert_eq!(index.split_count(), 0);

        // The next overflow finds room in the successor and raises
        // into it, which renames its leader up the index.
        index.insert(35);
        assert_eq!(
            level_nodes(&index, 0),
            vec![vec![10, 20, 25, 30], vec![35, 40]]
        );
        assert_eq!(level_keys(&index, 1), vec![10, 35]);
        index.validate().unwrap();
    }

    #[test]
    fn search_policy_matches_raise_semantics() {
        let keys = [9u64, 81, 27, 3, 243, 729, 1, 2187, 6561, 31, 32, 33, 34];
        let mut raised = with_policy(InsertPolicy::RaiseOnly);
        let mut searched = with_policy(InsertPolicy::SearchOnly);
        for key in keys {
            raised.insert(key);
            searched.insert(key);
        }
        assert!(raised.keys().eq(searched.keys()));
        raised.validate().unwrap();
        searched.validate().unwrap();
    }

    #[test]
    fn array_insertion_is_deterministic_under_a_seed() {
        let build = || {
            let mut index = with_policy(InsertPolicy::FullHeightArray);
            for key in (1..200).map(|i| i * 31 % 199 + 1) {
                index.insert(key as Key);
            }
            index
        };
        let a = build();
        let b = build();
        assert!(a.keys().eq(b.keys()));
        assert_eq!(a.max_height(), b.max_height());
        a.validate().unwrap();
    }

    #[test]
    fn cascading_splits_grow_the_index() {
        let mut index = with_policy(InsertPolicy::UnevenSplit);
        for key in 1..=4096 {
            index.insert(key);
        }
        assert!(index.max_height() > 3);
        assert!(index.split_count() > 0);
        for key in [1, 777, 2048, 4096] {
            assert!(index.contains(key));
        }
        index.validate().unwrap();
    }

    #[test]
    fn interleaved_ranges_exercise_every_case() {
        for policy in [
            InsertPolicy::UnevenSplit,
            InsertPolicy::EvenSplit,
            InsertPolicy::RaiseOnly,
            InsertPolicy::SearchOnly,
            InsertPolicy::FullHeightArray,
        ] {
            let mut index = with_policy(policy);
            let mut expected = std::collections::BTreeSet::new();
            // Three interleaved arithmetic runs, one descending.
            for key in (2u64..300).step_by(3) {
                index.insert(key);
                expected.insert(key);
            }
            let mut sevens: Vec<Key> = (1..300).step_by(7).collect();
            sevens.reverse();
            for key in sevens {
                index.insert(key);
                expected.insert(key);
            }
            for key in (3u64..300).step_by(5) {
                index.insert(key);
                expected.insert(key);
            }
            assert!(
                index.keys().eq(expected.iter().copied()),
                "traversal mismatch under {policy:?}"
            );
            index
                .validate()
                .unwrap_or_else(|e| panic!("{policy:?}: {e}"));
        }
    }
}
