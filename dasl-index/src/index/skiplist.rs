//! The index structure: level heads, descent, lookup, and scan
//!
//! A `DenseSkipList` owns an arena of nodes whose first [`MAX_HEIGHT`]
//! slots are the per-level sentinel heads. All mutation happens in
//! [`insert`](DenseSkipList::insert) (see the `insert` module);
//! `contains` and `scan` are pure readers.

use dasl_core::{Error, InsertPolicy, Key, Result, EMPTY_KEY};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;

use super::node::{Node, NodeId, ARR_SIZE, HALF};
use super::search::{find_max_le, probe, scan_linear, scan_pairwise};
use crate::config::IndexConfig;

/// Absolute cap on index levels.
pub(crate) const MAX_HEIGHT: usize = 50;

/// A single-writer, in-memory ordered index over non-zero `u64` keys.
///
/// Each node packs up to four keys next to four downward references;
/// the slot-0 key of a node is its *leader*, the key upper levels
/// index it under. Inserting may split nodes, cascade promotions
/// upward, and rewrite leader copies along the search path.
///
/// # Thread safety
///
/// None. Mutation takes `&mut self`; share behind external
/// synchronization if needed.
///
/// # Keys
///
/// The value 0 is reserved as the empty-slot sentinel and must not be
/// inserted; debug builds assert on it.
pub struct DenseSkipList {
    /// Node storage. Slots `0..MAX_HEIGHT` are the level heads; nodes
    /// are never freed while the index is alive.
    pub(crate) arena: Vec<Node>,
    /// Height of the tallest level currently in use (1-based).
    pub(crate) max_height: usize,
    pub(crate) policy: InsertPolicy,
    /// Level generator for full-height array construction.
    pub(crate) rng: StdRng,
    pub(crate) key_count: u64,
    pub(crate) shift_count: u64,
    pub(crate) split_count: u64,
}

impl DenseSkipList {
    /// Creates an empty index with the default configuration.
    pub fn new() -> Self {
        Self::with_config(IndexConfig::default())
    }

    /// Creates an empty index with the given configuration.
    pub fn with_config(config: IndexConfig) -> Self {
        let mut arena = Vec::with_capacity(MAX_HEIGHT + 16);
        for _ in 0..MAX_HEIGHT {
            arena.push(Node::sentinel());
        }
        let rng = match config.level_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            arena,
            max_height: 1,
            policy: config.policy,
            rng,
            key_count: 0,
            shift_count: 0,
            split_count: 0,
        }
    }

    pub(crate) fn head(&self, level: usize) -> NodeId {
        NodeId(level as u32)
    }

    pub(crate) fn is_head(&self, id: NodeId) -> bool {
        id.index() < MAX_HEIGHT
    }

    pub(crate) fn node(&self, id: NodeId) -> &Node {
        &self.arena[id.index()]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.arena[id.index()]
    }

    pub(crate) fn push_node(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.arena.len() as u32);
        self.arena.push(node);
        id
    }

    pub(crate) fn alloc(&mut self, key: Key, child: NodeId) -> NodeId {
        self.push_node(Node::new(key, child))
    }

    /// Links `node` into the chain right after `anchor`.
    pub(crate) fn link_after(&mut self, anchor: NodeId, node: NodeId) {
        let next = self.node(anchor).forward;
        self.node_mut(node).forward = next;
        self.node_mut(anchor).forward = node;
    }

    /// Walks from the top level down, recording at every level the
    /// last node whose leader is at most `key` (the level head when no
    /// such node exists).
    ///
    /// Within a level the cursor follows `forward` while the next
    /// leader still fits; dropping a level goes through the downward
    /// reference chosen by the intra-node search. The forward walk
    /// runs at every level so that lookups stay correct even for
    /// array-built lists, whose nodes are not all indexed above.
    pub(crate) fn descend(&self, key: Key) -> [NodeId; MAX_HEIGHT] {
        let mut prev: [NodeId; MAX_HEIGHT] = std::array::from_fn(|level| self.head(level));
        let mut level = self.max_height - 1;
        let mut x = self.head(level);
        loop {
            loop {
                let forward = self.node(x).forward;
                if forward.is_nil() || self.node(forward).leader() > key {
                    break;
                }
                x = forward;
            }
            prev[level] = x;
            if level == 0 {
                break;
            }
            level -= 1;
            x = if self.is_head(x) {
                self.head(level)
            } else {
                let node = self.node(x);
                node.down[self.level_index(node, key)]
            };
        }
        prev
    }

    /// Picks the downward slot for `key` inside `node` during descent.
    ///
    /// Raise and array construction use the scalar scan; the split
    /// policies use the two-wide scan on half-full nodes and the
    /// branchless probe otherwise. All selections return the same
    /// slot.
    pub(crate) fn level_index(&self, node: &Node, key: Key) -> usize {
        match self.policy {
            InsertPolicy::RaiseOnly | InsertPolicy::FullHeightArray => {
                scan_linear(&node.keys, node.len(), key).unwrap_or(0)
            }
            _ => {
                if node.len() <= HALF {
                    scan_pairwise(&node.keys, node.len(), key).unwrap_or(0)
                } else {
                    probe(&node.keys, key)
                }
            }
        }
    }

    /// Corrected in-node position for an insertion: the last live slot
    /// at most `key`, or `None` when the key precedes the leader.
    pub(crate) fn locate(&self, node: &Node, key: Key) -> Option<usize> {
        match self.policy {
            InsertPolicy::RaiseOnly | InsertPolicy::FullHeightArray => {
                scan_linear(&node.keys, node.len(), key)
            }
            _ => find_max_le(&node.keys, key),
        }
    }

    /// Returns true iff `key` was previously inserted.
    pub fn contains(&self, key: Key) -> bool {
        let prev = self.descend(key);
        let target = prev[0];
        if self.is_head(target) {
            // The key precedes every leader at level 0.
            return false;
        }
        let node = self.node(target);
        match find_max_le(&node.keys, key) {
            Some(slot) => node.keys[slot] == key,
            None => false,
        }
    }

    /// Returns the `count`-th key in ascending order starting at the
    /// smallest key at least `key`, or the last key visited when fewer
    /// remain. Returns 0 when nothing at or above `key` exists (or
    /// `count` is 0).
    pub fn scan(&self, key: Key, count: usize) -> Key {
        if count == 0 {
            return EMPTY_KEY;
        }
        let prev = self.descend(key);
        let mut x = if self.is_head(prev[0]) {
            self.node(prev[0]).forward
        } else {
            prev[0]
        };
        if x.is_nil() {
            return EMPTY_KEY;
        }
        // First slot at or above the target.
        let mut slot = match find_max_le(&self.node(x).keys, key) {
            Some(found) if self.node(x).keys[found] == key => found,
            Some(found) => found + 1,
            None => 0,
        };
        let mut emitted = 0;
        let mut last = EMPTY_KEY;
        loop {
            let node = self.node(x);
            while slot < node.len() && emitted < count {
                last = node.keys[slot];
                slot += 1;
                emitted += 1;
            }
            if emitted == count || node.forward.is_nil() {
                break;
            }
            x = node.forward;
            slot = 0;
        }
        last
    }

    /// Number of distinct keys in the index.
    pub fn len(&self) -> u64 {
        self.key_count
    }

    pub fn is_empty(&self) -> bool {
        self.key_count == 0
    }

    /// Height of the tallest level in use.
    pub fn max_height(&self) -> usize {
        self.max_height
    }

    /// Number of intra-node key shifts performed so far.
    pub fn shift_count(&self) -> u64 {
        self.shift_count
    }

    /// Number of node splits performed so far.
    pub fn split_count(&self) -> u64 {
        self.split_count
    }

    pub fn policy(&self) -> InsertPolicy {
        self.policy
    }

    /// Checks the structural invariants, returning
    /// [`Error::Corruption`] naming the first violation.
    ///
    /// Verified per level, bottom up: live counts in range, strict
    /// ascending order inside each node, zeroed dead slots, strict
    /// order across `forward` links, every downward reference aimed at
    /// a node one level down whose leader matches the indexing key,
    /// every populated level below the recorded height, and nothing
    /// above it. Intended for tests and debugging; cost is linear in
    /// the number of nodes.
    pub fn validate(&self) -> Result<()> {
        let mut below: HashMap<u32, Key> = HashMap::new();
        let mut level0_keys = 0u64;
        for level in 0..self.max_height {
            let mut current: HashMap<u32, Key> = HashMap::new();
            let mut x = self.node(self.head(level)).forward;
            if x.is_nil() && !(level == 0 && self.max_height == 1) {
                return Err(Error::Corruption(format!(
                    "level {level} is empty below max_height {}",
                    self.max_height
                )));
            }
            let mut prior: Option<Key> = None;
            while !x.is_nil() {
                let node = self.node(x);
                let len = node.len();
                if len == 0 || len > ARR_SIZE {
                    return Err(Error::Corruption(format!(
                        "node {} at level {level} has live count {len}",
                        x.0
                    )));
                }
                for slot in 0..len {
                    let key = node.keys[slot];
                    if key == EMPTY_KEY {
                        return Err(Error::Corruption(format!(
                            "node {} at level {level} holds the reserved key in live slot {slot}",
                            x.0
                        )));
                    }
                    if slot > 0 && node.keys[slot - 1] >= key {
                        return Err(Error::Corruption(format!(
                            "node {} at level {level} is unordered at slot {slot}",
                            x.0
                        )));
                    }
                    if level > 0 {
                        let child = node.down[slot];
                        match below.get(&child.0) {
                            Some(&leader) if leader == key => {}
                            Some(&leader) => {
                                return Err(Error::Corruption(format!(
                                    "node {} at level {level} indexes {key} but its target leads with {leader}",
                                    x.0
                                )));
                            }
                            None => {
                                return Err(Error::Corruption(format!(
                                    "node {} at level {level} slot {slot} references no node one level down",
                                    x.0
                                )));
                            }
                        }
                    }
                }
                for slot in len..ARR_SIZE {
                    if node.keys[slot] != EMPTY_KEY {
                        return Err(Error::Corruption(format!(
                            "node {} at level {level} has a live key above its count",
                            x.0
                        )));
                    }
                }
                if let Some(prior) = prior {
                    if prior >= node.keys[0] {
                        return Err(Error::Corruption(format!(
                            "forward order broken entering node {} at level {level}",
                            x.0
                        )));
                    }
                }
                prior = Some(node.keys[len - 1]);
                if level == 0 {
                    level0_keys += len as u64;
                }
                current.insert(x.0, node.leader());
                x = node.forward;
            }
            below = current;
        }
        for level in self.max_height..MAX_HEIGHT {
            if !self.node(self.head(level)).forward.is_nil() {
                return Err(Error::Corruption(format!(
                    "level {level} is populated above max_height {}",
                    self.max_height
                )));
            }
        }
        if level0_keys != self.key_count {
            return Err(Error::Corruption(format!(
                "level 0 holds {level0_keys} keys but the index counts {}",
                self.key_count
            )));
        }
        Ok(())
    }

    /// Ascending iterator over every key, by walking level 0.
    pub fn keys(&self) -> impl Iterator<Item = Key> + '_ {
        let first = self.node(self.head(0)).forward;
        KeyIter {
            list: self,
            node: first,
            slot: 0,
        }
    }
}

impl Default for DenseSkipList {
    fn default() -> Self {
        Self::new()
    }
}

struct KeyIter<'a> {
    list: &'a DenseSkipList,
    node: NodeId,
    slot: usize,
}

impl Iterator for KeyIter<'_> {
    type Item = Key;

    fn next(&mut self) -> Option<Key> {
        while !self.node.is_nil() {
            let node = self.list.node(self.node);
            if self.slot < node.len() {
                let key = node.keys[self.slot];
                self.slot += 1;
                return Some(key);
            }
            self.node = node.forward;
            self.slot = 0;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_index() {
        let index = DenseSkipList::new();
        assert!(!index.contains(1));
        assert_eq!(index.scan(1, 5), 0);
        assert_eq!(index.max_height(), 1);
        assert!(index.is_empty());
        index.validate().unwrap();
    }

    #[test]
    fn single_key() {
        let mut index = DenseSkipList::new();
        index.insert(42);
        assert!(index.contains(42));
        assert!(!index.contains(41));
        assert_eq!(index.keys().collect::<Vec<_>>(), vec![42]);
        assert_eq!(index.max_height(), 1);
        index.validate().unwrap();
    }

    #[test]
    fn filling_one_node_promotes_its_leader() {
        let mut index = DenseSkipList::new();
        for key in [10, 20, 30, 40] {
            index.insert(key);
        }
        assert_eq!(index.max_height(), 2);
        assert_eq!(index.keys().collect::<Vec<_>>(), vec![10, 20, 30, 40]);
        // One level-1 node, leading with 10, pointing at the full
        // level-0 node.
        let first = index.node(index.head(1)).forward;
        assert!(!first.is_nil());
        let node = index.node(first);
        assert_eq!(node.leader(), 10);
        assert_eq!(node.len(), 1);
        assert_eq!(index.node(node.down[0]).keys, [10, 20, 30, 40]);
        index.validate().unwrap();
    }

    #[test]
    fn new_smallest_key_repairs_upper_leaders() {
        let mut index = DenseSkipList::new();
        for key in [50, 60, 70, 80] {
            index.insert(key);
        }
        index.insert(5);
        for key in [5, 50, 60, 70, 80] {
            assert!(index.contains(key), "missing {key}");
        }
        assert_eq!(index.keys().collect::<Vec<_>>(), vec![5, 50, 60, 70, 80]);
        index.validate().unwrap();
    }

    #[test]
    fn duplicates_are_ignored() {
        let mut index = DenseSkipList::new();
        for key in [7, 7, 7, 3, 7, 3] {
            index.insert(key);
        }
        assert_eq!(index.keys().collect::<Vec<_>>(), vec![3, 7]);
        assert_eq!(index.len(), 2);
        assert!(index.contains(3));
        assert!(index.contains(7));
        assert!(!index.contains(5));
        index.validate().unwrap();
    }

    #[test]
    fn scan_counts_from_the_first_key_at_or_above_target() {
        let mut index = DenseSkipList::new();
        for key in 1..=1024 {
            index.insert(key);
        }
        assert_eq!(index.scan(1, 10), 10);
        assert_eq!(index.scan(1000, 3), 1002);
        // Fewer keys remain than asked for: the last one wins.
        assert_eq!(index.scan(1020, 100), 1024);
        assert_eq!(index.scan(2000, 4), 0);
    }

    #[test]
    fn sequential_load_keeps_invariants() {
        let mut index = DenseSkipList::new();
        for key in 1..=1024 {
            index.insert(key);
        }
        for key in 1..=1024 {
            assert!(index.contains(key), "missing {key}");
        }
        assert!(!index.contains(1025));
        index.validate().unwrap();
    }

    #[test]
    fn reverse_load_matches_sequential_load() {
        let mut ascending = DenseSkipList::new();
        let mut descending = DenseSkipList::new();
        for key in 1..=1024 {
            ascending.insert(key);
        }
        for key in (1..=1024).rev() {
            descending.insert(key);
        }
        assert!(ascending.keys().eq(descending.keys()));
        descending.validate().unwrap();
    }
}
