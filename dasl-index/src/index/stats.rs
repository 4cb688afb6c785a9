//! Occupancy profiling
//!
//! Split policy choices trade node utilization against split cost, so
//! the index exposes how full its nodes actually are: an iterator over
//! every node's fill ratio, level by level.

use super::node::{NodeId, ARR_SIZE};
use super::skiplist::DenseSkipList;

/// Fill ratio of one node: `live keys / ARR_SIZE`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeFill {
    /// Level the node lives on (0 is the base list).
    pub level: usize,
    /// Occupancy in `(0.0, 1.0]`.
    pub fill: f64,
}

/// Iterator over the fill ratio of every node, bottom level first,
/// forward order within a level.
pub struct Utilization<'a> {
    list: &'a DenseSkipList,
    level: usize,
    cursor: NodeId,
}

impl Iterator for Utilization<'_> {
    type Item = NodeFill;

    fn next(&mut self) -> Option<NodeFill> {
        loop {
            if self.cursor.is_nil() {
                self.level += 1;
                if self.level >= self.list.max_height() {
                    return None;
                }
                self.cursor = self.list.node(self.list.head(self.level)).forward;
                continue;
            }
            let node = self.list.node(self.cursor);
            let fill = NodeFill {
                level: self.level,
                fill: node.len() as f64 / ARR_SIZE as f64,
            };
            self.cursor = node.forward;
            return Some(fill);
        }
    }
}

impl DenseSkipList {
    /// Per-node fill ratios across all levels.
    pub fn utilization(&self) -> Utilization<'_> {
        Utilization {
            list: self,
            level: 0,
            cursor: self.node(self.head(0)).forward,
        }
    }

    /// Mean fill ratio of one level, or `None` when the level holds no
    /// nodes.
    pub fn mean_fill(&self, level: usize) -> Option<f64> {
        let mut total = 0.0;
        let mut nodes = 0u64;
        for fill in self.utilization().filter(|f| f.level == level) {
            total += fill.fill;
            nodes += 1;
        }
        (nodes > 0).then(|| total / nodes as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utilization_reports_every_node() {
        let mut index = DenseSkipList::new();
        for key in 1..=16 {
            index.insert(key);
        }
        let fills: Vec<NodeFill> = index.utilization().collect();
        assert!(!fills.is_empty());
        assert!(fills.iter().all(|f| f.fill > 0.0 && f.fill <= 1.0));
        // Bottom level first.
        assert_eq!(fills[0].level, 0);
        let level0 = fills.iter().filter(|f| f.level == 0).count() as u64;
        // 16 keys cannot fit in fewer than four nodes.
        assert!(level0 >= 4);
    }

    #[test]
    fn mean_fill_is_bounded() {
        let mut index = DenseSkipList::new();
        for key in 1..=100 {
            index.insert(key);
        }
        let mean = index.mean_fill(0).unwrap();
        assert!(mean > 0.25 && mean <= 1.0);
        assert_eq!(index.mean_fill(index.max_height()), None);
    }

    #[test]
    fn empty_index_has_no_utilization() {
        let index = DenseSkipList::new();
        assert_eq!(index.utilization().count(), 0);
    }
}
