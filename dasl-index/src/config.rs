//! Configuration for the index

use dasl_core::InsertPolicy;

/// Configuration options for a [`DenseSkipList`](crate::DenseSkipList)
///
/// # Example
///
/// ```
/// use dasl_core::InsertPolicy;
/// use dasl_index::{DenseSkipList, IndexConfig};
///
/// let config = IndexConfig {
///     policy: InsertPolicy::EvenSplit,
///     level_seed: Some(7),
/// };
/// let index = DenseSkipList::with_config(config);
/// assert!(index.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// How insertion handles full nodes; see [`InsertPolicy`]
    pub policy: InsertPolicy,

    /// Seed for the random level generator used by
    /// [`InsertPolicy::FullHeightArray`]. `None` seeds from entropy; a
    /// fixed seed makes array construction deterministic, which tests
    /// rely on. The other policies never draw from the generator.
    pub level_seed: Option<u64>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            policy: InsertPolicy::default(),
            level_seed: None,
        }
    }
}
