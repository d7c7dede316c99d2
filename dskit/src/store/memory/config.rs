use std::sync::Arc;

use crate::common::DEFAULT_QUERY_BATCH_SIZE;

/// How the in-memory store completes incomplete keys.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IdAllocation {
    /// Random positive ids below 2^53, the way the hosted store scatters them.
    #[default]
    Scattered,
    /// Increasing ids starting at 1. Handy for deterministic tests.
    Sequential,
}

/// Configuration of an [`InMemoryDatastore`](super::InMemoryDatastore).
///
/// Cheap to clone; clones share the same settings.
#[derive(Clone, Debug)]
pub struct MemoryStoreConfig {
    inner: Arc<MemoryStoreConfigInner>,
}

#[derive(Debug)]
struct MemoryStoreConfigInner {
    batch_size: usize,
    id_allocation: IdAllocation,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        MemoryStoreConfig::new()
    }
}

impl MemoryStoreConfig {
    pub fn new() -> MemoryStoreConfig {
        MemoryStoreConfig {
            inner: Arc::new(MemoryStoreConfigInner {
                batch_size: DEFAULT_QUERY_BATCH_SIZE,
                id_allocation: IdAllocation::Scattered,
            }),
        }
    }

    /// Maximum number of rows returned by one query batch. Zero is raised
    /// to one.
    pub fn with_batch_size(self, batch_size: usize) -> MemoryStoreConfig {
        MemoryStoreConfig {
            inner: Arc::new(MemoryStoreConfigInner {
                batch_size: batch_size.max(1),
                id_allocation: self.inner.id_allocation,
            }),
        }
    }

    pub fn with_id_allocation(self, id_allocation: IdAllocation) -> MemoryStoreConfig {
        MemoryStoreConfig {
            inner: Arc::new(MemoryStoreConfigInner {
                batch_size: self.inner.batch_size,
                id_allocation,
            }),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.inner.batch_size
    }

    pub fn id_allocation(&self) -> IdAllocation {
        self.inner.id_allocation
    }
}
