use serde::{Deserialize, Serialize};
use crate::core::search_index::IndexState;
use crate::query::cache::CacheStats;

/// Per-index statistics for monitoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub index: String,
    pub status: IndexState,
    /// Live documents in the document store.
    pub docs: u64,
    /// Tombstones awaiting reclamation.
    pub deleted_docs: u64,
    /// Live documents visible to search.
    pub searchable_docs: u64,
    /// Written but not yet refreshed.
    pub buffered_docs: usize,
    pub segment_count: usize,
    pub generation: u64,
    pub mapped_fields: usize,
    pub query_cache: CacheStats,
}

/// One row of `cat_indices`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSummary {
    pub index: String,
    pub status: IndexState,
    pub docs_count: u64,
    pub docs_deleted: u64,
    pub shards: u32,
    pub replicas: u32,
}
