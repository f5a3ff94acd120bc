use serde::{Deserialize, Serialize};
use crate::core::settings::RefreshPolicy;
use crate::index::merge_policy::TieredMergePolicy;
use crate::query::validator::ValidationConfig;

/// Engine-wide configuration. Per-index knobs live in `IndexSettings`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Refresh policy of indices created without an explicit `refresh_interval`.
    pub default_refresh: RefreshPolicy,
    pub merge_policy: MergePolicyConfig,
    /// Cached search results per index; 0 disables the cache.
    pub query_cache_size: usize,
    pub validation: ValidationConfig,
    /// Stripes of the per-document lock table.
    pub lock_stripes: usize,
    pub reindex_batch_size: usize,
    /// Create missing indices on `index`/`create` writes.
    pub auto_create_index: bool,
    /// Map objects found by dynamic mapping as `nested` instead of `object`.
    pub dynamic_nested: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            default_refresh: RefreshPolicy::Immediate,
            merge_policy: MergePolicyConfig::default(),
            query_cache_size: 256,
            validation: ValidationConfig::default(),
            lock_stripes: 64,
            reindex_batch_size: 1000,
            auto_create_index: true,
            dynamic_nested: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergePolicyConfig {
    pub max_segments_per_tier: usize,
    pub min_segments_to_merge: usize,
    pub max_segments_to_merge: usize,
    pub max_merged_docs: u64,
    pub deletes_pct_allowed: f64,
}

impl Default for MergePolicyConfig {
    fn default() -> Self {
        let policy = TieredMergePolicy::default();
        MergePolicyConfig {
            max_segments_per_tier: policy.max_segments_per_tier,
            min_segments_to_merge: policy.min_segments_to_merge,
            max_segments_to_merge: policy.max_segments_to_merge,
            max_merged_docs: policy.max_merged_docs,
            deletes_pct_allowed: policy.deletes_pct_allowed,
        }
    }
}

impl From<&MergePolicyConfig> for TieredMergePolicy {
    fn from(config: &MergePolicyConfig) -> Self {
        TieredMergePolicy {
            max_segments_per_tier: config.max_segments_per_tier.max(1),
            min_segments_to_merge: config.min_segments_to_merge.max(1),
            max_segments_to_merge: config.max_segments_to_merge.max(2),
            max_merged_docs: config.max_merged_docs,
            deletes_pct_allowed: config.deletes_pct_allowed,
        }
    }
}
