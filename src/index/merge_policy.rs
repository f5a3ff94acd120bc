use roaring::RoaringBitmap;
use std::sync::Arc;
use crate::index::segment::Segment;

/// Policy for deciding when and how to merge segments
pub trait MergePolicy: Send + Sync {
    /// Check if segments should be merged
    fn should_merge(&self, segments: &[Arc<Segment>], deleted: &RoaringBitmap) -> bool;

    /// Select segments to merge
    fn select_segments_to_merge(&self, segments: &[Arc<Segment>], deleted: &RoaringBitmap) -> Vec<Arc<Segment>>;
}

/// Tiered merge policy (similar to Lucene's TieredMergePolicy), sized by live document count.
#[derive(Debug, Clone)]
pub struct TieredMergePolicy {
    pub max_segments_per_tier: usize,
    pub min_segments_to_merge: usize,
    pub max_segments_to_merge: usize,
    /// Segments above this many live docs are only merged to expunge deletes.
    pub max_merged_docs: u64,
    /// Deleted fraction above which a segment is rewritten on its own.
    pub deletes_pct_allowed: f64,
}

impl Default for TieredMergePolicy {
    fn default() -> Self {
        TieredMergePolicy {
            max_segments_per_tier: 10,
            min_segments_to_merge: 2,
            max_segments_to_merge: 10,
            max_merged_docs: 5_000_000,
            deletes_pct_allowed: 0.33,
        }
    }
}

impl TieredMergePolicy {
    fn too_many_deletes(&self, segment: &Segment, deleted: &RoaringBitmap) -> bool {
        segment.delete_ratio(deleted) > self.deletes_pct_allowed
    }
}

impl MergePolicy for TieredMergePolicy {
    fn should_merge(&self, segments: &[Arc<Segment>], deleted: &RoaringBitmap) -> bool {
        segments.len() > self.max_segments_per_tier
            || segments.iter().any(|s| self.too_many_deletes(s, deleted))
    }

    fn select_segments_to_merge(&self, segments: &[Arc<Segment>], deleted: &RoaringBitmap) -> Vec<Arc<Segment>> {
        // Expunging deletes takes priority and may rewrite a single segment
        let expunge: Vec<Arc<Segment>> = segments
            .iter()
            .filter(|s| self.too_many_deletes(s, deleted))
            .take(self.max_segments_to_merge)
            .cloned()
            .collect();
        if !expunge.is_empty() {
            return expunge;
        }

        if segments.len() <= self.max_segments_per_tier {
            return Vec::new();
        }

        let mut sorted_segments = segments.to_vec();
        sorted_segments.sort_by_key(|s| s.live_doc_count(deleted));

        let mut selected = Vec::new();
        let mut merged_docs = 0;
        for segment in sorted_segments {
            let live = segment.live_doc_count(deleted);
            // Skip large segments
            if live > self.max_merged_docs / 2 {
                continue;
            }
            if merged_docs + live > self.max_merged_docs {
                break;
            }
            merged_docs += live;
            selected.push(segment);

            // Don't merge too many segments at once
            if selected.len() >= self.max_segments_to_merge {
                break;
            }
        }

        if selected.len() < self.min_segments_to_merge {
            Vec::new()
        } else {
            selected
        }
    }
}
