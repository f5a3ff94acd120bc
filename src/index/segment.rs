use chrono::{DateTime, Utc};
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;
use crate::core::types::{DocId, Source};
use crate::index::inverted::InvertedIndex;

/// Unique segment identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentId(pub Uuid);

impl SegmentId {
    pub fn new() -> Self {
        SegmentId(Uuid::new_v4())
    }
}

impl Default for SegmentId {
    fn default() -> Self {
        SegmentId::new()
    }
}

/// Source and version of one document as it was when indexed.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDoc {
    pub id: String,
    pub version: u64,
    pub source: Arc<Source>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentMetadata {
    pub created_at: DateTime<Utc>,
    pub doc_count: u32,
    pub min_doc_id: DocId,
    pub max_doc_id: DocId,
}

/// Immutable unit of searchable documents, sealed by a refresh or produced by a merge.
#[derive(Debug)]
pub struct Segment {
    pub id: SegmentId,
    pub index: InvertedIndex,
    pub stored: BTreeMap<DocId, StoredDoc>,
    pub metadata: SegmentMetadata,
}

impl Segment {
    pub fn new(index: InvertedIndex, stored: BTreeMap<DocId, StoredDoc>) -> Self {
        let min_doc_id = stored.keys().next().copied().unwrap_or_default();
        let max_doc_id = stored.keys().next_back().copied().unwrap_or_default();
        Segment {
            id: SegmentId::new(),
            metadata: SegmentMetadata {
                created_at: Utc::now(),
                doc_count: stored.len() as u32,
                min_doc_id,
                max_doc_id,
            },
            index,
            stored,
        }
    }

    pub fn doc_count(&self) -> u32 {
        self.metadata.doc_count
    }

    pub fn stored(&self, doc_id: DocId) -> Option<&StoredDoc> {
        self.stored.get(&doc_id)
    }

    /// Ordinals held by this segment.
    pub fn doc_ids(&self) -> RoaringBitmap {
        self.stored.keys().map(|d| d.0).collect()
    }

    pub fn deleted_count(&self, deleted: &RoaringBitmap) -> u64 {
        if deleted.is_empty() || self.stored.is_empty() {
            return 0;
        }
        let range = self.metadata.min_doc_id.0..=self.metadata.max_doc_id.0;
        if deleted.range_cardinality(range) == 0 {
            return 0;
        }
        self.doc_ids().intersection_len(deleted)
    }

    pub fn live_doc_count(&self, deleted: &RoaringBitmap) -> u64 {
        self.doc_count() as u64 - self.deleted_count(deleted)
    }

    pub fn delete_ratio(&self, deleted: &RoaringBitmap) -> f64 {
        if self.doc_count() == 0 {
            return 0.0;
        }
        self.deleted_count(deleted) as f64 / self.doc_count() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(ordinals: &[u32]) -> Segment {
        let stored = ordinals
            .iter()
            .map(|o| {
                (
                    DocId(*o),
                    StoredDoc {
                        id: o.to_string(),
                        version: 1,
                        source: Arc::new(Source::new()),
                    },
                )
            })
            .collect();
        Segment::new(InvertedIndex::new(), stored)
    }

    #[test]
    fn counts_live_documents() {
        let seg = segment(&[4, 5, 6, 7]);
        assert_eq!(seg.metadata.min_doc_id, DocId(4));
        assert_eq!(seg.metadata.max_doc_id, DocId(7));

        let mut deleted = RoaringBitmap::new();
        deleted.insert(1);
        assert_eq!(seg.deleted_count(&deleted), 0);

        deleted.insert(5);
        assert_eq!(seg.live_doc_count(&deleted), 3);
        assert!((seg.delete_ratio(&deleted) - 0.25).abs() < f64::EPSILON);
    }
}
