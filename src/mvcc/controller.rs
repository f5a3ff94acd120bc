use arc_swap::ArcSwap;
use parking_lot::RwLock;
use roaring::RoaringBitmap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use crate::core::types::DocId;
use crate::index::inverted::FieldIndex;
use crate::index::segment::{Segment, StoredDoc};

/// Collection statistics of one field over live documents.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FieldStats {
    pub doc_count: u64,
    pub sum_length: u64,
}

impl FieldStats {
    pub fn avg_length(&self) -> f32 {
        if self.doc_count == 0 {
            return 0.0;
        }
        self.sum_length as f32 / self.doc_count as f32
    }
}

/// Snapshot of index at a point in time
#[derive(Debug)]
pub struct Snapshot {
    pub generation: u64,
    pub segments: Vec<Arc<Segment>>,
    pub deleted_docs: Arc<RoaringBitmap>,
    field_stats: RwLock<HashMap<String, FieldStats>>,
}

impl Snapshot {
    pub fn new(generation: u64, segments: Vec<Arc<Segment>>, deleted_docs: Arc<RoaringBitmap>) -> Self {
        Snapshot {
            generation,
            segments,
            deleted_docs,
            field_stats: RwLock::new(HashMap::new()),
        }
    }

    pub fn empty() -> Self {
        Snapshot::new(0, Vec::new(), Arc::new(RoaringBitmap::new()))
    }

    pub fn is_live(&self, doc_id: DocId) -> bool {
        !self.deleted_docs.contains(doc_id.0)
    }

    pub fn live_doc_count(&self) -> u64 {
        self.segments.iter().map(|s| s.live_doc_count(&self.deleted_docs)).sum()
    }

    pub fn deleted_doc_count(&self) -> u64 {
        self.segments.iter().map(|s| s.deleted_count(&self.deleted_docs)).sum()
    }

    /// Stored document for a live ordinal.
    pub fn stored(&self, doc_id: DocId) -> Option<&StoredDoc> {
        if !self.is_live(doc_id) {
            return None;
        }
        self.segments
            .iter()
            .filter(|s| s.metadata.min_doc_id <= doc_id && doc_id <= s.metadata.max_doc_id)
            .find_map(|s| s.stored(doc_id))
    }

    /// Per-segment structures of a field, skipping segments that never saw it.
    pub fn field_indexes<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a FieldIndex> + 'a {
        self.segments.iter().filter_map(move |s| s.index.field(field))
    }

    /// Live documents containing `term` in `field`.
    pub fn doc_freq(&self, field: &str, term: &str) -> u64 {
        self.field_indexes(field)
            .filter_map(|f| f.postings(term))
            .map(|p| p.live_doc_freq(&self.deleted_docs) as u64)
            .sum()
    }

    /// Cached per snapshot: segments and tombstones never change under it.
    pub fn field_stats(&self, field: &str) -> FieldStats {
        if let Some(stats) = self.field_stats.read().get(field) {
            return *stats;
        }
        let mut stats = FieldStats::default();
        for index in self.field_indexes(field) {
            stats.doc_count += index.live_docs(&self.deleted_docs).len();
            stats.sum_length += index.live_length_sum(&self.deleted_docs);
        }
        self.field_stats.write().insert(field.to_string(), stats);
        stats
    }
}

/// Publishes snapshots. Readers load the current one without locking.
pub struct MVCCController {
    current: ArcSwap<Snapshot>,
    generation: AtomicU64,
}

impl MVCCController {
    pub fn new() -> Self {
        MVCCController {
            current: ArcSwap::from_pointee(Snapshot::empty()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// Atomically replaces the visible state and returns it.
    pub fn publish(&self, segments: Vec<Arc<Segment>>, deleted_docs: Arc<RoaringBitmap>) -> Arc<Snapshot> {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let snapshot = Arc::new(Snapshot::new(generation, segments, deleted_docs));
        self.current.store(snapshot.clone());
        snapshot
    }
}

impl Default for MVCCController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Source;
    use crate::index::inverted::{AnalyzedField, InvertedIndex};
    use std::collections::BTreeMap;

    fn segment(start: u32, terms: &[&str]) -> Arc<Segment> {
        let mut index = InvertedIndex::new();
        let mut stored = BTreeMap::new();
        for (i, term) in terms.iter().enumerate() {
            let doc_id = DocId(start + i as u32);
            let mut field = AnalyzedField::default();
            field.add_term(term.to_string(), 0);
            field.length = Some(2);
            let fields = BTreeMap::from([("body".to_string(), field)]);
            index.add_document(doc_id, &fields);
            stored.insert(
                doc_id,
                StoredDoc {
                    id: doc_id.0.to_string(),
                    version: 1,
                    source: Arc::new(Source::new()),
                },
            );
        }
        Arc::new(Segment::new(index, stored))
    }

    #[test]
    fn publish_bumps_generation() {
        let mvcc = MVCCController::new();
        assert_eq!(mvcc.snapshot().generation, 0);

        let published = mvcc.publish(vec![segment(0, &["a"])], Arc::new(RoaringBitmap::new()));
        assert_eq!(published.generation, 1);
        assert_eq!(mvcc.snapshot().generation, 1);
        assert_eq!(mvcc.snapshot().live_doc_count(), 1);
    }

    #[test]
    fn statistics_skip_tombstones() {
        let mut deleted = RoaringBitmap::new();
        deleted.insert(1);
        let snapshot = Snapshot::new(
            3,
            vec![segment(0, &["fox", "fox"]), segment(2, &["fox", "dog"])],
            Arc::new(deleted),
        );

        assert_eq!(snapshot.doc_freq("body", "fox"), 2);
        assert_eq!(snapshot.doc_freq("missing", "fox"), 0);
        let stats = snapshot.field_stats("body");
        assert_eq!(stats.doc_count, 3);
        assert_eq!(stats.avg_length(), 2.0);
        assert!(snapshot.stored(DocId(1)).is_none());
        assert_eq!(snapshot.stored(DocId(3)).unwrap().id, "3");
        assert_eq!(snapshot.deleted_doc_count(), 1);
    }
}
