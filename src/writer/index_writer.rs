use roaring::RoaringBitmap;
use std::collections::BTreeMap;
use std::mem;
use std::sync::Arc;
use tracing::debug;
use crate::core::types::DocId;
use crate::index::inverted::InvertedIndex;
use crate::index::merge_policy::MergePolicy;
use crate::index::segment::{Segment, StoredDoc};
use crate::mvcc::controller::{MVCCController, Snapshot};
use crate::writer::analyzed::AnalyzedDocument;

/// Outcome of a merge pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub segments_merged: usize,
    pub docs_reclaimed: u64,
}

/// Single writer per index: buffers analyzed documents, seals them into segments
/// on refresh and publishes snapshots. Callers hold it behind a mutex.
pub struct IndexWriter {
    index: String,
    buffer: InvertedIndex,
    buffer_docs: BTreeMap<DocId, StoredDoc>,
    segments: Vec<Arc<Segment>>,
    deleted: RoaringBitmap,
    next_ordinal: u32,
    /// Deletes not yet published.
    dirty: bool,
    mvcc: Arc<MVCCController>,
    merge_policy: Box<dyn MergePolicy>,
}

impl IndexWriter {
    pub fn new(index: &str, mvcc: Arc<MVCCController>, merge_policy: Box<dyn MergePolicy>) -> Self {
        IndexWriter {
            index: index.to_string(),
            buffer: InvertedIndex::new(),
            buffer_docs: BTreeMap::new(),
            segments: Vec::new(),
            deleted: RoaringBitmap::new(),
            next_ordinal: 0,
            dirty: false,
            mvcc,
            merge_policy,
        }
    }

    /// Buffers a document under a fresh ordinal and tombstones the version it
    /// replaces, so a refresh publishes both changes together.
    pub fn add_document(&mut self, doc: &AnalyzedDocument, stored: StoredDoc, replaces: Option<DocId>) -> DocId {
        let doc_id = DocId(self.next_ordinal);
        self.next_ordinal += 1;

        if let Some(previous) = replaces {
            self.delete_document(previous);
        }
        self.buffer.add_document(doc_id, &doc.fields);
        self.buffer_docs.insert(doc_id, stored);
        doc_id
    }

    /// Marks an ordinal deleted. Its postings stay until a merge reclaims them.
    pub fn delete_document(&mut self, doc_id: DocId) {
        if self.deleted.insert(doc_id.0) {
            self.dirty = true;
        }
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.buffer_docs.is_empty() || self.dirty
    }

    pub fn buffered_docs(&self) -> usize {
        self.buffer_docs.len()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn deleted_count(&self) -> u64 {
        self.deleted.len()
    }

    /// Seals the buffer, runs the merge policy and publishes a new snapshot.
    /// Returns the current snapshot unchanged when nothing is pending.
    pub fn refresh(&mut self) -> Arc<Snapshot> {
        if !self.has_pending_changes() {
            return self.mvcc.snapshot();
        }
        self.seal();

        while self.merge_policy.should_merge(&self.segments, &self.deleted) {
            let selected = self.merge_policy.select_segments_to_merge(&self.segments, &self.deleted);
            if selected.is_empty() {
                break;
            }
            self.merge(&selected);
        }
        self.publish()
    }

    /// Merges every segment into one, dropping all tombstoned ordinals.
    pub fn force_merge(&mut self) -> MergeSummary {
        self.seal();
        let needs_merge = self.segments.len() > 1 || !self.deleted.is_empty();
        let summary = if needs_merge && !self.segments.is_empty() {
            let all = self.segments.clone();
            self.merge(&all)
        } else {
            MergeSummary::default()
        };
        self.dirty = true;
        self.publish();
        summary
    }

    fn seal(&mut self) {
        if self.buffer_docs.is_empty() {
            return;
        }
        let mut index = mem::take(&mut self.buffer);
        let mut stored = mem::take(&mut self.buffer_docs);

        // Drop documents replaced before they were ever published
        let buffered: RoaringBitmap = stored.keys().map(|d| d.0).collect();
        let dead = &buffered & &self.deleted;
        if !dead.is_empty() {
            stored.retain(|doc_id, _| !dead.contains(doc_id.0));
            index = InvertedIndex::merge(&[&index], &dead, stored.len());
            self.deleted -= &dead;
        }
        if stored.is_empty() {
            return;
        }

        let segment = Segment::new(index, stored);
        debug!(index = %self.index, segment = %segment.id.0, docs = segment.doc_count(), "sealed segment");
        self.segments.push(Arc::new(segment));
    }

    fn merge(&mut self, selected: &[Arc<Segment>]) -> MergeSummary {
        let mut reclaimed = RoaringBitmap::new();
        for segment in selected {
            reclaimed |= &segment.doc_ids() & &self.deleted;
        }

        let stored: BTreeMap<DocId, StoredDoc> = selected
            .iter()
            .flat_map(|s| s.stored.iter())
            .filter(|(doc_id, _)| !reclaimed.contains(doc_id.0))
            .map(|(doc_id, doc)| (*doc_id, doc.clone()))
            .collect();
        let parts: Vec<&InvertedIndex> = selected.iter().map(|s| &s.index).collect();
        let index = InvertedIndex::merge(&parts, &reclaimed, stored.len());

        let selected_ids: Vec<_> = selected.iter().map(|s| s.id).collect();
        let position = self
            .segments
            .iter()
            .position(|s| selected_ids.contains(&s.id))
            .unwrap_or(self.segments.len());
        self.segments.retain(|s| !selected_ids.contains(&s.id));
        if !stored.is_empty() {
            let position = position.min(self.segments.len());
            self.segments.insert(position, Arc::new(Segment::new(index, stored)));
        }
        self.deleted -= &reclaimed;
        self.dirty = true;

        let summary = MergeSummary {
            segments_merged: selected.len(),
            docs_reclaimed: reclaimed.len(),
        };
        debug!(
            index = %self.index,
            segments = summary.segments_merged,
            reclaimed = summary.docs_reclaimed,
            "merged segments"
        );
        summary
    }

    fn publish(&mut self) -> Arc<Snapshot> {
        self.dirty = false;
        let snapshot = self
            .mvcc
            .publish(self.segments.clone(), Arc::new(self.deleted.clone()));
        debug!(index = %self.index, generation = snapshot.generation, segments = self.segments.len(), "published snapshot");
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Source;
    use crate::index::inverted::AnalyzedField;
    use crate::index::merge_policy::TieredMergePolicy;

    fn doc(term: &str) -> AnalyzedDocument {
        let mut field = AnalyzedField::default();
        field.add_term(term.to_string(), 0);
        let mut doc = AnalyzedDocument::default();
        doc.fields.insert("body".to_string(), field);
        doc
    }

    fn stored(id: &str) -> StoredDoc {
        StoredDoc {
            id: id.to_string(),
            version: 1,
            source: Arc::new(Source::new()),
        }
    }

    fn writer(max_segments: usize) -> (IndexWriter, Arc<MVCCController>) {
        let mvcc = Arc::new(MVCCController::new());
        let policy = TieredMergePolicy {
            max_segments_per_tier: max_segments,
            ..Default::default()
        };
        (IndexWriter::new("test", mvcc.clone(), Box::new(policy)), mvcc)
    }

    #[test]
    fn writes_invisible_until_refresh() {
        let (mut writer, mvcc) = writer(10);
        writer.add_document(&doc("fox"), stored("1"), None);
        assert_eq!(mvcc.snapshot().live_doc_count(), 0);

        let snapshot = writer.refresh();
        assert_eq!(snapshot.live_doc_count(), 1);
        assert_eq!(snapshot.doc_freq("body", "fox"), 1);
        assert_eq!(writer.refresh().generation, snapshot.generation);
    }

    #[test]
    fn update_replaces_previous_ordinal_atomically() {
        let (mut writer, _) = writer(10);
        let first = writer.add_document(&doc("old"), stored("1"), None);
        writer.refresh();
        writer.add_document(&doc("new"), stored("1"), Some(first));

        let snapshot = writer.refresh();
        assert_eq!(snapshot.live_doc_count(), 1);
        assert_eq!(snapshot.doc_freq("body", "old"), 0);
        assert_eq!(snapshot.doc_freq("body", "new"), 1);
    }

    #[test]
    fn buffered_replacements_never_reach_a_segment() {
        let (mut writer, _) = writer(10);
        let first = writer.add_document(&doc("a"), stored("1"), None);
        writer.add_document(&doc("b"), stored("1"), Some(first));

        let snapshot = writer.refresh();
        assert_eq!(snapshot.segments[0].doc_count(), 1);
        assert!(snapshot.deleted_docs.is_empty());
    }

    #[test]
    fn merges_reclaim_tombstones() {
        let (mut writer, _) = writer(2);
        let mut ordinals = Vec::new();
        for i in 0..3 {
            ordinals.push(writer.add_document(&doc("fox"), stored(&i.to_string()), None));
            writer.refresh();
        }
        assert!(writer.segment_count() <= 2);

        writer.delete_document(ordinals[0]);
        let summary = writer.force_merge();
        assert_eq!(summary.docs_reclaimed, 1);
        assert_eq!(writer.segment_count(), 1);
        assert_eq!(writer.deleted_count(), 0);

        let snapshot = writer.refresh();
        assert_eq!(snapshot.live_doc_count(), 2);
        assert_eq!(snapshot.doc_freq("body", "fox"), 2);
    }
}
