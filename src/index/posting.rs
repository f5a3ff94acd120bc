use roaring::RoaringBitmap;
use crate::core::types::DocId;

#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    pub doc_id: DocId,
    pub term_freq: u32,
    /// Token positions, ascending. Used by phrase queries.
    pub positions: Vec<u32>,
}

impl Posting {
    pub fn new(doc_id: DocId, positions: Vec<u32>) -> Self {
        Posting {
            doc_id,
            term_freq: positions.len().max(1) as u32,
            positions,
        }
    }
}

/// Posting list for a term
/// Note: Sorted by doc_id for efficient merging
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostingList {
    pub postings: Vec<Posting>,
}

impl PostingList {
    pub fn new() -> Self {
        PostingList {
            postings: Vec::new(),
        }
    }

    pub fn add_posting(&mut self, posting: Posting) {
        // Ordinals are allocated in ascending order, so appends are the common case
        if self.postings.last().is_none_or(|last| last.doc_id < posting.doc_id) {
            self.postings.push(posting);
            return;
        }
        match self.postings.binary_search_by_key(&posting.doc_id, |p| p.doc_id) {
            Ok(pos) => self.postings[pos] = posting,
            Err(pos) => self.postings.insert(pos, posting),
        }
    }

    pub fn get(&self, doc_id: DocId) -> Option<&Posting> {
        self.postings
            .binary_search_by_key(&doc_id, |p| p.doc_id)
            .ok()
            .map(|pos| &self.postings[pos])
    }

    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    /// Documents containing the term, skipping tombstoned ordinals.
    pub fn live_doc_freq(&self, deleted: &RoaringBitmap) -> u32 {
        if deleted.is_empty() {
            return self.postings.len() as u32;
        }
        self.postings
            .iter()
            .filter(|p| !deleted.contains(p.doc_id.0))
            .count() as u32
    }

    pub fn live(&self, deleted: &RoaringBitmap) -> impl Iterator<Item = &Posting> {
        self.postings.iter().filter(move |p| !deleted.contains(p.doc_id.0))
    }

    pub fn total_freq(&self) -> u64 {
        self.postings.iter().map(|p| p.term_freq as u64).sum()
    }

    /// Intersect two posting lists (simple linear merge)
    pub fn intersect(&self, other: &PostingList) -> Vec<Posting> {
        let mut result = Vec::new();
        let mut i = 0;
        let mut j = 0;

        while i < self.postings.len() && j < other.postings.len() {
            let doc_id1 = self.postings[i].doc_id;
            let doc_id2 = other.postings[j].doc_id;

            if doc_id1 == doc_id2 {
                result.push(self.postings[i].clone());
                i += 1;
                j += 1;
            } else if doc_id1 < doc_id2 {
                i += 1;
            } else {
                j += 1;
            }
        }

        result
    }

    /// K-way merge of lists from disjoint ordinal ranges, dropping `deleted` ordinals.
    pub fn merge(lists: &[&PostingList], deleted: &RoaringBitmap) -> PostingList {
        let mut postings: Vec<Posting> = lists
            .iter()
            .flat_map(|list| list.postings.iter())
            .filter(|p| !deleted.contains(p.doc_id.0))
            .cloned()
            .collect();
        postings.sort_by_key(|p| p.doc_id);
        PostingList { postings }
    }
}
