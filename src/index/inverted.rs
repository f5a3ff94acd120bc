use ordered_float::OrderedFloat;
use rayon::prelude::*;
use roaring::RoaringBitmap;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;
use crate::core::types::DocId;
use crate::index::posting::{Posting, PostingList};

/// Column value kept per document for sorting.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum DocValue {
    Number(OrderedFloat<f64>),
    Keyword(String),
}

impl DocValue {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            DocValue::Number(n) => serde_json::json!(n.into_inner()),
            DocValue::Keyword(s) => serde_json::Value::String(s.clone()),
        }
    }
}

/// Everything one document contributes to one field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalyzedField {
    /// Term -> positions.
    pub terms: BTreeMap<String, Vec<u32>>,
    pub points: Vec<f64>,
    pub doc_values: Vec<DocValue>,
    /// Token count, present only when norms are enabled.
    pub length: Option<u32>,
}

impl AnalyzedField {
    pub fn add_term(&mut self, term: String, position: u32) {
        self.terms.entry(term).or_default().push(position);
    }
}

/// Per-field structures of one segment.
#[derive(Debug, Clone, Default)]
pub struct FieldIndex {
    pub terms: BTreeMap<String, PostingList>,
    pub points: BTreeMap<OrderedFloat<f64>, RoaringBitmap>,
    pub doc_values: BTreeMap<DocId, Vec<DocValue>>,
    pub lengths: BTreeMap<DocId, u32>,
    /// Documents that have any value for the field.
    pub docs: RoaringBitmap,
}

impl FieldIndex {
    pub fn add(&mut self, doc_id: DocId, field: &AnalyzedField) {
        for (term, positions) in &field.terms {
            let mut positions = positions.clone();
            positions.sort_unstable();
            self.terms
                .entry(term.clone())
                .or_default()
                .add_posting(Posting::new(doc_id, positions));
        }
        for point in &field.points {
            self.points.entry(OrderedFloat(*point)).or_default().insert(doc_id.0);
        }
        if !field.doc_values.is_empty() {
            let mut values = field.doc_values.clone();
            values.sort();
            self.doc_values.insert(doc_id, values);
        }
        if let Some(length) = field.length {
            self.lengths.insert(doc_id, length);
        }
        self.docs.insert(doc_id.0);
    }

    pub fn postings(&self, term: &str) -> Option<&PostingList> {
        self.terms.get(term)
    }

    /// Terms in lexicographic order within the given bounds.
    pub fn term_range<'a>(
        &'a self,
        lower: Bound<&'a str>,
        upper: Bound<&'a str>,
    ) -> impl Iterator<Item = (&'a String, &'a PostingList)> + 'a {
        let lower = lower.map(str::to_string);
        let upper = upper.map(str::to_string);
        let valid = match (&lower, &upper) {
            (Bound::Included(l) | Bound::Excluded(l), Bound::Included(u) | Bound::Excluded(u)) => l <= u,
            _ => true,
        };
        // BTreeMap::range panics on inverted or equal-excluded bounds
        let empty_excluded = matches!((&lower, &upper), (Bound::Excluded(l), Bound::Excluded(u)) if l == u);
        let range = if valid && !empty_excluded {
            Some(self.terms.range::<String, _>((lower, upper)))
        } else {
            None
        };
        range.into_iter().flatten()
    }

    pub fn prefixed<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a String, &'a PostingList)> + 'a {
        self.terms
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(move |(term, _)| term.starts_with(prefix))
    }

    /// Union of documents whose points fall within the bounds.
    pub fn point_range(&self, lower: Bound<f64>, upper: Bound<f64>) -> RoaringBitmap {
        let lower = lower.map(OrderedFloat);
        let upper = upper.map(OrderedFloat);
        let mut out = RoaringBitmap::new();
        let valid = match (lower, upper) {
            (Bound::Included(l), Bound::Included(u)) => l <= u,
            (Bound::Included(l) | Bound::Excluded(l), Bound::Included(u) | Bound::Excluded(u)) => l < u,
            _ => true,
        };
        if !valid {
            return out;
        }
        for (_, docs) in self.points.range((lower, upper)) {
            out |= docs;
        }
        out
    }

    pub fn live_docs(&self, deleted: &RoaringBitmap) -> RoaringBitmap {
        &self.docs - deleted
    }

    /// Sum of field lengths over live documents.
    pub fn live_length_sum(&self, deleted: &RoaringBitmap) -> u64 {
        self.lengths
            .iter()
            .filter(|(doc, _)| !deleted.contains(doc.0))
            .map(|(_, len)| *len as u64)
            .sum()
    }

    fn merge(parts: &[&FieldIndex], deleted: &RoaringBitmap) -> FieldIndex {
        let mut terms: BTreeMap<String, Vec<&PostingList>> = BTreeMap::new();
        for part in parts {
            for (term, list) in &part.terms {
                terms.entry(term.clone()).or_default().push(list);
            }
        }

        let mut merged = FieldIndex::default();
        for (term, lists) in terms {
            let list = PostingList::merge(&lists, deleted);
            if !list.is_empty() {
                merged.terms.insert(term, list);
            }
        }
        for part in parts {
            for (point, docs) in &part.points {
                let live = docs - deleted;
                if !live.is_empty() {
                    *merged.points.entry(*point).or_default() |= live;
                }
            }
            merged.doc_values.extend(
                part.doc_values
                    .iter()
                    .filter(|(doc, _)| !deleted.contains(doc.0))
                    .map(|(doc, values)| (*doc, values.clone())),
            );
            merged.lengths.extend(
                part.lengths
                    .iter()
                    .filter(|(doc, _)| !deleted.contains(doc.0))
                    .map(|(doc, len)| (*doc, *len)),
            );
            merged.docs |= part.live_docs(deleted);
        }
        merged
    }
}

/// Inverted index of one segment (or of the writer's buffer): field path -> structures.
#[derive(Debug, Clone, Default)]
pub struct InvertedIndex {
    pub fields: HashMap<String, FieldIndex>,
    pub doc_count: usize,
}

impl InvertedIndex {
    pub fn new() -> Self {
        InvertedIndex::default()
    }

    /// Indexes every analyzed field of one document under its ordinal.
    pub fn add_document(&mut self, doc_id: DocId, fields: &BTreeMap<String, AnalyzedField>) {
        for (name, field) in fields {
            self.fields.entry(name.clone()).or_default().add(doc_id, field);
        }
        self.doc_count += 1;
    }

    pub fn field(&self, name: &str) -> Option<&FieldIndex> {
        self.fields.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.doc_count == 0
    }

    /// Merges several indexes into one, dropping `deleted` ordinals. Fields are merged in parallel.
    pub fn merge(parts: &[&InvertedIndex], deleted: &RoaringBitmap, live_docs: usize) -> InvertedIndex {
        let names: BTreeSet<&String> = parts.iter().flat_map(|p| p.fields.keys()).collect();
        let fields: HashMap<String, FieldIndex> = names
            .into_par_iter()
            .map(|name| {
                let field_parts: Vec<&FieldIndex> = parts.iter().filter_map(|p| p.fields.get(name)).collect();
                (name.clone(), FieldIndex::merge(&field_parts, deleted))
            })
            .filter(|(_, field)| !field.docs.is_empty())
            .collect();

        InvertedIndex {
            fields,
            doc_count: live_docs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_field(terms: &[(&str, u32)]) -> AnalyzedField {
        let mut field = AnalyzedField::default();
        for (term, pos) in terms {
            field.add_term(term.to_string(), *pos);
        }
        field.length = Some(terms.len() as u32);
        field
    }

    fn numeric_field(value: f64) -> AnalyzedField {
        AnalyzedField {
            points: vec![value],
            doc_values: vec![DocValue::Number(OrderedFloat(value))],
            ..Default::default()
        }
    }

    fn doc(fields: Vec<(&str, AnalyzedField)>) -> BTreeMap<String, AnalyzedField> {
        fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn term_lookups() {
        let mut index = InvertedIndex::new();
        index.add_document(DocId(0), &doc(vec![("title", text_field(&[("quick", 0), ("fox", 1)]))]));
        index.add_document(DocId(1), &doc(vec![("title", text_field(&[("quiet", 0), ("fox", 1), ("fox", 2)]))]));

        let title = index.field("title").unwrap();
        assert_eq!(title.postings("fox").unwrap().len(), 2);
        assert_eq!(title.postings("fox").unwrap().get(DocId(1)).unwrap().positions, vec![1, 2]);

        let prefixed: Vec<&String> = title.prefixed("qui").map(|(t, _)| t).collect();
        assert_eq!(prefixed, vec!["quick", "quiet"]);

        let ranged: Vec<&String> = title
            .term_range(Bound::Excluded("fox"), Bound::Included("quick"))
            .map(|(t, _)| t)
            .collect();
        assert_eq!(ranged, vec!["quick"]);
        assert_eq!(title.term_range(Bound::Included("z"), Bound::Included("a")).count(), 0);
        assert_eq!(title.live_length_sum(&RoaringBitmap::new()), 5);
    }

    #[test]
    fn point_ranges() {
        let mut index = InvertedIndex::new();
        for (doc_id, rating) in [(0, 3.5), (1, 4.0), (2, 5.3)] {
            index.add_document(DocId(doc_id), &doc(vec![("rating", numeric_field(rating))]));
        }
        let rating = index.field("rating").unwrap();

        let docs = rating.point_range(Bound::Included(4.0), Bound::Unbounded);
        assert_eq!(docs.iter().collect::<Vec<_>>(), vec![1, 2]);
        let docs = rating.point_range(Bound::Excluded(4.0), Bound::Excluded(4.0));
        assert!(docs.is_empty());
        let docs = rating.point_range(Bound::Included(6.0), Bound::Unbounded);
        assert!(docs.is_empty());
    }

    #[test]
    fn merge_drops_tombstoned_documents() {
        let mut a = InvertedIndex::new();
        a.add_document(DocId(0), &doc(vec![("title", text_field(&[("old", 0)])), ("rating", numeric_field(1.0))]));
        let mut b = InvertedIndex::new();
        b.add_document(DocId(1), &doc(vec![("title", text_field(&[("new", 0)]))]));

        let mut deleted = RoaringBitmap::new();
        deleted.insert(0);
        let merged = InvertedIndex::merge(&[&a, &b], &deleted, 1);

        let title = merged.field("title").unwrap();
        assert!(title.postings("old").is_none());
        assert!(title.postings("new").is_some());
        assert!(merged.field("rating").is_none());
        assert_eq!(merged.doc_count, 1);
    }
}
