use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use crate::core::types::{DocId, Source};

/// Search results container
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub total_hits: usize,
    /// Highest score among all matches; `None` when nothing matched.
    pub max_score: Option<f32>,
    pub took_ms: u64,
    pub hits: Vec<SearchHit>,
}

impl SearchResults {
    pub fn ids(&self) -> Vec<&str> {
        self.hits.iter().map(|h| h.id.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub version: u64,
    pub source: Source,
    /// Sort values when the request sorts by fields.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<serde_json::Value>,
}

/// Document with relevance score
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub doc_id: DocId,
    pub id: String,
    pub score: f32,
}

impl ScoredDocument {
    /// Rank order: score descending, then external id ascending.
    pub fn rank(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.id.cmp(&other.id))
    }
}

// Worst-ranked document is the greatest, so it sits at the top of the heap
impl PartialEq for ScoredDocument {
    fn eq(&self, other: &Self) -> bool {
        self.rank(other) == Ordering::Equal
    }
}

impl Eq for ScoredDocument {}

impl PartialOrd for ScoredDocument {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoredDocument {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank(other)
    }
}

/// Top-K collector for efficient result collection
pub struct TopKCollector {
    heap: BinaryHeap<ScoredDocument>,
    k: usize,
    total_collected: usize,
    max_score: Option<f32>,
}

impl TopKCollector {
    pub fn new(k: usize) -> Self {
        TopKCollector {
            heap: BinaryHeap::with_capacity(k.saturating_add(1).min(1024)),
            k,
            total_collected: 0,
            max_score: None,
        }
    }

    pub fn collect(&mut self, scored_doc: ScoredDocument) {
        self.total_collected += 1;
        self.max_score = Some(self.max_score.map_or(scored_doc.score, |m| m.max(scored_doc.score)));
        if self.k == 0 {
            return;
        }

        if self.heap.len() < self.k {
            self.heap.push(scored_doc);
        } else if let Some(worst) = self.heap.peek() {
            if scored_doc < *worst {
                self.heap.pop();
                self.heap.push(scored_doc);
            }
        }
    }

    pub fn total_collected(&self) -> usize {
        self.total_collected
    }

    pub fn max_score(&self) -> Option<f32> {
        self.max_score
    }

    /// Best first.
    pub fn into_sorted(self) -> Vec<ScoredDocument> {
        self.heap.into_sorted_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, score: f32) -> ScoredDocument {
        ScoredDocument {
            doc_id: DocId(0),
            id: id.to_string(),
            score,
        }
    }

    #[test]
    fn keeps_best_k_with_id_tie_break() {
        let mut collector = TopKCollector::new(3);
        for (id, score) in [("d", 1.0), ("a", 2.0), ("c", 1.0), ("b", 1.0), ("e", 0.5)] {
            collector.collect(doc(id, score));
        }
        assert_eq!(collector.total_collected(), 5);
        assert_eq!(collector.max_score(), Some(2.0));

        let ids: Vec<String> = collector.into_sorted().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn zero_k_only_counts() {
        let mut collector = TopKCollector::new(0);
        collector.collect(doc("a", 1.0));
        assert_eq!(collector.total_collected(), 1);
        assert!(collector.into_sorted().is_empty());
    }
}
