/// Scorer trait
pub trait Scorer: Send + Sync {
    /// Inverse document frequency of a term found in `doc_freq` of `doc_count` documents.
    fn idf(&self, doc_freq: u64, doc_count: u64) -> f32;

    fn score(&self, term_freq: u32, idf: f32, doc_stats: &DocStats) -> f32;

    fn name(&self) -> &str;
}

/// Document statistics for scoring
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DocStats {
    /// Number of tokens in the field; `None` when norms are disabled.
    pub doc_length: Option<u32>,
    /// Average field length across live documents
    pub avg_doc_length: f32,
}

/// Classic Lucene TF-IDF
#[derive(Debug, Clone, Copy, Default)]
pub struct TfIdfScorer;

impl Scorer for TfIdfScorer {
    fn idf(&self, doc_freq: u64, doc_count: u64) -> f32 {
        1.0 + ((doc_count as f32 + 1.0) / (doc_freq as f32 + 1.0)).ln()
    }

    fn score(&self, term_freq: u32, idf: f32, doc_stats: &DocStats) -> f32 {
        let tf = (term_freq as f32).sqrt();
        let norm = match doc_stats.doc_length {
            Some(len) if len > 0 => 1.0 / (len as f32).sqrt(),
            _ => 1.0,
        };
        tf * idf * idf * norm
    }

    fn name(&self) -> &str {
        "classic"
    }
}

/// BM25 Scorer
#[derive(Debug, Clone, Copy)]
pub struct BM25Scorer {
    pub k1: f32,  // Term frequency saturation (default: 1.2)
    pub b: f32,   // Length normalization strength (default: 0.75)
}

impl Default for BM25Scorer {
    fn default() -> Self {
        BM25Scorer {
            k1: 1.2,
            b: 0.75,
        }
    }
}

impl Scorer for BM25Scorer {
    fn idf(&self, doc_freq: u64, doc_count: u64) -> f32 {
        let n = doc_count.max(doc_freq) as f32;
        let df = doc_freq as f32;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    fn score(&self, term_freq: u32, idf: f32, doc_stats: &DocStats) -> f32 {
        let tf = term_freq as f32;

        // Fields without norms skip length normalization
        let length_norm = match doc_stats.doc_length {
            Some(len) if doc_stats.avg_doc_length > 0.0 => {
                1.0 - self.b + self.b * (len as f32 / doc_stats.avg_doc_length)
            }
            _ => 1.0,
        };

        idf * tf * (self.k1 + 1.0) / (tf + self.k1 * length_norm)
    }

    fn name(&self) -> &str {
        "bm25"
    }
}
