use serde::{Deserialize, Serialize};
use crate::query::ast::Query;

pub const DEFAULT_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// One sort key: `_score`, `_id`, or a field with doc values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortField {
    pub field: String,
    pub order: SortOrder,
}

impl SortField {
    pub const SCORE: &'static str = "_score";
    pub const ID: &'static str = "_id";

    pub fn score() -> Self {
        SortField::desc(Self::SCORE)
    }

    pub fn asc(field: impl Into<String>) -> Self {
        SortField {
            field: field.into(),
            order: SortOrder::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        SortField {
            field: field.into(),
            order: SortOrder::Desc,
        }
    }

    pub fn is_score(&self) -> bool {
        self.field == Self::SCORE
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: Query,
    pub from: usize,
    pub size: usize,
    /// Relevance order when empty.
    #[serde(default)]
    pub sort: Vec<SortField>,
    /// Source paths to return; `*` suffixes match by prefix. Full source when unset.
    pub source_includes: Option<Vec<String>>,
}

impl Default for SearchRequest {
    fn default() -> Self {
        SearchRequest {
            query: Query::match_all(),
            from: 0,
            size: DEFAULT_SIZE,
            sort: Vec::new(),
            source_includes: None,
        }
    }
}

impl SearchRequest {
    pub fn new(query: Query) -> Self {
        SearchRequest {
            query,
            ..Default::default()
        }
    }

    pub fn from(mut self, from: usize) -> Self {
        self.from = from;
        self
    }

    pub fn size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn sort(mut self, sort: SortField) -> Self {
        self.sort.push(sort);
        self
    }

    pub fn source<S: Into<String>>(mut self, includes: impl IntoIterator<Item = S>) -> Self {
        self.source_includes = Some(includes.into_iter().map(Into::into).collect());
        self
    }

    /// Whether results come back in plain relevance order.
    pub fn sorts_by_relevance(&self) -> bool {
        self.sort.is_empty() || (self.sort.len() == 1 && self.sort[0].is_score() && self.sort[0].order == SortOrder::Desc)
    }
}

impl From<Query> for SearchRequest {
    fn from(query: Query) -> Self {
        SearchRequest::new(query)
    }
}
