use serde::{Deserialize, Serialize};
use std::str::FromStr;
use crate::core::error::{Error, Result};
use crate::core::types::FieldValue;

/// Main query enum representing all query types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Query {
    MatchAll(MatchAllQuery),
    MatchNone,
    Term(TermQuery),
    Terms(TermsQuery),
    Ids(IdsQuery),
    Range(RangeQuery),
    Prefix(PrefixQuery),
    Wildcard(WildcardQuery),
    Regexp(RegexpQuery),
    Exists(ExistsQuery),
    Match(MatchQuery),
    MatchPhrase(MatchPhraseQuery),
    Bool(BoolQuery),
}

impl Default for Query {
    fn default() -> Self {
        Query::MatchAll(MatchAllQuery::default())
    }
}

impl Query {
    pub fn match_all() -> Self {
        Query::MatchAll(MatchAllQuery::default())
    }

    pub fn match_none() -> Self {
        Query::MatchNone
    }

    pub fn term(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        TermQuery::new(field, value).into()
    }

    pub fn terms<V: Into<FieldValue>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        TermsQuery::new(field, values).into()
    }

    pub fn ids<S: Into<String>>(ids: impl IntoIterator<Item = S>) -> Self {
        Query::Ids(IdsQuery {
            values: ids.into_iter().map(Into::into).collect(),
            boost: None,
        })
    }

    pub fn prefix(field: impl Into<String>, value: impl Into<String>) -> Self {
        Query::Prefix(PrefixQuery {
            field: field.into(),
            value: value.into(),
            boost: None,
        })
    }

    pub fn wildcard(field: impl Into<String>, value: impl Into<String>) -> Self {
        Query::Wildcard(WildcardQuery {
            field: field.into(),
            value: value.into(),
            boost: None,
        })
    }

    pub fn regexp(field: impl Into<String>, value: impl Into<String>) -> Self {
        Query::Regexp(RegexpQuery {
            field: field.into(),
            value: value.into(),
            boost: None,
        })
    }

    pub fn exists(field: impl Into<String>) -> Self {
        Query::Exists(ExistsQuery { field: field.into() })
    }

    pub fn match_text(field: impl Into<String>, text: impl Into<String>) -> Self {
        MatchQuery::new(field, text).into()
    }

    pub fn match_phrase(field: impl Into<String>, text: impl Into<String>) -> Self {
        MatchPhraseQuery::new(field, text).into()
    }

    /// Query-level boost, 1.0 when unset.
    pub fn boost(&self) -> f32 {
        let boost = match self {
            Query::MatchAll(q) => q.boost,
            Query::MatchNone | Query::Exists(_) => None,
            Query::Term(q) => q.boost,
            Query::Terms(q) => q.boost,
            Query::Ids(q) => q.boost,
            Query::Range(q) => q.boost,
            Query::Prefix(q) => q.boost,
            Query::Wildcard(q) => q.boost,
            Query::Regexp(q) => q.boost,
            Query::Match(q) => q.boost,
            Query::MatchPhrase(q) => q.boost,
            Query::Bool(q) => q.boost,
        };
        boost.unwrap_or(1.0)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Query::MatchAll(_) => "match_all",
            Query::MatchNone => "match_none",
            Query::Term(_) => "term",
            Query::Terms(_) => "terms",
            Query::Ids(_) => "ids",
            Query::Range(_) => "range",
            Query::Prefix(_) => "prefix",
            Query::Wildcard(_) => "wildcard",
            Query::Regexp(_) => "regexp",
            Query::Exists(_) => "exists",
            Query::Match(_) => "match",
            Query::MatchPhrase(_) => "match_phrase",
            Query::Bool(_) => "bool",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchAllQuery {
    pub boost: Option<f32>,
}

/// Exact value against the un-analyzed field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermQuery {
    pub field: String,
    pub value: FieldValue,
    #[serde(default)]
    pub case_insensitive: bool,
    pub boost: Option<f32>,
}

impl TermQuery {
    pub fn new(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        TermQuery {
            field: field.into(),
            value: value.into(),
            case_insensitive: false,
            boost: None,
        }
    }

    pub fn case_insensitive(mut self, case_insensitive: bool) -> Self {
        self.case_insensitive = case_insensitive;
        self
    }

    pub fn boost(mut self, boost: f32) -> Self {
        self.boost = Some(boost);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermsQuery {
    pub field: String,
    pub values: Vec<FieldValue>,
    #[serde(default)]
    pub case_insensitive: bool,
    pub boost: Option<f32>,
}

impl TermsQuery {
    pub fn new<V: Into<FieldValue>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        TermsQuery {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
            case_insensitive: false,
            boost: None,
        }
    }

    pub fn case_insensitive(mut self, case_insensitive: bool) -> Self {
        self.case_insensitive = case_insensitive;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdsQuery {
    pub values: Vec<String>,
    pub boost: Option<f32>,
}

/// Range query for numeric, date and term fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeQuery {
    pub field: String,
    pub gt: Option<FieldValue>,
    pub gte: Option<FieldValue>,
    pub lt: Option<FieldValue>,
    pub lte: Option<FieldValue>,
    /// Date format for string bounds; the field's format when unset.
    pub format: Option<String>,
    /// Offset applied to date bounds that carry none, e.g. `+01:00`.
    pub time_zone: Option<String>,
    pub boost: Option<f32>,
}

impl RangeQuery {
    pub fn new(field: impl Into<String>) -> Self {
        RangeQuery {
            field: field.into(),
            ..Default::default()
        }
    }

    pub fn gt(mut self, value: impl Into<FieldValue>) -> Self {
        self.gt = Some(value.into());
        self
    }

    pub fn gte(mut self, value: impl Into<FieldValue>) -> Self {
        self.gte = Some(value.into());
        self
    }

    pub fn lt(mut self, value: impl Into<FieldValue>) -> Self {
        self.lt = Some(value.into());
        self
    }

    pub fn lte(mut self, value: impl Into<FieldValue>) -> Self {
        self.lte = Some(value.into());
        self
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn time_zone(mut self, time_zone: impl Into<String>) -> Self {
        self.time_zone = Some(time_zone.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefixQuery {
    pub field: String,
    pub value: String,
    pub boost: Option<f32>,
}

/// `?` matches one character, `*` any run of characters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WildcardQuery {
    pub field: String,
    pub value: String,
    pub boost: Option<f32>,
}

/// Regular expression that must match the whole term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegexpQuery {
    pub field: String,
    pub value: String,
    pub boost: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExistsQuery {
    pub field: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    #[default]
    Or,
    And,
}

/// How many optional clauses must match. Negative values are subtracted from
/// the clause count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MinimumShouldMatch {
    Count(i32),
    Percent(i32),
}

impl MinimumShouldMatch {
    /// Required number of matches out of `optional` clauses, clamped to `0..=optional`.
    pub fn resolve(&self, optional: usize) -> usize {
        let n = optional as i64;
        let required = match *self {
            MinimumShouldMatch::Count(c) if c < 0 => n + c as i64,
            MinimumShouldMatch::Count(c) => c as i64,
            MinimumShouldMatch::Percent(p) if p < 0 => n - (n * (-p) as i64) / 100,
            MinimumShouldMatch::Percent(p) => (n * p as i64) / 100,
        };
        required.clamp(0, n) as usize
    }
}

impl FromStr for MinimumShouldMatch {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || Error::query(format!("invalid minimum_should_match [{}]", s));
        match s.strip_suffix('%') {
            Some(pct) => pct.trim().parse().map(MinimumShouldMatch::Percent).map_err(|_| invalid()),
            None => s.parse().map(MinimumShouldMatch::Count).map_err(|_| invalid()),
        }
    }
}

/// Full-text query: the text is analyzed like the target field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchQuery {
    pub field: String,
    pub query: String,
    #[serde(default)]
    pub operator: Operator,
    pub minimum_should_match: Option<MinimumShouldMatch>,
    /// Overrides the field's search analyzer.
    pub analyzer: Option<String>,
    pub boost: Option<f32>,
}

impl MatchQuery {
    pub fn new(field: impl Into<String>, query: impl Into<String>) -> Self {
        MatchQuery {
            field: field.into(),
            query: query.into(),
            operator: Operator::Or,
            minimum_should_match: None,
            analyzer: None,
            boost: None,
        }
    }

    pub fn operator(mut self, operator: Operator) -> Self {
        self.operator = operator;
        self
    }

    pub fn minimum_should_match(mut self, msm: MinimumShouldMatch) -> Self {
        self.minimum_should_match = Some(msm);
        self
    }

    pub fn analyzer(mut self, analyzer: impl Into<String>) -> Self {
        self.analyzer = Some(analyzer.into());
        self
    }

    pub fn boost(mut self, boost: f32) -> Self {
        self.boost = Some(boost);
        self
    }
}

/// Phrase query for exact phrase matching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchPhraseQuery {
    pub field: String,
    pub query: String,
    /// Allowed positional moves between the terms.
    #[serde(default)]
    pub slop: u32,
    pub analyzer: Option<String>,
    pub boost: Option<f32>,
}

impl MatchPhraseQuery {
    pub fn new(field: impl Into<String>, query: impl Into<String>) -> Self {
        MatchPhraseQuery {
            field: field.into(),
            query: query.into(),
            slop: 0,
            analyzer: None,
            boost: None,
        }
    }

    pub fn slop(mut self, slop: u32) -> Self {
        self.slop = slop;
        self
    }

    pub fn analyzer(mut self, analyzer: impl Into<String>) -> Self {
        self.analyzer = Some(analyzer.into());
        self
    }
}

/// Boolean query with must/should/must_not clauses
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoolQuery {
    pub must: Vec<Query>,      // All must match (AND)
    pub should: Vec<Query>,    // At least one must match (OR)
    pub must_not: Vec<Query>,  // None must match (NOT)
    pub filter: Vec<Query>,    // Must match but don't affect score
    pub minimum_should_match: Option<MinimumShouldMatch>,
    pub boost: Option<f32>,
}

impl BoolQuery {
    pub fn new() -> Self {
        BoolQuery::default()
    }

    pub fn with_must(mut self, query: Query) -> Self {
        self.must.push(query);
        self
    }

    pub fn with_should(mut self, query: Query) -> Self {
        self.should.push(query);
        self
    }

    pub fn with_must_not(mut self, query: Query) -> Self {
        self.must_not.push(query);
        self
    }

    pub fn with_filter(mut self, query: Query) -> Self {
        self.filter.push(query);
        self
    }

    pub fn minimum_should_match(mut self, msm: MinimumShouldMatch) -> Self {
        self.minimum_should_match = Some(msm);
        self
    }

    pub fn clause_count(&self) -> usize {
        self.must.len() + self.should.len() + self.must_not.len() + self.filter.len()
    }

    /// Should clauses become optional once a must or filter clause is present.
    pub fn required_should(&self) -> usize {
        match self.minimum_should_match {
            Some(msm) => msm.resolve(self.should.len()),
            None if self.must.is_empty() && self.filter.is_empty() && !self.should.is_empty() => 1,
            None => 0,
        }
    }
}

macro_rules! into_query {
    ($($ty:ident => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for Query {
            fn from(query: $ty) -> Self {
                Query::$variant(query)
            }
        })*
    };
}

into_query! {
    MatchAllQuery => MatchAll,
    TermQuery => Term,
    TermsQuery => Terms,
    IdsQuery => Ids,
    RangeQuery => Range,
    PrefixQuery => Prefix,
    WildcardQuery => Wildcard,
    RegexpQuery => Regexp,
    ExistsQuery => Exists,
    MatchQuery => Match,
    MatchPhraseQuery => MatchPhrase,
    BoolQuery => Bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimum_should_match_forms() {
        assert_eq!("2".parse::<MinimumShouldMatch>().unwrap().resolve(3), 2);
        assert_eq!("-1".parse::<MinimumShouldMatch>().unwrap().resolve(3), 2);
        assert_eq!("75%".parse::<MinimumShouldMatch>().unwrap().resolve(4), 3);
        assert_eq!("-25%".parse::<MinimumShouldMatch>().unwrap().resolve(4), 3);
        assert_eq!(MinimumShouldMatch::Count(9).resolve(2), 2);
        assert!("abc".parse::<MinimumShouldMatch>().is_err());
    }

    #[test]
    fn should_is_optional_next_to_must() {
        let only_should = BoolQuery::new().with_should(Query::match_all());
        assert_eq!(only_should.required_should(), 1);

        let with_filter = BoolQuery::new()
            .with_filter(Query::match_all())
            .with_should(Query::match_all());
        assert_eq!(with_filter.required_should(), 0);
        assert_eq!(with_filter.clause_count(), 2);
    }

    #[test]
    fn builders_and_boost() {
        let query: Query = TermQuery::new("tags.keyword", "Vegetable")
            .case_insensitive(true)
            .boost(2.0)
            .into();
        assert_eq!(query.boost(), 2.0);
        assert_eq!(query.name(), "term");
        assert_eq!(Query::exists("title").boost(), 1.0);
    }
}
