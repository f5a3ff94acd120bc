use regex::Regex;
use serde::{Deserialize, Serialize};
use crate::core::error::{Error, ErrorKind, Result};
use crate::query::ast::Query;

/// Limits applied to every query before it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Total bool clauses allowed across the whole query tree.
    pub max_clause_count: usize,
    pub max_depth: usize,
    pub allow_leading_wildcard: bool,
    /// Distinct terms a prefix, wildcard or regexp may expand to.
    pub max_expanded_terms: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        ValidationConfig {
            max_clause_count: 1024,
            max_depth: 20,
            allow_leading_wildcard: false,
            max_expanded_terms: 10_000,
        }
    }
}

pub struct QueryValidator<'a> {
    config: &'a ValidationConfig,
}

impl<'a> QueryValidator<'a> {
    pub fn new(config: &'a ValidationConfig) -> Self {
        QueryValidator { config }
    }

    pub fn validate(&self, query: &Query) -> Result<()> {
        let mut clauses = 0;
        self.check(query, 1, &mut clauses)
    }

    fn check(&self, query: &Query, depth: usize, clauses: &mut usize) -> Result<()> {
        if depth > self.config.max_depth {
            return Err(Error::query(format!(
                "query nesting exceeds the maximum depth of [{}]",
                self.config.max_depth
            )));
        }

        match query {
            Query::MatchAll(_) | Query::MatchNone | Query::Ids(_) => Ok(()),
            Query::Term(q) => require_field(query, &q.field),
            Query::Terms(q) => require_field(query, &q.field),
            Query::Range(q) => {
                require_field(query, &q.field)?;
                if q.gt.is_some() && q.gte.is_some() {
                    return Err(Error::query(format!("[range] on [{}] sets both gt and gte", q.field)));
                }
                if q.lt.is_some() && q.lte.is_some() {
                    return Err(Error::query(format!("[range] on [{}] sets both lt and lte", q.field)));
                }
                Ok(())
            }
            Query::Prefix(q) => require_field(query, &q.field),
            Query::Exists(q) => require_field(query, &q.field),
            Query::Wildcard(q) => {
                require_field(query, &q.field)?;
                if !self.config.allow_leading_wildcard && q.value.starts_with(['*', '?']) {
                    return Err(Error::new(
                        ErrorKind::UnsupportedPattern,
                        format!("leading wildcard in [{}] on field [{}] is not allowed", q.value, q.field),
                    ));
                }
                Ok(())
            }
            Query::Regexp(q) => {
                require_field(query, &q.field)?;
                Regex::new(&format!("^(?:{})$", q.value))?;
                Ok(())
            }
            Query::Match(q) => require_field(query, &q.field),
            Query::MatchPhrase(q) => require_field(query, &q.field),
            Query::Bool(b) => {
                *clauses += b.clause_count();
                if *clauses > self.config.max_clause_count {
                    return Err(Error::query(format!(
                        "too many bool clauses, limit is [{}]",
                        self.config.max_clause_count
                    )));
                }
                for child in b.must.iter().chain(&b.should).chain(&b.must_not).chain(&b.filter) {
                    self.check(child, depth + 1, clauses)?;
                }
                Ok(())
            }
        }
    }
}

fn require_field(query: &Query, field: &str) -> Result<()> {
    if field.trim().is_empty() {
        return Err(Error::query(format!("[{}] query requires a field name", query.name())));
    }
    Ok(())
}
