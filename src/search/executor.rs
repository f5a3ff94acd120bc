use regex::Regex;
use roaring::RoaringBitmap;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;
use std::time::Instant;
use crate::analysis::analyzer::{Analyzer, AnalyzerRegistry};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{project_source, DocId, FieldValue};
use crate::index::inverted::{DocValue, FieldIndex};
use crate::index::posting::PostingList;
use crate::mvcc::controller::Snapshot;
use crate::query::ast::{
    BoolQuery, MatchPhraseQuery, MatchQuery, Operator, Query, RangeQuery, TermQuery,
};
use crate::query::validator::{QueryValidator, ValidationConfig};
use crate::schema::date_format::{parse_time_zone, DateFormat};
use crate::schema::document_mapper::{convert_value, IndexValue, MAX_EXACT_INTEGER};
use crate::schema::field_type::FieldType;
use crate::schema::mapping::{FieldMapping, MappingRegistry};
use crate::scoring::scorer::{DocStats, Scorer};
use crate::search::request::{SearchRequest, SortField, SortOrder};
use crate::search::results::{ScoredDocument, SearchHit, SearchResults, TopKCollector};
use crate::writer::analyzed::ID_FIELD;
use std::sync::Arc;

/// Matching ordinals with their scores.
pub type Matches = BTreeMap<DocId, f32>;

/// A queried field after alias resolution.
struct ResolvedField<'m> {
    path: String,
    field_type: FieldType,
    mapping: Option<&'m FieldMapping>,
}

/// Evaluates queries against one published snapshot.
pub struct QueryExecutor<'a> {
    index: &'a str,
    snapshot: &'a Snapshot,
    mapping: &'a MappingRegistry,
    analyzers: &'a AnalyzerRegistry,
    scorer: &'a dyn Scorer,
    validation: &'a ValidationConfig,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(
        index: &'a str,
        snapshot: &'a Snapshot,
        mapping: &'a MappingRegistry,
        analyzers: &'a AnalyzerRegistry,
        scorer: &'a dyn Scorer,
        validation: &'a ValidationConfig,
    ) -> Self {
        QueryExecutor {
            index,
            snapshot,
            mapping,
            analyzers,
            scorer,
            validation,
        }
    }

    /// Runs a full search request: validation, matching, ranking and hit assembly.
    pub fn search(&self, request: &SearchRequest, max_result_window: usize) -> Result<SearchResults> {
        let start = Instant::now();
        let window = request.from.saturating_add(request.size);
        if window > max_result_window {
            return Err(Error::invalid_argument(format!(
                "[{}]: result window is too large, from + size must be less than or equal to [{}] but was [{}]",
                self.index, max_result_window, window
            )));
        }

        let matches = self.execute(&request.query)?;
        let total_hits = matches.len();

        let (ranked, max_score) = if request.sorts_by_relevance() {
            let mut collector = TopKCollector::new(window);
            for (doc_id, score) in &matches {
                if let Some(stored) = self.snapshot.stored(*doc_id) {
                    collector.collect(ScoredDocument {
                        doc_id: *doc_id,
                        id: stored.id.clone(),
                        score: *score,
                    });
                }
            }
            let max_score = collector.max_score();
            let ranked: Vec<(ScoredDocument, Vec<serde_json::Value>)> =
                collector.into_sorted().into_iter().map(|d| (d, Vec::new())).collect();
            (ranked, max_score)
        } else {
            self.sort_by_fields(&matches, &request.sort, window)?
        };

        let hits = ranked
            .into_iter()
            .skip(request.from)
            .filter_map(|(doc, sort)| {
                let stored = self.snapshot.stored(doc.doc_id)?;
                let source = match &request.source_includes {
                    Some(includes) => project_source(&stored.source, includes),
                    None => (*stored.source).clone(),
                };
                Some(SearchHit {
                    id: stored.id.clone(),
                    score: doc.score,
                    version: stored.version,
                    source,
                    sort,
                })
            })
            .collect();

        Ok(SearchResults {
            total_hits,
            max_score,
            took_ms: start.elapsed().as_millis() as u64,
            hits,
        })
    }

    /// Validates and evaluates a query to its live matches.
    pub fn execute(&self, query: &Query) -> Result<Matches> {
        QueryValidator::new(self.validation).validate(query)?;
        self.evaluate(query)
    }

    fn evaluate(&self, query: &Query) -> Result<Matches> {
        let boost = query.boost();
        match query {
            Query::MatchAll(_) => Ok(constant(&self.all_docs(), boost)),
            Query::MatchNone => Ok(Matches::new()),
            Query::Term(q) => Ok(constant(&self.term_docs(q)?, boost)),
            Query::Terms(q) => {
                let mut docs = RoaringBitmap::new();
                for value in &q.values {
                    let term = TermQuery {
                        field: q.field.clone(),
                        value: value.clone(),
                        case_insensitive: q.case_insensitive,
                        boost: None,
                    };
                    docs |= self.term_docs(&term)?;
                }
                Ok(constant(&docs, boost))
            }
            Query::Ids(q) => {
                let mut docs = RoaringBitmap::new();
                for id in &q.values {
                    docs |= self.exact_term_docs(ID_FIELD, id);
                }
                Ok(constant(&docs, boost))
            }
            Query::Range(q) => Ok(constant(&self.range_docs(q)?, boost)),
            Query::Prefix(q) => {
                let Some(field) = self.searchable_field(&q.field)? else {
                    return Ok(Matches::new());
                };
                require_string_field(&field, "prefix")?;
                let docs = self.expand_terms(&field.path, Some(q.value.as_str()), |term| term.starts_with(&q.value))?;
                Ok(constant(&docs, boost))
            }
            Query::Wildcard(q) => {
                let Some(field) = self.searchable_field(&q.field)? else {
                    return Ok(Matches::new());
                };
                require_string_field(&field, "wildcard")?;
                let regex = Regex::new(&wildcard_to_regex(&q.value))?;
                let prefix = literal_prefix(&q.value);
                let docs = self.expand_terms(&field.path, Some(prefix), |term| regex.is_match(term))?;
                Ok(constant(&docs, boost))
            }
            Query::Regexp(q) => {
                let Some(field) = self.searchable_field(&q.field)? else {
                    return Ok(Matches::new());
                };
                require_string_field(&field, "regexp")?;
                let regex = Regex::new(&format!("^(?:{})$", q.value))?;
                let docs = self.expand_terms(&field.path, None, |term| regex.is_match(term))?;
                Ok(constant(&docs, boost))
            }
            Query::Exists(q) => Ok(constant(&self.exists_docs(&q.field), boost)),
            Query::Match(q) => self.match_query(q),
            Query::MatchPhrase(q) => self.match_phrase(q),
            Query::Bool(q) => self.bool_query(q),
        }
    }

    fn resolve(&self, name: &str) -> Option<ResolvedField<'a>> {
        if name == ID_FIELD {
            return Some(ResolvedField {
                path: ID_FIELD.to_string(),
                field_type: FieldType::Keyword,
                mapping: None,
            });
        }
        let mapping = self.mapping.resolve(name)?;
        Some(ResolvedField {
            path: mapping.name.clone(),
            field_type: mapping.field_type,
            mapping: Some(mapping),
        })
    }

    /// Resolves a field for value queries. Unmapped and container fields match
    /// nothing; unindexed fields are an error.
    fn searchable_field(&self, name: &str) -> Result<Option<ResolvedField<'a>>> {
        let Some(field) = self.resolve(name) else {
            return Ok(None);
        };
        if !field.field_type.is_leaf() {
            return Ok(None);
        }
        if let Some(mapping) = field.mapping {
            if !mapping.index {
                return Err(Error::query(format!(
                    "[{}]: cannot search on field [{}] since it is not indexed",
                    self.index, mapping.name
                )));
            }
        }
        Ok(Some(field))
    }

    fn all_docs(&self) -> RoaringBitmap {
        let mut docs = RoaringBitmap::new();
        for segment in &self.snapshot.segments {
            docs |= segment.doc_ids();
        }
        docs - self.snapshot.deleted_docs.as_ref()
    }

    fn live_postings(&self, list: &PostingList) -> RoaringBitmap {
        list.live(&self.snapshot.deleted_docs).map(|p| p.doc_id.0).collect()
    }

    fn exact_term_docs(&self, path: &str, term: &str) -> RoaringBitmap {
        let mut docs = RoaringBitmap::new();
        for field in self.snapshot.field_indexes(path) {
            if let Some(list) = field.postings(term) {
                docs |= self.live_postings(list);
            }
        }
        docs
    }

    fn term_docs(&self, q: &TermQuery) -> Result<RoaringBitmap> {
        let Some(field) = self.searchable_field(&q.field)? else {
            return Ok(RoaringBitmap::new());
        };
        let value = match field.mapping {
            Some(mapping) => self.query_value(mapping, &q.value)?,
            None => q.value.to_term_string().map(IndexValue::Keyword),
        };
        let Some(value) = value else {
            return Ok(RoaringBitmap::new());
        };

        if let Some(point) = value.point() {
            let mut docs = RoaringBitmap::new();
            for index in self.snapshot.field_indexes(&field.path) {
                docs |= index.point_range(Bound::Included(point), Bound::Included(point));
            }
            return Ok(docs - self.snapshot.deleted_docs.as_ref());
        }

        let term = value.term();
        if !q.case_insensitive {
            return Ok(self.exact_term_docs(&field.path, &term));
        }
        let lowered = term.to_lowercase();
        self.expand_terms(&field.path, None, |candidate| candidate.to_lowercase() == lowered)
    }

    /// Converts a query value the way the field converts source values.
    fn query_value(&self, mapping: &FieldMapping, value: &FieldValue) -> Result<Option<IndexValue>> {
        convert_value(mapping, value, true).map_err(|err| {
            Error::query(format!(
                "[{}]: failed to create query on field [{}]: {}",
                self.index, mapping.name, err.context
            ))
        })
    }

    /// Union of live documents over the distinct terms accepted by `accept`.
    /// `prefix` narrows the scan to terms starting with it.
    fn expand_terms(
        &self,
        path: &str,
        prefix: Option<&str>,
        accept: impl Fn(&str) -> bool,
    ) -> Result<RoaringBitmap> {
        let mut expanded = BTreeSet::new();
        let mut docs = RoaringBitmap::new();
        for field in self.snapshot.field_indexes(path) {
            let candidates: Box<dyn Iterator<Item = (&String, &PostingList)> + '_> = match prefix {
                Some(prefix) if !prefix.is_empty() => Box::new(field.prefixed(prefix)),
                _ => Box::new(field.terms.iter()),
            };
            for (term, list) in candidates {
                if !accept(term) {
                    continue;
                }
                let live = self.live_postings(list);
                if live.is_empty() {
                    continue;
                }
                expanded.insert(term.clone());
                if expanded.len() > self.validation.max_expanded_terms {
                    return Err(Error::new(
                        ErrorKind::UnsupportedPattern,
                        format!(
                            "[{}]: query on field [{}] expands to more than [{}] terms",
                            self.index, path, self.validation.max_expanded_terms
                        ),
                    ));
                }
                docs |= live;
            }
        }
        Ok(docs)
    }

    fn range_docs(&self, q: &RangeQuery) -> Result<RoaringBitmap> {
        let Some(field) = self.searchable_field(&q.field)? else {
            return Ok(RoaringBitmap::new());
        };

        let mut docs = RoaringBitmap::new();
        match field.field_type {
            FieldType::Integer | FieldType::Float => {
                let lower = bound(&q.gt, &q.gte, |v| self.number_bound(&field, v))?;
                let upper = bound(&q.lt, &q.lte, |v| self.number_bound(&field, v))?;
                for index in self.snapshot.field_indexes(&field.path) {
                    docs |= index.point_range(lower, upper);
                }
            }
            FieldType::Date => {
                let format = match &q.format {
                    Some(spec) => DateFormat::parse_spec(spec).map_err(|e| Error::query(e.context))?,
                    None => field.mapping.map(|m| m.date_format.clone()).unwrap_or_default(),
                };
                let zone = q.time_zone.as_deref().map(parse_time_zone).transpose()?;
                let date = |value: &FieldValue, round_up: bool| -> Result<f64> {
                    match value {
                        FieldValue::Date(d) => Ok(d.timestamp_millis() as f64),
                        FieldValue::Int(millis) => Ok(*millis as f64),
                        FieldValue::Text(s) => {
                            let parsed = format.parse(s, zone).ok_or_else(|| {
                                Error::query(format!(
                                    "failed to parse date [{}] with format [{}] for field [{}]",
                                    s, format.spec, field.path
                                ))
                            })?;
                            let millis = if round_up && !parsed.has_time {
                                parsed.end_of_day().timestamp_millis()
                            } else {
                                parsed.millis()
                            };
                            Ok(millis as f64)
                        }
                        other => Err(Error::query(format!(
                            "{} is not a valid date bound for field [{}]",
                            other.kind(),
                            field.path
                        ))),
                    }
                };
                // Date-only gt and lte bounds cover the whole day
                let lower = match (&q.gt, &q.gte) {
                    (Some(v), _) => Bound::Excluded(date(v, true)?),
                    (None, Some(v)) => Bound::Included(date(v, false)?),
                    (None, None) => Bound::Unbounded,
                };
                let upper = match (&q.lt, &q.lte) {
                    (Some(v), _) => Bound::Excluded(date(v, false)?),
                    (None, Some(v)) => Bound::Included(date(v, true)?),
                    (None, None) => Bound::Unbounded,
                };
                for index in self.snapshot.field_indexes(&field.path) {
                    docs |= index.point_range(lower, upper);
                }
            }
            _ => {
                let term = |v: &FieldValue| {
                    v.to_term_string()
                        .ok_or_else(|| Error::query(format!("invalid range bound for field [{}]", field.path)))
                };
                let lower = bound(&q.gt, &q.gte, term)?;
                let upper = bound(&q.lt, &q.lte, term)?;
                for index in self.snapshot.field_indexes(&field.path) {
                    let terms = index.term_range(
                        lower.as_ref().map(String::as_str),
                        upper.as_ref().map(String::as_str),
                    );
                    for (_, list) in terms {
                        docs |= self.live_postings(list);
                    }
                }
                return Ok(docs);
            }
        }
        Ok(docs - self.snapshot.deleted_docs.as_ref())
    }

    fn number_bound(&self, field: &ResolvedField, value: &FieldValue) -> Result<f64> {
        let integer = match value {
            FieldValue::Int(i) => Some(*i),
            FieldValue::Text(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        if let Some(i) = integer {
            if field.field_type == FieldType::Integer && i.unsigned_abs() > MAX_EXACT_INTEGER as u64 {
                return Err(Error::query(format!(
                    "[{}]: bound [{}] for field [{}] is out of range for an integer",
                    self.index, i, field.path
                )));
            }
        }
        let parsed = match value {
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            FieldValue::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        parsed.filter(|f| f.is_finite()).ok_or_else(|| {
            Error::query(format!(
                "[{}]: invalid numeric bound [{}] for field [{}]",
                self.index,
                value.to_term_string().unwrap_or_default(),
                field.path
            ))
        })
    }

    fn exists_docs(&self, name: &str) -> RoaringBitmap {
        let Some(field) = self.resolve(name) else {
            return RoaringBitmap::new();
        };
        let mut docs = RoaringBitmap::new();
        if field.field_type.is_container() {
            for leaf in self.mapping.leaves_under(&field.path) {
                for index in self.snapshot.field_indexes(&leaf.name) {
                    docs |= &index.docs;
                }
            }
        } else {
            for index in self.snapshot.field_indexes(&field.path) {
                docs |= &index.docs;
            }
        }
        docs - self.snapshot.deleted_docs.as_ref()
    }

    /// Analyzer for query text: explicit override, then the field's search
    /// analyzer, then its index analyzer, then the index default.
    fn search_analyzer(&self, explicit: Option<&str>, mapping: &FieldMapping) -> Result<Arc<Analyzer>> {
        if let Some(name) = explicit {
            return self
                .analyzers
                .get(name)
                .ok_or_else(|| Error::query(format!("[{}]: unknown analyzer [{}]", self.index, name)));
        }
        let configured = mapping.search_analyzer.as_deref().or(mapping.analyzer.as_deref());
        Ok(configured
            .and_then(|name| self.analyzers.get(name))
            .unwrap_or_else(|| self.analyzers.default_analyzer()))
    }

    fn match_query(&self, q: &MatchQuery) -> Result<Matches> {
        let boost = q.boost.unwrap_or(1.0);
        let Some(field) = self.searchable_field(&q.field)? else {
            return Ok(Matches::new());
        };
        let mapping = match field.mapping {
            Some(mapping) if mapping.field_type == FieldType::Text => mapping,
            _ => {
                // Non-text fields match the query text as one exact value
                let term = TermQuery::new(q.field.clone(), q.query.as_str());
                return Ok(constant(&self.term_docs(&term)?, boost));
            }
        };

        let analyzer = self.search_analyzer(q.analyzer.as_deref(), mapping)?;
        let terms: BTreeSet<String> = analyzer.terms(&q.query).into_iter().collect();
        if terms.is_empty() {
            return Ok(Matches::new());
        }

        let required = match q.operator {
            Operator::And => terms.len(),
            Operator::Or => q
                .minimum_should_match
                .map_or(1, |msm| msm.resolve(terms.len()))
                .max(1),
        };

        let mut scores: HashMap<DocId, (f32, usize)> = HashMap::new();
        for term in &terms {
            for (doc_id, score) in self.score_term(&field.path, term) {
                let entry = scores.entry(doc_id).or_insert((0.0, 0));
                entry.0 += score;
                entry.1 += 1;
            }
        }

        Ok(scores
            .into_iter()
            .filter(|(_, (_, matched))| *matched >= required)
            .map(|(doc_id, (score, _))| (doc_id, score * boost))
            .collect())
    }

    fn doc_stats(&self, field: &FieldIndex, doc_id: DocId, avg: f32) -> DocStats {
        DocStats {
            doc_length: field.lengths.get(&doc_id).copied(),
            avg_doc_length: avg,
        }
    }

    /// Relevance of every live document containing `term`.
    fn score_term(&self, path: &str, term: &str) -> Vec<(DocId, f32)> {
        let stats = self.snapshot.field_stats(path);
        let doc_freq = self.snapshot.doc_freq(path, term);
        if doc_freq == 0 {
            return Vec::new();
        }
        let idf = self.scorer.idf(doc_freq, stats.doc_count);
        let avg = stats.avg_length();

        let mut out = Vec::new();
        for field in self.snapshot.field_indexes(path) {
            let Some(list) = field.postings(term) else { continue };
            for posting in list.live(&self.snapshot.deleted_docs) {
                let doc_stats = self.doc_stats(field, posting.doc_id, avg);
                out.push((posting.doc_id, self.scorer.score(posting.term_freq, idf, &doc_stats)));
            }
        }
        out
    }

    fn match_phrase(&self, q: &MatchPhraseQuery) -> Result<Matches> {
        let boost = q.boost.unwrap_or(1.0);
        let Some(field) = self.searchable_field(&q.field)? else {
            return Ok(Matches::new());
        };
        let mapping = match field.mapping {
            Some(mapping) if mapping.field_type == FieldType::Text => mapping,
            _ => {
                let term = TermQuery::new(q.field.clone(), q.query.as_str());
                return Ok(constant(&self.term_docs(&term)?, boost));
            }
        };

        let analyzer = self.search_analyzer(q.analyzer.as_deref(), mapping)?;
        let tokens = analyzer.analyze(&q.query);
        let Some(first) = tokens.first() else {
            return Ok(Matches::new());
        };
        // Offsets relative to the first token keep stopword gaps
        let phrase: Vec<(String, u32)> = tokens
            .iter()
            .map(|t| (t.text.clone(), t.position - first.position))
            .collect();

        let stats = self.snapshot.field_stats(&field.path);
        let avg = stats.avg_length();
        let mut idf = 0.0;
        for (term, _) in &phrase {
            let doc_freq = self.snapshot.doc_freq(&field.path, term);
            if doc_freq == 0 {
                return Ok(Matches::new());
            }
            idf += self.scorer.idf(doc_freq, stats.doc_count);
        }

        let mut matches = Matches::new();
        for index in self.snapshot.field_indexes(&field.path) {
            let lists: Option<Vec<&PostingList>> = phrase.iter().map(|(term, _)| index.postings(term)).collect();
            let Some(lists) = lists else { continue };

            for posting in lists[0].live(&self.snapshot.deleted_docs) {
                let doc_id = posting.doc_id;
                let positions: Option<Vec<&[u32]>> = lists
                    .iter()
                    .map(|list| list.get(doc_id).map(|p| p.positions.as_slice()))
                    .collect();
                let Some(positions) = positions else { continue };

                let freq = phrase_freq(&phrase, &positions, q.slop);
                if freq > 0 {
                    let doc_stats = self.doc_stats(index, doc_id, avg);
                    matches.insert(doc_id, self.scorer.score(freq, idf, &doc_stats) * boost);
                }
            }
        }
        Ok(matches)
    }

    fn bool_query(&self, q: &BoolQuery) -> Result<Matches> {
        let boost = q.boost.unwrap_or(1.0);
        if q.clause_count() == 0 {
            return Ok(constant(&self.all_docs(), boost));
        }

        // Candidates come from required clauses, else from should, else everything
        let mut candidates: Option<Matches> = None;
        for clause in &q.must {
            let matches = self.evaluate(clause)?;
            candidates = Some(match candidates {
                None => matches,
                Some(current) => intersect(current, &matches, true),
            });
        }
        for clause in &q.filter {
            let matches = self.evaluate(clause)?;
            candidates = Some(match candidates {
                None => matches.into_keys().map(|doc| (doc, 0.0)).collect(),
                Some(current) => intersect(current, &matches, false),
            });
        }

        let required_should = q.required_should();
        let mut should_hits: HashMap<DocId, (f32, usize)> = HashMap::new();
        for clause in &q.should {
            for (doc_id, score) in self.evaluate(clause)? {
                let entry = should_hits.entry(doc_id).or_insert((0.0, 0));
                entry.0 += score;
                entry.1 += 1;
            }
        }

        let mut result = match candidates {
            Some(mut current) => {
                if required_should > 0 {
                    current.retain(|doc, _| should_hits.get(doc).is_some_and(|(_, n)| *n >= required_should));
                }
                for (doc, score) in current.iter_mut() {
                    if let Some((extra, _)) = should_hits.get(doc) {
                        *score += extra;
                    }
                }
                current
            }
            None if !q.should.is_empty() => should_hits
                .into_iter()
                .filter(|(_, (_, n))| *n >= required_should.max(1))
                .map(|(doc, (score, _))| (doc, score))
                .collect(),
            None => self.all_docs().iter().map(|doc| (DocId(doc), 0.0)).collect(),
        };

        for clause in &q.must_not {
            let excluded = self.evaluate(clause)?;
            result.retain(|doc, _| !excluded.contains_key(doc));
        }

        if boost != 1.0 {
            for score in result.values_mut() {
                *score *= boost;
            }
        }
        Ok(result)
    }

    fn sort_by_fields(
        &self,
        matches: &Matches,
        sort: &[SortField],
        window: usize,
    ) -> Result<(Vec<(ScoredDocument, Vec<serde_json::Value>)>, Option<f32>)> {
        let mut paths = Vec::with_capacity(sort.len());
        for key in sort {
            if key.is_score() || key.field == SortField::ID {
                paths.push(key.field.clone());
                continue;
            }
            let Some(field) = self.resolve(&key.field) else {
                return Err(Error::query(format!(
                    "[{}]: no mapping found for [{}] in order to sort on",
                    self.index, key.field
                )));
            };
            let sortable = field.mapping.is_some_and(|m| m.doc_values && m.field_type.is_leaf());
            if !sortable {
                return Err(Error::query(format!(
                    "[{}]: can't sort on field [{}] without doc values",
                    self.index, field.path
                )));
            }
            paths.push(field.path);
        }

        let max_score = matches.values().copied().reduce(f32::max);
        let mut rows: Vec<(ScoredDocument, Vec<Option<DocValue>>)> = Vec::with_capacity(matches.len());
        for (doc_id, score) in matches {
            let Some(stored) = self.snapshot.stored(*doc_id) else { continue };
            let keys = sort
                .iter()
                .zip(&paths)
                .map(|(key, path)| match path.as_str() {
                    SortField::SCORE => None,
                    SortField::ID => Some(DocValue::Keyword(stored.id.clone())),
                    path => self.doc_value(path, *doc_id, key.order),
                })
                .collect();
            rows.push((
                ScoredDocument {
                    doc_id: *doc_id,
                    id: stored.id.clone(),
                    score: *score,
                },
                keys,
            ));
        }

        rows.sort_by(|(a, a_keys), (b, b_keys)| {
            for ((key, a_value), b_value) in sort.iter().zip(a_keys).zip(b_keys) {
                let ordering = if key.is_score() {
                    match key.order {
                        SortOrder::Desc => b.score.total_cmp(&a.score),
                        SortOrder::Asc => a.score.total_cmp(&b.score),
                    }
                } else {
                    compare_missing_last(a_value, b_value, key.order)
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            a.id.cmp(&b.id)
        });
        rows.truncate(window);

        let ranked = rows
            .into_iter()
            .map(|(doc, keys)| {
                let values = sort
                    .iter()
                    .zip(keys)
                    .map(|(key, value)| match value {
                        _ if key.is_score() => serde_json::json!(doc.score),
                        Some(value) => value.to_json(),
                        None => serde_json::Value::Null,
                    })
                    .collect();
                (doc, values)
            })
            .collect();
        Ok((ranked, max_score))
    }

    /// Sort key of a multi-valued field: smallest value ascending, largest descending.
    fn doc_value(&self, path: &str, doc_id: DocId, order: SortOrder) -> Option<DocValue> {
        let values = self
            .snapshot
            .field_indexes(path)
            .find_map(|index| index.doc_values.get(&doc_id))?;
        match order {
            SortOrder::Asc => values.first().cloned(),
            SortOrder::Desc => values.last().cloned(),
        }
    }
}

fn constant(docs: &RoaringBitmap, score: f32) -> Matches {
    docs.iter().map(|doc| (DocId(doc), score)).collect()
}

fn intersect(current: Matches, other: &Matches, add_scores: bool) -> Matches {
    current
        .into_iter()
        .filter_map(|(doc, score)| {
            let extra = other.get(&doc)?;
            Some((doc, if add_scores { score + extra } else { score }))
        })
        .collect()
}

fn bound<T>(
    exclusive: &Option<FieldValue>,
    inclusive: &Option<FieldValue>,
    convert: impl Fn(&FieldValue) -> Result<T>,
) -> Result<Bound<T>> {
    Ok(match (exclusive, inclusive) {
        (Some(v), _) => Bound::Excluded(convert(v)?),
        (None, Some(v)) => Bound::Included(convert(v)?),
        (None, None) => Bound::Unbounded,
    })
}

fn require_string_field(field: &ResolvedField, query: &str) -> Result<()> {
    match field.field_type {
        FieldType::Text | FieldType::Keyword => Ok(()),
        other => Err(Error::query(format!(
            "[{}] queries are only supported on keyword and text fields, [{}] is of type [{}]",
            query, field.path, other
        ))),
    }
}

/// Missing values sort last in both directions.
fn compare_missing_last(a: &Option<DocValue>, b: &Option<DocValue>, order: SortOrder) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => match order {
            SortOrder::Asc => a.cmp(b),
            SortOrder::Desc => b.cmp(a),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn wildcard_to_regex(pattern: &str) -> String {
    let mut regex = String::with_capacity(pattern.len() + 8);
    regex.push('^');
    for c in pattern.chars() {
        match c {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            c => regex.push_str(&regex::escape(&c.to_string())),
        }
    }
    regex.push('$');
    regex
}

fn literal_prefix(pattern: &str) -> &str {
    let end = pattern.find(['*', '?']).unwrap_or(pattern.len());
    &pattern[..end]
}

/// Number of phrase occurrences. Each term must sit within `slop` positions of
/// where the phrase expects it.
fn phrase_freq(phrase: &[(String, u32)], positions: &[&[u32]], slop: u32) -> u32 {
    let mut freq = 0;
    for &start in positions[0] {
        let matched = phrase.iter().zip(positions).skip(1).all(|((_, offset), term_positions)| {
            let expected = start as i64 + *offset as i64;
            term_positions
                .iter()
                .any(|&p| (p as i64 - expected).unsigned_abs() <= slop as u64)
        });
        if matched {
            freq += 1;
        }
    }
    freq
}
