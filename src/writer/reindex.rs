use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use crate::core::engine::Engine;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::search_index::{SearchIndex, UpdateAction};
use crate::core::types::{project_source, OpType, Source, WriteOptions, WriteOutcome};
use crate::query::ast::Query;

pub type ReindexTransform = Arc<dyn Fn(&str, &Source) -> Option<Source> + Send + Sync>;

/// Shared flag a caller flips to stop a running reindex or by-query operation.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Clone)]
pub struct ReindexRequest {
    pub source: String,
    /// Defaults to `match_all`.
    pub query: Option<Query>,
    /// Source paths copied to the destination; all of them when unset.
    pub source_fields: Option<Vec<String>>,
    pub batch_size: Option<usize>,
    pub dest: String,
    pub op_type: OpType,
    /// Returns the source to write, or `None` to skip the document.
    pub transform: Option<ReindexTransform>,
}

impl ReindexRequest {
    pub fn new(source: impl Into<String>, dest: impl Into<String>) -> Self {
        ReindexRequest {
            source: source.into(),
            query: None,
            source_fields: None,
            batch_size: None,
            dest: dest.into(),
            op_type: OpType::Index,
            transform: None,
        }
    }

    pub fn query(mut self, query: Query) -> Self {
        self.query = Some(query);
        self
    }

    pub fn source_fields(mut self, fields: Vec<String>) -> Self {
        self.source_fields = Some(fields);
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    pub fn op_type(mut self, op_type: OpType) -> Self {
        self.op_type = op_type;
        self
    }

    pub fn transform<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &Source) -> Option<Source> + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for ReindexRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReindexRequest")
            .field("source", &self.source)
            .field("query", &self.query)
            .field("source_fields", &self.source_fields)
            .field("batch_size", &self.batch_size)
            .field("dest", &self.dest)
            .field("op_type", &self.op_type)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

/// A document that could not be written.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteFailure {
    pub index: String,
    pub id: String,
    pub error: Error,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReindexResponse {
    /// Source documents matched by the query.
    pub total: u64,
    pub created: u64,
    pub updated: u64,
    pub noops: u64,
    pub version_conflicts: u64,
    pub failures: Vec<WriteFailure>,
    pub batches: u64,
    pub cancelled: bool,
    pub took_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ByQueryResponse {
    pub total: u64,
    pub deleted: u64,
    pub updated: u64,
    pub noops: u64,
    pub version_conflicts: u64,
    pub failures: u64,
    pub cancelled: bool,
    pub took_ms: u64,
}

/// Copies matching documents of the current source snapshot into `dest`.
/// Cancellation leaves already written batches in place.
pub(crate) fn reindex(engine: &Engine, request: &ReindexRequest, cancel: &CancellationToken) -> Result<ReindexResponse> {
    let start = Instant::now();
    if request.source == request.dest {
        return Err(Error::invalid_argument(format!(
            "reindex cannot write into its source index [{}]",
            request.source
        )));
    }
    let source = engine.get_index(&request.source)?;
    let dest = engine.write_index(&request.dest)?;
    let query = request.query.clone().unwrap_or_else(Query::match_all);
    let docs = source.matching_documents(&query)?;
    let batch_size = request.batch_size.unwrap_or(engine.config().reindex_batch_size).max(1);

    let mut response = ReindexResponse {
        total: docs.len() as u64,
        ..Default::default()
    };
    info!(source = %request.source, dest = %request.dest, docs = response.total, "reindex started");

    'batches: for batch in docs.chunks(batch_size) {
        for doc in batch {
            if cancel.is_cancelled() {
                response.cancelled = true;
                break 'batches;
            }

            let projected = match &request.source_fields {
                Some(fields) => project_source(&doc.source, fields),
                None => (*doc.source).clone(),
            };
            let body = match &request.transform {
                Some(transform) => match transform(&doc.id, &projected) {
                    Some(body) => body,
                    None => {
                        response.noops += 1;
                        continue;
                    }
                },
                None => projected,
            };

            let options = WriteOptions {
                op_type: request.op_type,
                if_version: None,
            };
            match dest.index_document(&doc.id, body, options, false) {
                Ok(result) if result.result == WriteOutcome::Created => response.created += 1,
                Ok(_) => response.updated += 1,
                Err(e) if e.is(ErrorKind::VersionConflict) => response.version_conflicts += 1,
                Err(error) => response.failures.push(WriteFailure {
                    index: request.dest.clone(),
                    id: doc.id.clone(),
                    error,
                }),
            }
        }
        response.batches += 1;
        dest.refresh_if_immediate();
        debug!(dest = %request.dest, batch = response.batches, "reindex batch written");
    }
    dest.refresh_if_immediate();

    response.took_ms = start.elapsed().as_millis() as u64;
    if response.cancelled {
        warn!(source = %request.source, dest = %request.dest, created = response.created, "reindex cancelled");
    } else {
        info!(
            source = %request.source,
            dest = %request.dest,
            created = response.created,
            updated = response.updated,
            failures = response.failures.len(),
            took_ms = response.took_ms,
            "reindex completed"
        );
    }
    Ok(response)
}

/// Deletes documents matching `query`, each guarded by the version it had in
/// the snapshot the query ran against.
pub(crate) fn delete_by_query(index: &SearchIndex, query: &Query, cancel: &CancellationToken) -> Result<ByQueryResponse> {
    let start = Instant::now();
    let docs = index.matching_documents(query)?;
    let mut response = ByQueryResponse {
        total: docs.len() as u64,
        ..Default::default()
    };

    for doc in &docs {
        if cancel.is_cancelled() {
            response.cancelled = true;
            break;
        }
        match index.delete_document(&doc.id, Some(doc.version), false) {
            Ok(_) => response.deleted += 1,
            Err(e) if e.is(ErrorKind::VersionConflict) || e.is(ErrorKind::NotFound) => {
                response.version_conflicts += 1
            }
            Err(e) => {
                warn!(index = %index.name(), id = %doc.id, error = %e, "delete by query item failed");
                response.failures += 1;
            }
        }
    }
    index.refresh_if_immediate();

    response.took_ms = start.elapsed().as_millis() as u64;
    info!(index = %index.name(), deleted = response.deleted, conflicts = response.version_conflicts, "delete by query");
    Ok(response)
}

/// Rewrites documents matching `query` in place, through `action` when given,
/// so they are re-analyzed with the current mapping.
pub(crate) fn update_by_query(
    index: &SearchIndex,
    query: &Query,
    action: Option<&UpdateAction>,
    cancel: &CancellationToken,
) -> Result<ByQueryResponse> {
    let start = Instant::now();
    let docs = index.matching_documents(query)?;
    let mut response = ByQueryResponse {
        total: docs.len() as u64,
        ..Default::default()
    };

    for doc in &docs {
        if cancel.is_cancelled() {
            response.cancelled = true;
            break;
        }
        let body = match action {
            Some(action) => {
                let next = action.apply(&doc.source);
                if next == *doc.source {
                    response.noops += 1;
                    continue;
                }
                next
            }
            None => (*doc.source).clone(),
        };
        match index.index_document(&doc.id, body, WriteOptions::if_version(doc.version), false) {
            Ok(_) => response.updated += 1,
            Err(e) if e.is(ErrorKind::VersionConflict) => response.version_conflicts += 1,
            Err(e) => {
                warn!(index = %index.name(), id = %doc.id, error = %e, "update by query item failed");
                response.failures += 1;
            }
        }
    }
    index.refresh_if_immediate();

    response.took_ms = start.elapsed().as_millis() as u64;
    info!(index = %index.name(), updated = response.updated, conflicts = response.version_conflicts, "update by query");
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn request_builder() {
        let request = ReindexRequest::new("a", "b")
            .query(Query::term("tag", "x"))
            .source_fields(vec!["title".into()])
            .batch_size(10)
            .op_type(OpType::Create)
            .transform(|_, s| Some(s.clone()));
        assert_eq!(request.batch_size, Some(10));
        assert!(format!("{:?}", request).contains("transform: true"));
    }
}
