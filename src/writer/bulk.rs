use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use crate::core::engine::{document_id, Engine};
use crate::core::error::{Error, Result};
use crate::core::search_index::{SearchIndex, UpdateAction};
use crate::core::types::{Source, WriteOptions, WriteResult};

/// One item of a bulk request. `index` falls back to the request default.
#[derive(Debug, Clone)]
pub enum BulkOperation {
    Index {
        index: Option<String>,
        id: Option<String>,
        source: Source,
        if_version: Option<u64>,
    },
    Create {
        index: Option<String>,
        id: Option<String>,
        source: Source,
    },
    Update {
        index: Option<String>,
        id: String,
        action: UpdateAction,
    },
    Delete {
        index: Option<String>,
        id: String,
        if_version: Option<u64>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkOpKind {
    Index,
    Create,
    Update,
    Delete,
}

impl BulkOperation {
    pub fn index(id: impl Into<String>, source: Source) -> Self {
        BulkOperation::Index {
            index: None,
            id: Some(id.into()),
            source,
            if_version: None,
        }
    }

    pub fn create(id: impl Into<String>, source: Source) -> Self {
        BulkOperation::Create {
            index: None,
            id: Some(id.into()),
            source,
        }
    }

    pub fn update(id: impl Into<String>, action: UpdateAction) -> Self {
        BulkOperation::Update {
            index: None,
            id: id.into(),
            action,
        }
    }

    pub fn delete(id: impl Into<String>) -> Self {
        BulkOperation::Delete {
            index: None,
            id: id.into(),
            if_version: None,
        }
    }

    /// Targets `index` instead of the request default.
    pub fn in_index(mut self, target: impl Into<String>) -> Self {
        let target = Some(target.into());
        match &mut self {
            BulkOperation::Index { index, .. }
            | BulkOperation::Create { index, .. }
            | BulkOperation::Update { index, .. }
            | BulkOperation::Delete { index, .. } => *index = target,
        }
        self
    }

    pub fn kind(&self) -> BulkOpKind {
        match self {
            BulkOperation::Index { .. } => BulkOpKind::Index,
            BulkOperation::Create { .. } => BulkOpKind::Create,
            BulkOperation::Update { .. } => BulkOpKind::Update,
            BulkOperation::Delete { .. } => BulkOpKind::Delete,
        }
    }

    fn target(&self) -> Option<&str> {
        match self {
            BulkOperation::Index { index, .. }
            | BulkOperation::Create { index, .. }
            | BulkOperation::Update { index, .. }
            | BulkOperation::Delete { index, .. } => index.as_deref(),
        }
    }

    fn given_id(&self) -> Option<&str> {
        match self {
            BulkOperation::Index { id, .. } | BulkOperation::Create { id, .. } => id.as_deref(),
            BulkOperation::Update { id, .. } | BulkOperation::Delete { id, .. } => Some(id),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BulkRequest {
    pub index: Option<String>,
    pub operations: Vec<BulkOperation>,
}

impl BulkRequest {
    pub fn new() -> Self {
        BulkRequest::default()
    }

    pub fn for_index(index: impl Into<String>) -> Self {
        BulkRequest {
            index: Some(index.into()),
            operations: Vec::new(),
        }
    }

    pub fn add(mut self, operation: BulkOperation) -> Self {
        self.operations.push(operation);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulkItemResult {
    pub op: BulkOpKind,
    pub index: String,
    pub id: String,
    pub status: Result<WriteResult>,
}

impl BulkItemResult {
    pub fn is_success(&self) -> bool {
        self.status.is_ok()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulkResponse {
    pub took_ms: u64,
    /// At least one item failed.
    pub errors: bool,
    pub items: Vec<BulkItemResult>,
}

/// Applies operations in order. A failed item is recorded and the rest still run.
/// Refreshes happen once at the end for indices that refresh on every write.
pub(crate) fn execute(engine: &Engine, request: BulkRequest) -> BulkResponse {
    let start = Instant::now();
    let mut touched: BTreeMap<String, Arc<SearchIndex>> = BTreeMap::new();
    let mut items = Vec::with_capacity(request.operations.len());

    for operation in request.operations {
        let op = operation.kind();
        let target = operation.target().or(request.index.as_deref()).map(str::to_string);
        let Some(target) = target else {
            items.push(BulkItemResult {
                op,
                index: String::new(),
                id: operation.given_id().unwrap_or_default().to_string(),
                status: Err(Error::invalid_argument("bulk item has no target index")),
            });
            continue;
        };

        let id = match document_id(operation.given_id()) {
            Ok(id) => id,
            Err(e) => {
                items.push(BulkItemResult {
                    op,
                    index: target,
                    id: operation.given_id().unwrap_or_default().to_string(),
                    status: Err(e),
                });
                continue;
            }
        };

        let status = apply(engine, &target, &id, operation, &mut touched);
        items.push(BulkItemResult {
            op,
            index: target,
            id,
            status,
        });
    }

    for index in touched.values() {
        index.refresh_if_immediate();
    }

    let failures = items.iter().filter(|i| !i.is_success()).count();
    let took_ms = start.elapsed().as_millis() as u64;
    if failures > 0 {
        warn!(items = items.len(), failures, took_ms, "bulk completed with failures");
    } else {
        info!(items = items.len(), took_ms, "bulk completed");
    }

    BulkResponse {
        took_ms,
        errors: failures > 0,
        items,
    }
}

fn apply(
    engine: &Engine,
    target: &str,
    id: &str,
    operation: BulkOperation,
    touched: &mut BTreeMap<String, Arc<SearchIndex>>,
) -> Result<WriteResult> {
    let index = match &operation {
        BulkOperation::Index { .. } | BulkOperation::Create { .. } => engine.write_index(target)?,
        BulkOperation::Update { .. } | BulkOperation::Delete { .. } => engine.get_index(target)?,
    };
    touched.entry(target.to_string()).or_insert_with(|| index.clone());

    match operation {
        BulkOperation::Index { source, if_version, .. } => {
            let options = WriteOptions {
                if_version,
                ..WriteOptions::default()
            };
            index.index_document(id, source, options, false)
        }
        BulkOperation::Create { source, .. } => index.index_document(id, source, WriteOptions::create(), false),
        BulkOperation::Update { action, .. } => index.update_document(id, &action, false),
        BulkOperation::Delete { if_version, .. } => index.delete_document(id, if_version, false),
    }
}
