use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};
use crate::analysis::analyzer::{AnalyzeRequest, AnalyzerRegistry};
use crate::analysis::token::Token;
use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::core::locks::KeyedLocks;
use crate::core::refresher::Refresher;
use crate::core::settings::{IndexSettings, RefreshPolicy, SettingsUpdate};
use crate::core::stats::{IndexStats, IndexSummary};
use crate::core::types::{merge_source, Document, Source, WriteOptions, WriteOutcome, WriteResult};
use crate::index::merge_policy::TieredMergePolicy;
use crate::index::segment::StoredDoc;
use crate::mvcc::controller::{MVCCController, Snapshot};
use crate::query::ast::Query;
use crate::query::cache::{QueryCache, QueryKey};
use crate::query::validator::ValidationConfig;
use crate::schema::document_mapper::DocumentMapper;
use crate::schema::mapping::{FieldDefinition, MappingRegistry, TypeMapping};
use crate::search::executor::QueryExecutor;
use crate::search::request::SearchRequest;
use crate::search::results::SearchResults;
use crate::storage::doc_store::DocumentStore;
use crate::writer::analyzed::{AnalyzedDocument, DocumentAnalyzer};
use crate::writer::index_writer::{IndexWriter, MergeSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexState {
    Open,
    Closed,
}

/// Partial update applied to the current source of a document.
#[derive(Clone)]
pub enum UpdateAction {
    /// Deep-merges the patch into the source; arrays and scalars are replaced.
    Merge(Source),
    Transform(Arc<dyn Fn(&Source) -> Source + Send + Sync>),
}

impl UpdateAction {
    pub fn merge(patch: Source) -> Self {
        UpdateAction::Merge(patch)
    }

    pub fn transform<F>(f: F) -> Self
    where
        F: Fn(&Source) -> Source + Send + Sync + 'static,
    {
        UpdateAction::Transform(Arc::new(f))
    }

    pub fn apply(&self, current: &Source) -> Source {
        match self {
            UpdateAction::Merge(patch) => {
                let mut next = current.clone();
                merge_source(&mut next, patch.clone());
                next
            }
            UpdateAction::Transform(f) => f(current),
        }
    }
}

impl fmt::Debug for UpdateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateAction::Merge(patch) => f.debug_tuple("Merge").field(patch).finish(),
            UpdateAction::Transform(_) => f.write_str("Transform(..)"),
        }
    }
}

/// Settings, analyzers and mapping change together, so they share one lock.
struct IndexSchema {
    settings: IndexSettings,
    analyzers: AnalyzerRegistry,
    mapping: MappingRegistry,
}

/// One named index: document store, writer, published snapshots and the
/// schema that turns sources into postings.
pub struct SearchIndex {
    name: String,
    state: RwLock<IndexState>,
    schema: RwLock<IndexSchema>,
    store: DocumentStore,
    writer: Mutex<IndexWriter>,
    mvcc: Arc<MVCCController>,
    locks: KeyedLocks,
    cache: QueryCache,
    validation: ValidationConfig,
    default_refresh: RefreshPolicy,
    refresher: Mutex<Option<Refresher>>,
}

impl SearchIndex {
    pub fn create(name: &str, settings: IndexSettings, mapping: &TypeMapping, config: &Config) -> Result<Arc<Self>> {
        settings.validate()?;
        let analyzers = AnalyzerRegistry::from_settings(&settings.analysis)?;
        let mut registry = MappingRegistry::new();
        registry.dynamic_nested = config.dynamic_nested;
        registry.put_mapping(mapping, &analyzers)?;

        let mvcc = Arc::new(MVCCController::new());
        let writer = IndexWriter::new(
            name,
            mvcc.clone(),
            Box::new(TieredMergePolicy::from(&config.merge_policy)),
        );

        let index = Arc::new(SearchIndex {
            name: name.to_string(),
            state: RwLock::new(IndexState::Open),
            schema: RwLock::new(IndexSchema {
                settings,
                analyzers,
                mapping: registry,
            }),
            store: DocumentStore::new(name),
            writer: Mutex::new(writer),
            mvcc,
            locks: KeyedLocks::new(config.lock_stripes),
            cache: QueryCache::new(config.query_cache_size),
            validation: config.validation.clone(),
            default_refresh: config.default_refresh,
            refresher: Mutex::new(None),
        });
        index.configure_refresher()?;
        Ok(index)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> IndexState {
        *self.state.read()
    }

    pub fn is_open(&self) -> bool {
        self.state() == IndexState::Open
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(Error::index_closed(&self.name))
        }
    }

    pub fn refresh_policy(&self) -> RefreshPolicy {
        self.schema.read().settings.refresh_interval.unwrap_or(self.default_refresh)
    }

    /// Starts, replaces or stops the background refresher to match the current
    /// refresh policy and state.
    fn configure_refresher(self: &Arc<Self>) -> Result<()> {
        let mut slot = self.refresher.lock();
        *slot = None;
        if let (IndexState::Open, Some(interval)) = (self.state(), self.refresh_policy().interval()) {
            *slot = Some(Refresher::spawn(Arc::downgrade(self), interval)?);
            debug!(index = %self.name, ?interval, "refresher started");
        }
        Ok(())
    }

    // Lifecycle

    pub fn open(self: &Arc<Self>) -> Result<()> {
        *self.state.write() = IndexState::Open;
        self.configure_refresher()?;
        info!(index = %self.name, "index opened");
        Ok(())
    }

    /// Publishes buffered writes, then rejects reads and writes until reopened.
    pub fn close(&self) {
        {
            let mut state = self.state.write();
            if *state == IndexState::Closed {
                return;
            }
            self.refresh();
            *state = IndexState::Closed;
        }
        *self.refresher.lock() = None;
        info!(index = %self.name, "index closed");
    }

    // Documents

    pub fn index_document(&self, id: &str, source: Source, options: WriteOptions, refresh: bool) -> Result<WriteResult> {
        let _guard = self.locks.lock(id);
        self.put_locked(id, source, options, refresh)
    }

    /// Callers hold the lock for `id`.
    fn put_locked(&self, id: &str, source: Source, options: WriteOptions, refresh: bool) -> Result<WriteResult> {
        self.ensure_open()?;
        let version = self.store.prepare_put(id, &options)?;
        let analyzed = self.analyze_source(id, &source)?;
        let created = self.store.entry(id).is_none();

        let source = Arc::new(source);
        {
            let mut writer = self.writer.lock();
            let previous = self.store.ordinal(id);
            let stored = StoredDoc {
                id: id.to_string(),
                version,
                source: source.clone(),
            };
            let ordinal = writer.add_document(&analyzed, stored, previous);
            self.store.commit_put(id, version, source, ordinal);
        }
        if refresh {
            self.refresh_if_immediate();
        }

        Ok(WriteResult {
            index: self.name.clone(),
            id: id.to_string(),
            version,
            result: if created {
                WriteOutcome::Created
            } else {
                WriteOutcome::Updated
            },
        })
    }

    /// Parses and analyzes a source. New fields found by dynamic mapping are
    /// added only once the whole document has parsed, so a rejected write leaves
    /// the mapping untouched.
    fn analyze_source(&self, id: &str, source: &Source) -> Result<AnalyzedDocument> {
        {
            let schema = self.schema.read();
            if schema.mapping.plan(source)?.is_empty() {
                return analyze_with(id, source, &schema.mapping, &schema.analyzers, schema.settings.mapping_coerce);
            }
        }

        let mut schema = self.schema.write();
        let planned = schema.mapping.plan(source)?;
        let mut mapping = schema.mapping.clone();
        let added = mapping.apply(planned);
        let analyzed = analyze_with(id, source, &mapping, &schema.analyzers, schema.settings.mapping_coerce)?;
        if !added.is_empty() {
            schema.mapping = mapping;
            self.cache.clear();
            info!(index = %self.name, fields = ?added, "dynamic mapping update");
        }
        Ok(analyzed)
    }

    pub fn get_document(&self, id: &str) -> Result<Document> {
        self.ensure_open()?;
        self.store.get(id).ok_or_else(|| Error::document_not_found(&self.name, id))
    }

    /// Applies `action` to the current source. An unchanged source is a noop that
    /// keeps the version.
    pub fn update_document(&self, id: &str, action: &UpdateAction, refresh: bool) -> Result<WriteResult> {
        let _guard = self.locks.lock(id);
        self.ensure_open()?;
        let entry = self
            .store
            .entry(id)
            .ok_or_else(|| Error::document_not_found(&self.name, id))?;

        let updated = action.apply(&entry.source);
        if updated == *entry.source {
            return Ok(WriteResult {
                index: self.name.clone(),
                id: id.to_string(),
                version: entry.version,
                result: WriteOutcome::Noop,
            });
        }
        self.put_locked(id, updated, WriteOptions::if_version(entry.version), refresh)
    }

    pub fn delete_document(&self, id: &str, if_version: Option<u64>, refresh: bool) -> Result<WriteResult> {
        let _guard = self.locks.lock(id);
        self.ensure_open()?;
        let version = self.store.prepare_delete(id, if_version)?;
        {
            let mut writer = self.writer.lock();
            if let Some(ordinal) = self.store.commit_delete(id, version) {
                writer.delete_document(ordinal);
            }
        }
        if refresh {
            self.refresh_if_immediate();
        }

        Ok(WriteResult {
            index: self.name.clone(),
            id: id.to_string(),
            version,
            result: WriteOutcome::Deleted,
        })
    }

    // Search

    pub fn search(&self, request: &SearchRequest) -> Result<SearchResults> {
        self.ensure_open()?;
        let snapshot = self.mvcc.snapshot();
        let key = serde_json::to_string(request).ok().map(|request| QueryKey {
            generation: snapshot.generation,
            request,
        });
        if let Some(cached) = key.as_ref().and_then(|k| self.cache.get(k)) {
            return Ok(cached);
        }

        let results = self.with_executor(&snapshot, |executor, settings| {
            executor.search(request, settings.max_result_window)
        })?;
        if let Some(key) = key {
            self.cache.put(key, results.clone());
        }
        Ok(results)
    }

    pub fn count(&self, query: &Query) -> Result<u64> {
        self.ensure_open()?;
        let snapshot = self.mvcc.snapshot();
        let matches = self.with_executor(&snapshot, |executor, _| executor.execute(query))?;
        Ok(matches.len() as u64)
    }

    /// Stored documents matching `query`, in ordinal order. Refreshes first so
    /// every acknowledged write is seen whatever the refresh policy.
    pub fn matching_documents(&self, query: &Query) -> Result<Vec<StoredDoc>> {
        self.ensure_open()?;
        let snapshot = self.refresh();
        let matches = self.with_executor(&snapshot, |executor, _| executor.execute(query))?;
        Ok(matches
            .keys()
            .filter_map(|doc_id| snapshot.stored(*doc_id).cloned())
            .collect())
    }

    fn with_executor<T>(
        &self,
        snapshot: &Snapshot,
        f: impl FnOnce(&QueryExecutor<'_>, &IndexSettings) -> Result<T>,
    ) -> Result<T> {
        let schema = self.schema.read();
        let scorer = schema.settings.similarity.scorer();
        let executor = QueryExecutor::new(
            &self.name,
            snapshot,
            &schema.mapping,
            &schema.analyzers,
            scorer.as_ref(),
            &self.validation,
        );
        f(&executor, &schema.settings)
    }

    pub fn analyze(&self, request: &AnalyzeRequest) -> Result<Vec<Token>> {
        self.schema.read().analyzers.analyze_request(request)
    }

    // Mapping and settings

    pub fn put_mapping(&self, mapping: &TypeMapping) -> Result<Vec<String>> {
        self.ensure_open()?;
        let mut guard = self.schema.write();
        let schema = &mut *guard;
        let added = schema.mapping.put_mapping(mapping, &schema.analyzers)?;
        if !added.is_empty() {
            self.cache.clear();
            info!(index = %self.name, fields = ?added, "mapping updated");
        }
        Ok(added)
    }

    pub fn get_mapping(&self) -> TypeMapping {
        self.schema.read().mapping.to_type_mapping()
    }

    /// Definitions of the fields matching `pattern`, keyed by full path.
    pub fn get_field_mapping(&self, pattern: &str) -> BTreeMap<String, FieldDefinition> {
        self.schema
            .read()
            .mapping
            .get_field_mapping(pattern)
            .into_iter()
            .map(|m| (m.name.clone(), m.to_definition()))
            .collect()
    }

    pub fn settings(&self) -> IndexSettings {
        self.schema.read().settings.clone()
    }

    pub fn put_settings(self: &Arc<Self>, update: &SettingsUpdate) -> Result<()> {
        let static_keys = update.static_keys();
        if self.is_open() && !static_keys.is_empty() {
            return Err(Error::invalid_mapping(format!(
                "can't update non dynamic settings [{}] for open indices [{}]",
                static_keys.join(", "),
                self.name
            )));
        }

        let refresh_changed = {
            let mut schema = self.schema.write();
            let next = schema.settings.apply(update)?;
            if update.analysis.is_some() {
                let analyzers = AnalyzerRegistry::from_settings(&next.analysis)?;
                schema.mapping.validate_analyzers(&analyzers)?;
                schema.analyzers = analyzers;
            }
            let changed = next.refresh_interval != schema.settings.refresh_interval;
            schema.settings = next;
            changed
        };
        self.cache.clear();
        if refresh_changed {
            self.configure_refresher()?;
        }
        info!(index = %self.name, ?update, "settings updated");
        Ok(())
    }

    // Segments

    /// Publishes buffered writes and returns the new snapshot.
    pub fn refresh(&self) -> Arc<Snapshot> {
        self.writer.lock().refresh()
    }

    pub fn refresh_if_needed(&self) -> bool {
        let mut writer = self.writer.lock();
        if writer.has_pending_changes() {
            writer.refresh();
            true
        } else {
            false
        }
    }

    /// Refreshes when the index publishes on every write.
    pub fn refresh_if_immediate(&self) {
        if self.refresh_policy() == RefreshPolicy::Immediate {
            self.refresh();
        }
    }

    /// Merges all segments into one and drops document-store tombstones.
    pub fn force_merge(&self) -> Result<MergeSummary> {
        self.ensure_open()?;
        let mut writer = self.writer.lock();
        let summary = writer.force_merge();
        let purged = self.store.purge_tombstones();
        info!(
            index = %self.name,
            segments = summary.segments_merged,
            reclaimed = summary.docs_reclaimed,
            purged,
            "force merge"
        );
        Ok(summary)
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.mvcc.snapshot()
    }

    // Introspection

    pub fn stats(&self) -> IndexStats {
        let snapshot = self.mvcc.snapshot();
        let (buffered_docs, segment_count) = {
            let writer = self.writer.lock();
            (writer.buffered_docs(), writer.segment_count())
        };
        IndexStats {
            index: self.name.clone(),
            status: self.state(),
            docs: self.store.live_count() as u64,
            deleted_docs: self.store.tombstone_count() as u64,
            searchable_docs: snapshot.live_doc_count(),
            buffered_docs,
            segment_count,
            generation: snapshot.generation,
            mapped_fields: self.schema.read().mapping.len(),
            query_cache: self.cache.stats(),
        }
    }

    pub fn summary(&self) -> IndexSummary {
        let settings = self.settings();
        IndexSummary {
            index: self.name.clone(),
            status: self.state(),
            docs_count: self.store.live_count() as u64,
            docs_deleted: self.store.tombstone_count() as u64,
            shards: settings.number_of_shards,
            replicas: settings.number_of_replicas,
        }
    }
}

fn analyze_with(
    id: &str,
    source: &Source,
    mapping: &MappingRegistry,
    analyzers: &AnalyzerRegistry,
    coerce: bool,
) -> Result<AnalyzedDocument> {
    let parsed = DocumentMapper::new(mapping, coerce).parse(source)?;
    Ok(DocumentAnalyzer::new(mapping, analyzers).analyze(id, &parsed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::core::types::{source_from_json, FieldValue};
    use serde_json::json;
    use std::thread;
    use std::time::{Duration, Instant};

    fn source(value: serde_json::Value) -> Source {
        source_from_json(value).unwrap()
    }

    fn index() -> Arc<SearchIndex> {
        SearchIndex::create("books", IndexSettings::default(), &TypeMapping::new(), &Config::default()).unwrap()
    }

    #[test]
    fn write_read_and_search() {
        let index = index();
        let created = index
            .index_document("1", source(json!({"title": "Rust in Action"})), WriteOptions::default(), true)
            .unwrap();
        assert_eq!((created.version, created.result), (1, WriteOutcome::Created));

        let replaced = index
            .index_document("1", source(json!({"title": "Programming Rust"})), WriteOptions::default(), true)
            .unwrap();
        assert_eq!((replaced.version, replaced.result), (2, WriteOutcome::Updated));

        assert_eq!(index.get_document("1").unwrap().version, 2);
        assert_eq!(index.count(&Query::match_text("title", "programming")).unwrap(), 1);
        assert_eq!(index.count(&Query::match_text("title", "action")).unwrap(), 0);
        assert!(index.get_field_mapping("title").contains_key("title"));
    }

    #[test]
    fn rejected_write_leaves_mapping_alone() {
        let index = index();
        index
            .index_document("1", source(json!({"price": 10})), WriteOptions::default(), true)
            .unwrap();
        let err = index
            .index_document(
                "2",
                source(json!({"price": "cheap", "colour": "red"})),
                WriteOptions::default(),
                true,
            )
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
        assert!(index.get_field_mapping("colour").is_empty());
        assert_eq!(index.get_document("2").unwrap_err().kind, ErrorKind::NotFound);
    }

    #[test]
    fn update_noop_keeps_version() {
        let index = index();
        index
            .index_document("1", source(json!({"n": 1})), WriteOptions::default(), true)
            .unwrap();

        let same = index
            .update_document("1", &UpdateAction::merge(source(json!({"n": 1}))), true)
            .unwrap();
        assert_eq!((same.version, same.result), (1, WriteOutcome::Noop));

        let bump = UpdateAction::transform(|s| {
            let mut next = s.clone();
            next.insert("n".into(), FieldValue::Int(2));
            next
        });
        let changed = index.update_document("1", &bump, true).unwrap();
        assert_eq!((changed.version, changed.result), (2, WriteOutcome::Updated));
        assert_eq!(index.get_document("1").unwrap().source["n"], FieldValue::Int(2));
    }

    #[test]
    fn closed_index_rejects_operations() {
        let index = index();
        index.close();
        let err = index
            .index_document("1", Source::new(), WriteOptions::default(), true)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::IndexClosed);
        assert_eq!(index.count(&Query::match_all()).unwrap_err().kind, ErrorKind::IndexClosed);

        index.open().unwrap();
        assert!(index.count(&Query::match_all()).is_ok());
    }

    #[test]
    fn static_settings_need_closed_index() {
        let index = index();
        let update = SettingsUpdate {
            similarity: Some(crate::core::settings::Similarity::Classic),
            ..Default::default()
        };
        assert_eq!(index.put_settings(&update).unwrap_err().kind, ErrorKind::InvalidMapping);
        index.close();
        index.put_settings(&update).unwrap();
        assert_eq!(index.settings().similarity, crate::core::settings::Similarity::Classic);
    }

    #[test]
    fn interval_refresh_publishes_in_background() {
        let index = index();
        index
            .put_settings(&SettingsUpdate::new().refresh_interval(RefreshPolicy::Interval { interval_ms: 10 }))
            .unwrap();
        index
            .index_document("1", source(json!({"a": "b"})), WriteOptions::default(), true)
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while index.count(&Query::match_all()).unwrap() == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(index.count(&Query::match_all()).unwrap(), 1);
    }
}
