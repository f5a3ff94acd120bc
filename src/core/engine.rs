use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use crate::analysis::analyzer::{AnalyzeRequest, AnalyzerRegistry};
use crate::analysis::token::Token;
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::search_index::{SearchIndex, UpdateAction};
use crate::core::settings::{IndexSettings, SettingsUpdate};
use crate::core::stats::{IndexStats, IndexSummary};
use crate::core::types::{Document, Source, WriteOptions, WriteResult};
use crate::query::ast::Query;
use crate::schema::mapping::{FieldDefinition, TypeMapping};
use crate::search::request::SearchRequest;
use crate::search::results::SearchResults;
use crate::writer::bulk::{self, BulkRequest, BulkResponse};
use crate::writer::index_writer::MergeSummary;
use crate::writer::reindex::{self, ByQueryResponse, CancellationToken, ReindexRequest, ReindexResponse};

pub const MAX_ID_BYTES: usize = 512;
const MAX_INDEX_NAME_BYTES: usize = 255;

/// Registry of named indices and the entry point of every operation.
pub struct Engine {
    config: Config,
    indices: RwLock<HashMap<String, Arc<SearchIndex>>>,
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new(Config::default())
    }
}

impl Engine {
    pub fn new(config: Config) -> Self {
        Engine {
            config,
            indices: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // Index lifecycle

    pub fn create_index(&self, name: &str, settings: IndexSettings, mapping: TypeMapping) -> Result<()> {
        validate_index_name(name)?;
        let mut indices = self.indices.write();
        if indices.contains_key(name) {
            return Err(Error::new(
                ErrorKind::AlreadyExists,
                format!("index [{}] already exists", name),
            ));
        }
        let index = SearchIndex::create(name, settings, &mapping, &self.config)?;
        indices.insert(name.to_string(), index);
        info!(index = %name, "index created");
        Ok(())
    }

    pub fn delete_index(&self, name: &str) -> Result<()> {
        let removed = self.indices.write().remove(name);
        match removed {
            Some(_) => {
                info!(index = %name, "index deleted");
                Ok(())
            }
            None => Err(Error::index_not_found(name)),
        }
    }

    pub fn index_exists(&self, name: &str) -> bool {
        self.indices.read().contains_key(name)
    }

    pub fn open_index(&self, name: &str) -> Result<()> {
        self.get_index(name)?.open()
    }

    pub fn close_index(&self, name: &str) -> Result<()> {
        self.get_index(name)?.close();
        Ok(())
    }

    pub fn get_settings(&self, name: &str) -> Result<IndexSettings> {
        Ok(self.get_index(name)?.settings())
    }

    /// Dynamic keys apply to open indices; static keys need the index closed.
    pub fn put_settings(&self, name: &str, update: SettingsUpdate) -> Result<()> {
        self.get_index(name)?.put_settings(&update)
    }

    pub fn get_index(&self, name: &str) -> Result<Arc<SearchIndex>> {
        self.indices
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::index_not_found(name))
    }

    /// Target of an `index`/`create` write, created with defaults when missing
    /// and `auto_create_index` is on.
    pub(crate) fn write_index(&self, name: &str) -> Result<Arc<SearchIndex>> {
        if let Some(index) = self.indices.read().get(name) {
            return Ok(index.clone());
        }
        if !self.config.auto_create_index {
            return Err(Error::index_not_found(name));
        }

        validate_index_name(name)?;
        let mut indices = self.indices.write();
        if let Some(index) = indices.get(name) {
            return Ok(index.clone());
        }
        let index = SearchIndex::create(name, IndexSettings::default(), &TypeMapping::new(), &self.config)?;
        indices.insert(name.to_string(), index.clone());
        info!(index = %name, "index auto-created");
        Ok(index)
    }

    // Mapping

    /// Adds fields to the mapping. Returns the paths that were new.
    pub fn put_mapping(&self, index: &str, mapping: &TypeMapping) -> Result<Vec<String>> {
        self.get_index(index)?.put_mapping(mapping)
    }

    pub fn get_mapping(&self, index: &str) -> Result<TypeMapping> {
        Ok(self.get_index(index)?.get_mapping())
    }

    /// Mappings of the fields matching `field` (`*` wildcards allowed).
    pub fn get_field_mapping(&self, index: &str, field: &str) -> Result<BTreeMap<String, FieldDefinition>> {
        let found = self.get_index(index)?.get_field_mapping(field);
        if found.is_empty() {
            return Err(Error::field_not_found(index, field));
        }
        Ok(found)
    }

    // Documents

    /// Creates or replaces a document. A missing `id` is generated.
    pub fn index(&self, index: &str, id: Option<&str>, source: Source) -> Result<WriteResult> {
        self.index_with(index, id, source, WriteOptions::default())
    }

    /// Fails with a version conflict when the id is live.
    pub fn create(&self, index: &str, id: Option<&str>, source: Source) -> Result<WriteResult> {
        self.index_with(index, id, source, WriteOptions::create())
    }

    pub fn index_with(&self, index: &str, id: Option<&str>, source: Source, options: WriteOptions) -> Result<WriteResult> {
        let id = document_id(id)?;
        self.write_index(index)?.index_document(&id, source, options, true)
    }

    /// Realtime: reads the document store, not the last published snapshot.
    pub fn get(&self, index: &str, id: &str) -> Result<Document> {
        self.get_index(index)?.get_document(id)
    }

    pub fn update(&self, index: &str, id: &str, action: UpdateAction) -> Result<WriteResult> {
        self.get_index(index)?.update_document(id, &action, true)
    }

    pub fn delete(&self, index: &str, id: &str) -> Result<WriteResult> {
        self.delete_with(index, id, None)
    }

    pub fn delete_with(&self, index: &str, id: &str, if_version: Option<u64>) -> Result<WriteResult> {
        self.get_index(index)?.delete_document(id, if_version, true)
    }

    pub fn delete_by_query(&self, index: &str, query: &Query, cancel: &CancellationToken) -> Result<ByQueryResponse> {
        let index = self.get_index(index)?;
        reindex::delete_by_query(&index, query, cancel)
    }

    pub fn update_by_query(
        &self,
        index: &str,
        query: &Query,
        action: Option<UpdateAction>,
        cancel: &CancellationToken,
    ) -> Result<ByQueryResponse> {
        let index = self.get_index(index)?;
        reindex::update_by_query(&index, query, action.as_ref(), cancel)
    }

    pub fn bulk(&self, request: BulkRequest) -> BulkResponse {
        bulk::execute(self, request)
    }

    pub fn reindex(&self, request: &ReindexRequest, cancel: &CancellationToken) -> Result<ReindexResponse> {
        reindex::reindex(self, request, cancel)
    }

    // Search

    pub fn search(&self, index: &str, request: &SearchRequest) -> Result<SearchResults> {
        self.get_index(index)?.search(request)
    }

    pub fn count(&self, index: &str, query: &Query) -> Result<u64> {
        self.get_index(index)?.count(query)
    }

    /// Runs text through an analyzer without indexing it. Names resolve against
    /// the request's index when one is given.
    pub fn analyze(&self, request: &AnalyzeRequest) -> Result<Vec<Token>> {
        match &request.index {
            Some(index) => self.get_index(index)?.analyze(request),
            None => AnalyzerRegistry::new().analyze_request(request),
        }
    }

    // Segments

    pub fn refresh(&self, index: &str) -> Result<()> {
        let index = self.get_index(index)?;
        if !index.is_open() {
            return Err(Error::index_closed(index.name()));
        }
        index.refresh();
        Ok(())
    }

    pub fn force_merge(&self, index: &str) -> Result<MergeSummary> {
        self.get_index(index)?.force_merge()
    }

    // Introspection

    pub fn stats(&self, index: &str) -> Result<IndexStats> {
        Ok(self.get_index(index)?.stats())
    }

    /// One row per index, sorted by name.
    pub fn cat_indices(&self) -> Vec<IndexSummary> {
        let indices: Vec<Arc<SearchIndex>> = self.indices.read().values().cloned().collect();
        let mut rows: Vec<IndexSummary> = indices.iter().map(|i| i.summary()).collect();
        rows.sort_by(|a, b| a.index.cmp(&b.index));
        rows
    }
}

/// The given id after validation, or a generated one.
pub(crate) fn document_id(id: Option<&str>) -> Result<String> {
    match id {
        None => Ok(Uuid::new_v4().simple().to_string()),
        Some("") => Err(Error::invalid_argument("document id must not be empty")),
        Some(id) if id.len() > MAX_ID_BYTES => Err(Error::invalid_argument(format!(
            "id [{}...] is too long, must be no longer than {} bytes but was {}",
            id.chars().take(16).collect::<String>(),
            MAX_ID_BYTES,
            id.len()
        ))),
        Some(id) => Ok(id.to_string()),
    }
}

fn validate_index_name(name: &str) -> Result<()> {
    const INVALID: &[char] = &['\\', '/', '*', '?', '"', '<', '>', '|', ' ', ',', '#', ':'];
    let invalid = |reason: &str| Err(Error::invalid_argument(format!("invalid index name [{}], {}", name, reason)));

    if name.is_empty() {
        return invalid("must not be empty");
    }
    if name == "." || name == ".." {
        return invalid("must not be '.' or '..'");
    }
    if name.len() > MAX_INDEX_NAME_BYTES {
        return invalid("index name is too long");
    }
    if name.starts_with(['_', '-', '+']) {
        return invalid("must not start with '_', '-', or '+'");
    }
    if name.chars().any(|c| c.is_uppercase()) {
        return invalid("must be lowercase");
    }
    if name.contains(INVALID) {
        return invalid("must not contain the characters [\\, /, *, ?, \", <, >, |, ' ', ',', #, :]");
    }
    Ok(())
}
