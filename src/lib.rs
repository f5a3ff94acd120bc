pub mod core;
pub mod storage;
pub mod analysis;
pub mod schema;
pub mod index;
pub mod scoring;
pub mod search;
pub mod query;
pub mod mvcc;
pub mod writer;

pub use crate::analysis::analyzer::AnalyzeRequest;
pub use crate::core::config::Config;
pub use crate::core::engine::Engine;
pub use crate::core::error::{Error, ErrorKind, Result};
pub use crate::core::search_index::{IndexState, UpdateAction};
pub use crate::core::settings::{IndexSettings, RefreshPolicy, SettingsUpdate, Similarity};
pub use crate::core::types::{Document, FieldValue, OpType, Source, WriteOptions, WriteOutcome, WriteResult};
pub use crate::query::ast::Query;
pub use crate::schema::mapping::{FieldDefinition, TypeMapping};
pub use crate::search::request::{SearchRequest, SortField, SortOrder};
pub use crate::search::results::{SearchHit, SearchResults};
pub use crate::writer::bulk::{BulkOperation, BulkRequest, BulkResponse};
pub use crate::writer::reindex::{CancellationToken, ReindexRequest, ReindexResponse};

/*
┌──────────────────────────────── VESPER ────────────────────────────────┐
│                                                                         │
│  Engine ── RwLock<HashMap<name, Arc<SearchIndex>>>                      │
│                                                                         │
│  SearchIndex                                                            │
│  ├─ schema: RwLock<{ IndexSettings, AnalyzerRegistry, MappingRegistry }>│
│  ├─ store: DocumentStore        id → { version, source, tombstone }     │
│  ├─ locks: KeyedLocks           writes to one id serialize              │
│  ├─ writer: Mutex<IndexWriter>  buffer ─refresh─▶ Segment               │
│  ├─ mvcc: MVCCController        ArcSwap<Snapshot>                       │
│  ├─ cache: QueryCache           LRU keyed by generation                 │
│  └─ refresher                   crossbeam ticker (interval policy)      │
│                                                                         │
│  write:  source ─plan/parse─▶ ParsedDocument ─analyze─▶ AnalyzedDocument│
│          ─▶ IndexWriter::add_document ─▶ DocumentStore::commit_put      │
│                                                                         │
│  read:   Snapshot ─▶ QueryExecutor ─▶ Matches ─▶ TopK / field sort      │
│                                                                         │
│  merge:  TieredMergePolicy after refresh, force_merge on demand         │
└─────────────────────────────────────────────────────────────────────────┘
*/
