use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use crate::core::error::{Error, Result};
use crate::core::types::{DocId, Document, OpType, Source, WriteOptions};

/// Latest state of one document id. Deletes keep the entry as a tombstone so the
/// version keeps counting up if the id is written again.
#[derive(Debug, Clone)]
pub struct DocEntry {
    pub version: u64,
    /// Slot holding the current postings; `None` once deleted.
    pub ordinal: Option<DocId>,
    pub source: Arc<Source>,
    pub deleted: bool,
}

/// Canonical, realtime document storage keyed by external id.
///
/// Callers serialize writes per id (see `KeyedLocks`); the store itself only
/// guards its map.
#[derive(Debug, Default)]
pub struct DocumentStore {
    index: String,
    docs: RwLock<HashMap<String, DocEntry>>,
}

impl DocumentStore {
    pub fn new(index: &str) -> Self {
        DocumentStore {
            index: index.to_string(),
            docs: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, id: &str) -> Option<Document> {
        let docs = self.docs.read();
        docs.get(id).filter(|e| !e.deleted).map(|e| Document {
            id: id.to_string(),
            version: e.version,
            source: (*e.source).clone(),
            deleted: false,
        })
    }

    /// Live entry, sharing the stored source.
    pub fn entry(&self, id: &str) -> Option<DocEntry> {
        self.docs.read().get(id).filter(|e| !e.deleted).cloned()
    }

    /// Validates a put against the current state and returns the version it will get.
    pub fn prepare_put(&self, id: &str, options: &WriteOptions) -> Result<u64> {
        let docs = self.docs.read();
        let current = docs.get(id);
        let live = current.filter(|e| !e.deleted);

        if options.op_type == OpType::Create {
            if let Some(entry) = live {
                return Err(Error::version_conflict(
                    &self.index,
                    id,
                    format!("document already exists (current version [{}])", entry.version),
                ));
            }
        }

        if let Some(expected) = options.if_version {
            match live {
                Some(entry) if entry.version == expected => {}
                Some(entry) => {
                    return Err(Error::version_conflict(
                        &self.index,
                        id,
                        format!("required version [{}], current version [{}]", expected, entry.version),
                    ));
                }
                None => {
                    return Err(Error::version_conflict(
                        &self.index,
                        id,
                        format!("required version [{}], but no document exists", expected),
                    ));
                }
            }
        }

        Ok(current.map_or(1, |e| e.version + 1))
    }

    /// Validates a delete and returns the tombstone's version.
    pub fn prepare_delete(&self, id: &str, if_version: Option<u64>) -> Result<u64> {
        let docs = self.docs.read();
        let entry = docs
            .get(id)
            .filter(|e| !e.deleted)
            .ok_or_else(|| Error::document_not_found(&self.index, id))?;

        if let Some(expected) = if_version {
            if entry.version != expected {
                return Err(Error::version_conflict(
                    &self.index,
                    id,
                    format!("required version [{}], current version [{}]", expected, entry.version),
                ));
            }
        }
        Ok(entry.version + 1)
    }

    /// Stores a new version. Returns the ordinal of the version it replaces, if live.
    pub fn commit_put(&self, id: &str, version: u64, source: Arc<Source>, ordinal: DocId) -> Option<DocId> {
        let mut docs = self.docs.write();
        let previous = docs.insert(
            id.to_string(),
            DocEntry {
                version,
                ordinal: Some(ordinal),
                source,
                deleted: false,
            },
        );
        previous.and_then(|e| e.ordinal)
    }

    /// Turns the live document into a tombstone. Returns the ordinal that was live.
    pub fn commit_delete(&self, id: &str, version: u64) -> Option<DocId> {
        let mut docs = self.docs.write();
        let entry = docs.get_mut(id)?;
        entry.version = version;
        entry.deleted = true;
        entry.source = Arc::new(Source::new());
        entry.ordinal.take()
    }

    /// Ordinal currently holding the live version of `id`.
    pub fn ordinal(&self, id: &str) -> Option<DocId> {
        self.docs.read().get(id).and_then(|e| e.ordinal)
    }

    /// Drops tombstone entries. Versions of reclaimed ids restart from 1.
    pub fn purge_tombstones(&self) -> usize {
        let mut docs = self.docs.write();
        let before = docs.len();
        docs.retain(|_, e| !e.deleted);
        before - docs.len()
    }

    pub fn live_count(&self) -> usize {
        self.docs.read().values().filter(|e| !e.deleted).count()
    }

    pub fn tombstone_count(&self) -> usize {
        self.docs.read().values().filter(|e| e.deleted).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::core::types::FieldValue;

    fn source(name: &str) -> Arc<Source> {
        let mut source = Source::new();
        source.insert("name".into(), FieldValue::Text(name.into()));
        Arc::new(source)
    }

    #[test]
    fn versions_increment_per_write() {
        let store = DocumentStore::new("products");
        let v1 = store.prepare_put("1", &WriteOptions::default()).unwrap();
        assert_eq!(v1, 1);
        assert_eq!(store.commit_put("1", v1, source("a"), DocId(0)), None);

        let v2 = store.prepare_put("1", &WriteOptions::default()).unwrap();
        assert_eq!(v2, 2);
        assert_eq!(store.commit_put("1", v2, source("b"), DocId(1)), Some(DocId(0)));

        let doc = store.get("1").unwrap();
        assert_eq!(doc.version, 2);
        assert_eq!(doc.source["name"], FieldValue::Text("b".into()));
    }

    #[test]
    fn create_and_version_preconditions() {
        let store = DocumentStore::new("products");
        store.commit_put("1", 1, source("a"), DocId(0));

        let err = store.prepare_put("1", &WriteOptions::create()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::VersionConflict);
        assert!(err.context.contains("[products]"));

        assert!(store.prepare_put("1", &WriteOptions::if_version(1)).is_ok());
        let err = store.prepare_put("1", &WriteOptions::if_version(7)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::VersionConflict);
        assert_eq!(store.get("1").unwrap().version, 1);
    }

    #[test]
    fn tombstones_keep_version_and_allow_reuse() {
        let store = DocumentStore::new("products");
        store.commit_put("1", 1, source("a"), DocId(0));

        let version = store.prepare_delete("1", None).unwrap();
        assert_eq!(store.commit_delete("1", version), Some(DocId(0)));
        assert!(store.get("1").is_none());
        assert_eq!(store.prepare_delete("1", None).unwrap_err().kind, ErrorKind::NotFound);
        assert_eq!(store.tombstone_count(), 1);

        let recreated = store.prepare_put("1", &WriteOptions::create()).unwrap();
        assert_eq!(recreated, 3);

        assert_eq!(store.purge_tombstones(), 1);
        assert_eq!(store.live_count(), 0);
    }
}
