//! In-memory source store
//!
//! Documents are kept in path order, which doubles as the stable query
//! order cursors rely on. Snapshots are JSON objects mapping document
//! paths to their fields.

use async_trait::async_trait;
use docsync_core::prelude::*;
use docsync_core::{path_segments, FieldMap};
use serde_json::Value;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Source store held in memory
pub struct MemoryStore {
    documents: RwLock<BTreeMap<String, FieldMap>>,
    query_calls: AtomicUsize,
    /// 1-based query call from which queries fail; 0 never fails
    failing_query_from: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(BTreeMap::new()),
            query_calls: AtomicUsize::new(0),
            failing_query_from: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Build a store from `(path, fields)` pairs
    pub fn with_documents<I, P>(documents: I) -> Result<Self>
    where
        I: IntoIterator<Item = (P, FieldMap)>,
        P: Into<String>,
    {
        let mut map = BTreeMap::new();
        for (path, fields) in documents {
            let path = normalize_document_path(&path.into())?;
            map.insert(path, fields);
        }
        Ok(Self {
            documents: RwLock::new(map),
            ..Self::new()
        })
    }

    /// Load a JSON snapshot file
    pub async fn load_snapshot(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await.map_err(|e| {
            SyncError::source_store_with_source(
                format!("Failed to read snapshot {}", path.display()),
                e,
            )
        })?;
        let root: Value = serde_json::from_str(&content)?;
        let Value::Object(entries) = root else {
            return Err(SyncError::source_store(
                "Snapshot must be an object keyed by document path",
            ));
        };

        let mut documents = Vec::with_capacity(entries.len());
        for (doc_path, value) in entries {
            match value {
                Value::Object(fields) => documents.push((doc_path, fields)),
                _ => {
                    return Err(SyncError::source_store(format!(
                        "Snapshot entry {} is not an object",
                        doc_path
                    )))
                }
            }
        }

        let store = Self::with_documents(documents)?;
        info!(path = %path.display(), documents = store.len().await, "Loaded snapshot");
        Ok(store)
    }

    /// Insert or replace a document
    pub async fn insert(&self, path: &str, fields: FieldMap) -> Result<()> {
        let path = normalize_document_path(path)?;
        self.documents.write().await.insert(path, fields);
        Ok(())
    }

    pub async fn remove(&self, path: &str) -> Option<FieldMap> {
        self.documents.write().await.remove(&path_segments(path).join("/"))
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    /// Number of `query_page` calls served so far
    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    /// Make every subsequent query fail
    pub fn set_fail_queries(&self, fail: bool) {
        self.failing_query_from
            .store(if fail { 1 } else { 0 }, Ordering::SeqCst);
    }

    /// Fail query call `call` (1-based) and every one after it
    pub fn fail_queries_from(&self, call: usize) {
        self.failing_query_from.store(call, Ordering::SeqCst);
    }

    /// Make every subsequent write fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SyncError::source_store("Store rejected write"));
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_document_path(path: &str) -> Result<String> {
    let segments = path_segments(path);
    if segments.is_empty() || PathKind::of_segments(&segments) != PathKind::Document {
        return Err(SyncError::source_store(format!(
            "{} is not a document path",
            path
        )));
    }
    Ok(segments.join("/"))
}

fn matches_query(doc_path: &str, query: &CollectionQuery) -> bool {
    let segments = path_segments(doc_path);
    let Some((_, prefix)) = segments.split_last() else {
        return false;
    };
    match query {
        CollectionQuery::Collection(path) => prefix.join("/") == *path,
        CollectionQuery::CollectionGroup(id) => prefix.last() == Some(&id.as_str()),
    }
}

#[async_trait]
impl SourceStore for MemoryStore {
    async fn get_document(&self, path: &str) -> Result<Option<SourceDocument>> {
        let key = path_segments(path).join("/");
        let documents = self.documents.read().await;
        Ok(documents
            .get(&key)
            .map(|fields| SourceDocument::new(key.clone(), fields.clone())))
    }

    async fn query_page(
        &self,
        query: &CollectionQuery,
        start_after: Option<&SourceDocument>,
        limit: usize,
    ) -> Result<Vec<SourceDocument>> {
        let call = self.query_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let failing_from = self.failing_query_from.load(Ordering::SeqCst);
        if failing_from > 0 && call >= failing_from {
            return Err(SyncError::source_store(format!("Query {} failed", query)));
        }

        let documents = self.documents.read().await;
        let lower = match start_after {
            Some(cursor) => Bound::Excluded(cursor.path.clone()),
            None => Bound::Unbounded,
        };
        let page: Vec<SourceDocument> = documents
            .range((lower, Bound::Unbounded))
            .filter(|(path, _)| matches_query(path, query))
            .take(limit)
            .map(|(path, fields)| SourceDocument::new(path.clone(), fields.clone()))
            .collect();

        debug!(query = %query, returned = page.len(), limit, "Served page");
        Ok(page)
    }

    async fn update_document(&self, path: &str, fields: FieldMap) -> Result<()> {
        self.check_writable()?;
        let key = path_segments(path).join("/");
        let mut documents = self.documents.write().await;
        let existing = documents
            .get_mut(&key)
            .ok_or_else(|| SyncError::source_store(format!("No document to update at {}", key)))?;
        existing.extend(fields);
        Ok(())
    }

    async fn add_document(&self, collection: &str, fields: FieldMap) -> Result<String> {
        self.check_writable()?;
        let id = Uuid::new_v4().simple().to_string();
        let path = format!("{}/{}", path_segments(collection).join("/"), id);
        self.insert(&path, fields).await?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn fields(value: Value) -> FieldMap {
        match value {
            Value::Object(map) => map,
            _ => FieldMap::new(),
        }
    }

    async fn seeded() -> MemoryStore {
        MemoryStore::with_documents([
            ("users/a", fields(json!({"n": 1}))),
            ("users/b", fields(json!({"n": 2}))),
            ("users/c", fields(json!({"n": 3}))),
            ("users/a/posts/p1", fields(json!({}))),
            ("products/p1/reviews/r1", fields(json!({}))),
            ("archive/x/reviews/r2", fields(json!({}))),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn test_collection_query_pages() {
        let store = seeded().await;
        let query = CollectionQuery::Collection("users".into());

        let first = store.query_page(&query, None, 2).await.unwrap();
        let ids: Vec<_> = first.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        let second = store.query_page(&query, first.last(), 2).await.unwrap();
        let ids: Vec<_> = second.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["c"]);
        assert_eq!(store.query_calls(), 2);
    }

    #[tokio::test]
    async fn test_group_query_spans_parents() {
        let store = seeded().await;
        let query = CollectionQuery::CollectionGroup("reviews".into());
        let page = store.query_page(&query, None, 10).await.unwrap();
        let paths: Vec<_> = page.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["archive/x/reviews/r2", "products/p1/reviews/r1"]);
    }

    #[tokio::test]
    async fn test_update_merges_and_requires_existing() {
        let store = seeded().await;
        store
            .update_document("users/a", fields(json!({"status": "done"})))
            .await
            .unwrap();
        let doc = store.get_document("users/a").await.unwrap().unwrap();
        assert_eq!(doc.fields.get("n"), Some(&json!(1)));
        assert_eq!(doc.fields.get("status"), Some(&json!("done")));

        assert!(store
            .update_document("users/zzz", FieldMap::new())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_add_document_generates_id() {
        let store = MemoryStore::new();
        let id = store
            .add_document("requests", fields(json!({"x": true})))
            .await
            .unwrap();
        let doc = store
            .get_document(&format!("requests/{}", id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.id, id);
    }

    #[tokio::test]
    async fn test_rejects_collection_paths() {
        let store = MemoryStore::new();
        assert!(store.insert("users", FieldMap::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_query_failure_from_call() {
        let store = seeded().await;
        store.fail_queries_from(2);
        let query = CollectionQuery::Collection("users".into());
        assert!(store.query_page(&query, None, 1).await.is_ok());
        assert!(store.query_page(&query, None, 1).await.is_err());
        assert!(store.query_page(&query, None, 1).await.is_err());
    }

    #[tokio::test]
    async fn test_write_failure_injection() {
        let store = seeded().await;
        store.set_fail_writes(true);
        assert!(store
            .update_document("users/a", FieldMap::new())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_load_snapshot() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"users/u1": {{"name": "Ann"}}, "/users/u2/": {{"name": "Bo"}}}}"#
        )
        .unwrap();

        let store = MemoryStore::load_snapshot(file.path()).await.unwrap();
        assert_eq!(store.len().await, 2);
        let doc = store.get_document("users/u2").await.unwrap().unwrap();
        assert_eq!(doc.fields.get("name"), Some(&json!("Bo")));
    }

    #[tokio::test]
    async fn test_load_snapshot_rejects_non_documents() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"users": {{"name": "Ann"}}}}"#).unwrap();
        assert!(MemoryStore::load_snapshot(file.path()).await.is_err());
    }
}
