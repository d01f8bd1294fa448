//! In-memory search index with failure injection

use async_trait::async_trait;
use docsync_core::prelude::*;
use docsync_core::{DocumentOutcome, ImportAction, ImportOutcome};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::trace;

type Collection = BTreeMap<String, IndexRecord>;

#[derive(Default)]
struct FailurePlan {
    /// 1-based import call numbers that fail outright
    failing_imports: HashSet<usize>,
    /// Record ids rejected inside accepted imports
    rejected_ids: HashSet<String>,
    /// Transient failures left before imports succeed
    transient_import_failures: usize,
    fail_upserts: bool,
    fail_deletes: bool,
}

/// Search index held in memory
pub struct MemoryIndex {
    collections: RwLock<BTreeMap<String, Collection>>,
    plan: RwLock<FailurePlan>,
    import_calls: AtomicUsize,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(BTreeMap::new()),
            plan: RwLock::new(FailurePlan::default()),
            import_calls: AtomicUsize::new(0),
        }
    }

    /// Fail the given import call (1-based) with a non-retryable error
    pub async fn fail_import_call(&self, call: usize) {
        self.plan.write().await.failing_imports.insert(call);
    }

    /// Reject these ids inside otherwise accepted imports
    pub async fn reject_ids<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.plan
            .write()
            .await
            .rejected_ids
            .extend(ids.into_iter().map(Into::into));
    }

    /// Fail the next `count` imports with a retryable server error
    pub async fn fail_next_imports_transiently(&self, count: usize) {
        self.plan.write().await.transient_import_failures = count;
    }

    pub async fn set_fail_upserts(&self, fail: bool) {
        self.plan.write().await.fail_upserts = fail;
    }

    /// Fail document deletes with a server error
    pub async fn set_fail_deletes(&self, fail: bool) {
        self.plan.write().await.fail_deletes = fail;
    }

    pub fn import_calls(&self) -> usize {
        self.import_calls.load(Ordering::SeqCst)
    }

    pub async fn get(&self, collection: &str, id: &str) -> Option<IndexRecord> {
        self.collections
            .read()
            .await
            .get(collection)
            .and_then(|c| c.get(id))
            .cloned()
    }

    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    pub async fn ids(&self, collection: &str) -> Vec<String> {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn has_collection(&self, name: &str) -> bool {
        self.collections.read().await.contains_key(name)
    }

    async fn store(&self, collection: &str, record: IndexRecord) -> Result<()> {
        let id = record
            .id()
            .ok_or_else(|| SyncError::index_status("Document is missing an id", 400))?
            .to_string();
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(id, record);
        Ok(())
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HealthCheck for MemoryIndex {
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    fn component_name(&self) -> &'static str {
        "memory_index"
    }
}

#[async_trait]
impl IndexClient for MemoryIndex {
    async fn create_collection(&self, schema: &Value) -> Result<()> {
        let name = schema["name"]
            .as_str()
            .ok_or_else(|| SyncError::index_status("Schema is missing a name", 400))?;
        let mut collections = self.collections.write().await;
        if collections.contains_key(name) {
            return Err(SyncError::index_status(
                format!("A collection with name {} already exists", name),
                409,
            ));
        }
        collections.insert(name.to_string(), Collection::new());
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        match self.collections.write().await.remove(name) {
            Some(_) => Ok(()),
            None => Err(SyncError::not_found(name)),
        }
    }

    async fn upsert_document(&self, collection: &str, record: &IndexRecord) -> Result<()> {
        if self.plan.read().await.fail_upserts {
            return Err(SyncError::index("Upsert rejected"));
        }
        trace!(collection, id = ?record.id(), "Upsert");
        self.store(collection, record.clone()).await
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<()> {
        if self.plan.read().await.fail_deletes {
            return Err(SyncError::index_status("Delete rejected", 500));
        }
        let mut collections = self.collections.write().await;
        match collections.get_mut(collection).and_then(|c| c.remove(id)) {
            Some(_) => Ok(()),
            None => Err(SyncError::not_found(format!("{}/{}", collection, id))),
        }
    }

    async fn import_documents(
        &self,
        collection: &str,
        records: &[IndexRecord],
        _action: ImportAction,
    ) -> Result<ImportOutcome> {
        let call = self.import_calls.fetch_add(1, Ordering::SeqCst) + 1;

        let rejected = {
            let mut plan = self.plan.write().await;
            if plan.transient_import_failures > 0 {
                plan.transient_import_failures -= 1;
                return Err(SyncError::index_status("Service unavailable", 503));
            }
            if plan.failing_imports.contains(&call) {
                return Err(SyncError::index_status(
                    format!("Import call {} rejected", call),
                    400,
                ));
            }
            plan.rejected_ids.clone()
        };

        let mut results = Vec::with_capacity(records.len());
        for record in records {
            let id = record.id().map(str::to_string);
            match id {
                Some(ref id) if rejected.contains(id) => {
                    results.push(DocumentOutcome::failed(Some(id.clone()), "Document rejected"));
                }
                Some(id) => {
                    self.store(collection, record.clone()).await?;
                    results.push(DocumentOutcome::ok(id));
                }
                None => results.push(DocumentOutcome::failed(None, "Document is missing an id")),
            }
        }
        Ok(ImportOutcome::new(results, 0))
    }
}
