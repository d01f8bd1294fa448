//! Trigger handlers
//!
//! `AutomaticSync` mirrors single-document writes into the index.
//! `ManualSync` serves sync requests recorded in the trigger collection and
//! writes run metadata back onto the request record.

use crate::orchestrator::SyncOrchestrator;
use crate::transfer::{DocumentTransfer, TransferOutcome};
use chrono::Utc;
use docsync_core::prelude::*;
use docsync_core::{ErrorContext, ErrorContextExt, FieldMap, RunMetadata};
use std::sync::Arc;
use tracing::{debug, error, info};

// ============================================================================
// Automatic sync
// ============================================================================

/// A create, update or delete on one source document
#[derive(Debug, Clone, PartialEq)]
pub struct WriteEvent {
    pub path: String,
    pub before: Option<FieldMap>,
    pub after: Option<FieldMap>,
}

impl WriteEvent {
    pub fn created(path: impl Into<String>, after: FieldMap) -> Self {
        Self {
            path: path.into(),
            before: None,
            after: Some(after),
        }
    }

    pub fn updated(path: impl Into<String>, before: FieldMap, after: FieldMap) -> Self {
        Self {
            path: path.into(),
            before: Some(before),
            after: Some(after),
        }
    }

    pub fn deleted(path: impl Into<String>, before: FieldMap) -> Self {
        Self {
            path: path.into(),
            before: Some(before),
            after: None,
        }
    }
}

/// What the automatic handler did with an event
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    /// No route covers the path
    Skipped,
    Synced(TransferOutcome),
}

/// Per-write sync of routed documents
pub struct AutomaticSync {
    routes: Arc<RouteTable>,
    store: Arc<dyn SourceStore>,
    transfer: Arc<DocumentTransfer>,
}

impl AutomaticSync {
    pub fn new(
        routes: Arc<RouteTable>,
        store: Arc<dyn SourceStore>,
        transfer: Arc<DocumentTransfer>,
    ) -> Self {
        Self {
            routes,
            store,
            transfer,
        }
    }

    pub async fn handle(&self, event: &WriteEvent) -> Result<WriteOutcome> {
        let found = match self.routes.resolve(&event.path) {
            Some(found) if found.kind == PathKind::Document => found,
            _ => {
                debug!(path = %event.path, "No route for written document, skipping");
                return Ok(WriteOutcome::Skipped);
            }
        };

        let latest = match event.after {
            None => None,
            // The store may hold a newer version than the event carried
            Some(ref after) => Some(
                self.store
                    .get_document(&event.path)
                    .await?
                    .unwrap_or_else(|| SourceDocument::new(event.path.clone(), after.clone())),
            ),
        };

        let outcome = self
            .transfer
            .sync_document(&event.path, latest.as_ref(), found.route, &found.params)
            .await?;
        info!(path = %event.path, collection = found.route.target(), "Applied document write");
        Ok(WriteOutcome::Synced(outcome))
    }
}

// ============================================================================
// Manual sync
// ============================================================================

/// Serves sync requests from the trigger collection
pub struct ManualSync {
    orchestrator: Arc<SyncOrchestrator>,
    store: Arc<dyn SourceStore>,
    collection: String,
}

impl ManualSync {
    pub fn new(
        orchestrator: Arc<SyncOrchestrator>,
        store: Arc<dyn SourceStore>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            orchestrator,
            store,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Run the sync a newly created request record asks for
    ///
    /// Item failures end up in the report. `Err` means the request record
    /// could not be updated; a `failed` status is written when possible.
    pub async fn handle(&self, request_id: &str, fields: &FieldMap) -> Result<SyncRunReport> {
        let record_path = format!("{}/{}", self.collection, request_id);
        let request = SyncRequest::from_fields(fields);
        let started_at = Utc::now();

        info!(
            request = request_id,
            paths = ?request.paths,
            scheduled = request.scheduled_sync,
            "Manual sync requested"
        );

        if let Err(e) = self
            .write(&record_path, &RunMetadata::in_progress(started_at))
            .await
        {
            return Err(self.fail(&record_path, started_at, e, None).await);
        }

        let report = self.orchestrator.run_from(request.target(), started_at).await;

        if let Err(e) = self
            .write(&record_path, &RunMetadata::completed(report.clone()))
            .await
        {
            return Err(self.fail(&record_path, started_at, e, Some(report)).await);
        }

        info!(
            request = request_id,
            documents = report.total_documents,
            errors = report.total_errors,
            "Manual sync completed"
        );
        Ok(report)
    }

    async fn write(&self, record_path: &str, metadata: &RunMetadata) -> Result<()> {
        let fields = metadata.to_fields()?;
        self.store
            .update_document(record_path, fields)
            .await
            .with_context(
                ErrorContext::new("manual_sync", "write_metadata")
                    .path(record_path)
                    .collection(self.collection.clone()),
            )
    }

    /// Best-effort `failed` status; returns the original error
    async fn fail(
        &self,
        record_path: &str,
        started_at: chrono::DateTime<Utc>,
        err: SyncError,
        partial: Option<SyncRunReport>,
    ) -> SyncError {
        error!(path = record_path, error = %err, "Manual sync failed");
        let metadata = RunMetadata::failed(started_at, err.to_string(), partial);
        if let Err(e) = self.write(record_path, &metadata).await {
            error!(path = record_path, error = %e, "Failed to record sync failure");
        }
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchSynchronizer;
    use crate::index::MemoryIndex;
    use crate::retry::RetryPolicy;
    use crate::store::MemoryStore;
    use docsync_core::{BatchConfig, CollectionRoute, RecordConfig};
    use serde_json::{json, Value};

    fn fields(value: Value) -> FieldMap {
        match value {
            Value::Object(map) => map,
            _ => FieldMap::new(),
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        index: Arc<MemoryIndex>,
        automatic: AutomaticSync,
        manual: ManualSync,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(
            MemoryStore::with_documents([
                ("users/u1", fields(json!({"name": "Ann"}))),
                ("users/u2", fields(json!({"name": "Bo"}))),
                ("typesense_manual_sync/req1", FieldMap::new()),
            ])
            .unwrap(),
        );
        let index = Arc::new(MemoryIndex::new());
        let routes = Arc::new(RouteTable::new(vec![CollectionRoute::new(
            "users",
            "users_index",
            vec![],
        )]));
        let transfer = Arc::new(DocumentTransfer::new(index.clone(), &RecordConfig::default()));
        let batch = Arc::new(BatchSynchronizer::new(
            store.clone(),
            index.clone(),
            transfer.clone(),
            &BatchConfig::default(),
            RetryPolicy::none(),
        ));
        let orchestrator = Arc::new(SyncOrchestrator::new(
            routes.clone(),
            store.clone(),
            transfer.clone(),
            batch,
        ));
        Fixture {
            automatic: AutomaticSync::new(routes, store.clone(), transfer),
            manual: ManualSync::new(orchestrator, store.clone(), "typesense_manual_sync"),
            store,
            index,
        }
    }

    #[tokio::test]
    async fn test_write_is_upserted_from_latest_store_version() {
        let f = fixture();
        let event = WriteEvent::created("users/u1", fields(json!({"name": "stale"})));

        let outcome = f.automatic.handle(&event).await.unwrap();

        assert!(matches!(outcome, WriteOutcome::Synced(TransferOutcome::Upserted { .. })));
        let record = f.index.get("users_index", "u1").await.unwrap();
        assert_eq!(record.get("name"), Some(&json!("Ann")));
    }

    #[tokio::test]
    async fn test_vanished_document_falls_back_to_event() {
        let f = fixture();
        let event = WriteEvent::created("users/u9", fields(json!({"name": "Cy"})));
        f.automatic.handle(&event).await.unwrap();

        let record = f.index.get("users_index", "u9").await.unwrap();
        assert_eq!(record.get("name"), Some(&json!("Cy")));
    }

    #[tokio::test]
    async fn test_delete_removes_record() {
        let f = fixture();
        f.automatic
            .handle(&WriteEvent::created("users/u1", FieldMap::new()))
            .await
            .unwrap();

        let outcome = f
            .automatic
            .handle(&WriteEvent::deleted("users/u1", FieldMap::new()))
            .await
            .unwrap();

        assert!(matches!(outcome, WriteOutcome::Synced(TransferOutcome::Deleted { .. })));
        assert_eq!(f.index.count("users_index").await, 0);
    }

    #[tokio::test]
    async fn test_failed_delete_is_returned() {
        let f = fixture();
        f.index.set_fail_deletes(true).await;
        let result = f
            .automatic
            .handle(&WriteEvent::deleted("users/u1", FieldMap::new()))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_unrouted_write_is_skipped() {
        let f = fixture();
        let outcome = f
            .automatic
            .handle(&WriteEvent::created("orders/o1", FieldMap::new()))
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Skipped);
        assert_eq!(f.index.import_calls(), 0);
    }

    #[tokio::test]
    async fn test_manual_sync_writes_completion_metadata() {
        let f = fixture();
        let report = f
            .manual
            .handle("req1", &fields(json!({"paths": ["users/u2"]})))
            .await
            .unwrap();

        assert!(report.success);
        let record = f
            .store
            .get_document("typesense_manual_sync/req1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.fields.get("syncStatus"), Some(&json!("completed")));
        assert_eq!(record.fields.get("syncError"), Some(&Value::Null));
        assert_eq!(record.fields["syncResults"]["totalDocuments"], json!(1));
        assert!(f.index.get("users_index", "u2").await.is_some());
    }

    #[tokio::test]
    async fn test_manual_sync_with_errors() {
        let f = fixture();
        let report = f
            .manual
            .handle("req1", &fields(json!({"paths": ["users", "nope/x"]})))
            .await
            .unwrap();

        assert_eq!(report.total_errors, 1);
        let record = f
            .store
            .get_document("typesense_manual_sync/req1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            record.fields.get("syncStatus"),
            Some(&json!("completed_with_errors"))
        );
        assert_eq!(
            record.fields.get("syncError"),
            Some(&json!("1 errors occurred during sync"))
        );
    }

    #[tokio::test]
    async fn test_metadata_write_failure_is_returned() {
        let f = fixture();
        f.store.set_fail_writes(true);
        let result = f.manual.handle("req1", &FieldMap::new()).await;
        assert!(result.is_err());
        assert_eq!(f.index.import_calls(), 0);
    }
}
