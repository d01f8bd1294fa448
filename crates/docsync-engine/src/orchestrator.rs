//! Sync orchestrator
//!
//! Expands a run request into per-item work, isolates each item's failure
//! and aggregates the run report.

use crate::batch::BatchSynchronizer;
use crate::transfer::DocumentTransfer;
use chrono::{DateTime, Utc};
use docsync_core::prelude::*;
use docsync_core::{CollectionReport, PathReport, SyncMetrics};
use std::sync::Arc;
use tracing::{error, info, warn};

const NO_ROUTES: &str = "No collection configuration found";

/// Runs full or path-scoped syncs over a fixed route table
pub struct SyncOrchestrator {
    routes: Arc<RouteTable>,
    store: Arc<dyn SourceStore>,
    transfer: Arc<DocumentTransfer>,
    batch: Arc<BatchSynchronizer>,
    metrics: SyncMetrics,
}

impl SyncOrchestrator {
    pub fn new(
        routes: Arc<RouteTable>,
        store: Arc<dyn SourceStore>,
        transfer: Arc<DocumentTransfer>,
        batch: Arc<BatchSynchronizer>,
    ) -> Self {
        Self {
            routes,
            store,
            transfer,
            batch,
            metrics: SyncMetrics::new("orchestrator"),
        }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub async fn run(&self, target: SyncTarget) -> SyncRunReport {
        self.run_from(target, Utc::now()).await
    }

    /// Run with a caller-supplied start time
    pub async fn run_from(&self, target: SyncTarget, started_at: DateTime<Utc>) -> SyncRunReport {
        let mut report = SyncRunReport::started_at(started_at);

        match target {
            SyncTarget::Paths(paths) => {
                info!(run_id = %report.run_id, paths = paths.len(), "Starting path sync");
                for path in &paths {
                    report.record_path(self.sync_path(path).await);
                }
            }
            SyncTarget::All => {
                info!(run_id = %report.run_id, routes = self.routes.len(), "Starting full sync");
                if self.routes.is_empty() {
                    error!(run_id = %report.run_id, "No collection configuration found");
                    report.record_run_error(NO_ROUTES);
                }
                for route in self.routes.routes() {
                    let pattern = route.pattern().as_str();
                    let result = self.batch.sync_collection(route, None).await;
                    if !result.success {
                        error!(
                            collection = pattern,
                            errors = result.errors.len(),
                            "Collection synced with errors"
                        );
                    }
                    report.record_collection(CollectionReport::batch(pattern, route.target(), result));
                }
            }
        }

        let report = report.finish();
        self.metrics.record_run(
            if report.success { "ok" } else { "errors" },
            report.total_errors,
        );
        info!(
            run_id = %report.run_id,
            documents = report.total_documents,
            errors = report.total_errors,
            duration = report.duration.as_deref().unwrap_or_default(),
            success = report.success,
            "Sync run finished"
        );
        report
    }

    async fn sync_path(&self, raw: &str) -> PathReport {
        let path = raw.trim();
        if path.is_empty() {
            warn!("Skipping empty path");
            return PathReport::failed(raw, "Empty path");
        }

        let Some(found) = self.routes.resolve(path) else {
            let err = SyncError::NoMatchingRoute {
                path: path.to_string(),
            };
            warn!(path, "No route for path");
            return PathReport::failed(path, err.to_string());
        };

        match found.kind {
            PathKind::Document => self
                .sync_single(path, found.route, &found.params)
                .await
                .map(|id| PathReport::document(path, id))
                .unwrap_or_else(|e| {
                    error!(path, error = %e, "Error syncing path");
                    PathReport::failed(path, e.to_string())
                }),
            PathKind::Collection => {
                let result = self.batch.sync_collection(found.route, Some(path)).await;
                PathReport::batch(path, result)
            }
        }
    }

    async fn sync_single(
        &self,
        path: &str,
        route: &docsync_core::CollectionRoute,
        params: &MatchParams,
    ) -> Result<String> {
        let doc = self
            .store
            .get_document(path)
            .await?
            .ok_or_else(|| SyncError::DocumentNotFound {
                path: path.to_string(),
            })?;
        self.transfer.upsert(&doc, route, params).await?;
        info!(path, collection = route.target(), "Synced document");
        Ok(doc.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryIndex;
    use crate::retry::RetryPolicy;
    use crate::store::MemoryStore;
    use docsync_core::{BatchConfig, CollectionRoute, FieldMap, RecordConfig};
    use serde_json::{json, Value};

    fn fields(value: Value) -> FieldMap {
        match value {
            Value::Object(map) => map,
            _ => FieldMap::new(),
        }
    }

    fn orchestrator(
        routes: Vec<CollectionRoute>,
        store: MemoryStore,
        records: RecordConfig,
    ) -> (SyncOrchestrator, Arc<MemoryIndex>) {
        paged_orchestrator(routes, store, records, BatchConfig::default())
    }

    fn paged_orchestrator(
        routes: Vec<CollectionRoute>,
        store: MemoryStore,
        records: RecordConfig,
        batch: BatchConfig,
    ) -> (SyncOrchestrator, Arc<MemoryIndex>) {
        let store: Arc<MemoryStore> = Arc::new(store);
        let index = Arc::new(MemoryIndex::new());
        let transfer = Arc::new(DocumentTransfer::new(index.clone(), &records));
        let batch = Arc::new(BatchSynchronizer::new(
            store.clone(),
            index.clone(),
            transfer.clone(),
            &batch,
            RetryPolicy::none(),
        ));
        let orchestrator =
            SyncOrchestrator::new(Arc::new(RouteTable::new(routes)), store, transfer, batch);
        (orchestrator, index)
    }

    fn seeded() -> MemoryStore {
        MemoryStore::with_documents([
            ("users/u1", fields(json!({"name": "Ann"}))),
            ("users/u2", fields(json!({"name": "Bo"}))),
            ("products/p1", fields(json!({"title": "Lamp"}))),
        ])
        .unwrap()
    }

    fn routes() -> Vec<CollectionRoute> {
        vec![
            CollectionRoute::new("users", "users_index", vec![]),
            CollectionRoute::new("products", "products_index", vec![]),
        ]
    }

    #[tokio::test]
    async fn test_full_sync_covers_every_route() {
        let (orchestrator, index) = orchestrator(routes(), seeded(), RecordConfig::default());
        let report = orchestrator.run(SyncTarget::All).await;

        assert!(report.success);
        assert_eq!(report.total_documents, 3);
        assert_eq!(report.collections.len(), 2);
        assert_eq!(report.collections[0].target_collection, "users_index");
        assert_eq!(index.count("users_index").await, 2);
        assert_eq!(index.count("products_index").await, 1);
        assert!(report.duration.is_some());
    }

    #[tokio::test]
    async fn test_failed_items_are_isolated() {
        let (orchestrator, index) = orchestrator(routes(), seeded(), RecordConfig::default());
        let report = orchestrator
            .run(SyncTarget::Paths(vec![
                "users".into(),
                "unknown/x".into(),
                " products/p1 ".into(),
            ]))
            .await;

        assert!(!report.success);
        assert_eq!(report.total_errors, 1);
        assert_eq!(report.total_documents, 3);
        assert!(report.paths[1]
            .error
            .as_deref()
            .unwrap()
            .contains("does not match any configured collection"));
        assert_eq!(report.paths[2].path, "products/p1");
        assert_eq!(report.paths[2].document_id.as_deref(), Some("p1"));
        assert_eq!(index.count("products_index").await, 1);
    }

    #[tokio::test]
    async fn test_empty_and_missing_paths() {
        let (orchestrator, _) = orchestrator(routes(), seeded(), RecordConfig::default());
        let report = orchestrator
            .run(SyncTarget::Paths(vec!["  ".into(), "users/nobody".into()]))
            .await;

        assert_eq!(report.total_errors, 2);
        assert_eq!(report.paths[0].error.as_deref(), Some("Empty path"));
        assert!(report.paths[1]
            .error
            .as_deref()
            .unwrap()
            .contains("does not exist"));
    }

    #[tokio::test]
    async fn test_named_wildcards_reach_the_record() {
        let store = MemoryStore::with_documents([(
            "tenants/acme/projects/apollo/tasks/t1",
            fields(json!({"title": "Launch"})),
        )])
        .unwrap();
        let (orchestrator, index) = orchestrator(
            vec![CollectionRoute::new(
                "tenants/{tenantId}/projects/{projectId}/tasks",
                "tasks_index",
                vec![],
            )],
            store,
            RecordConfig {
                include_path_params: true,
                ..Default::default()
            },
        );

        let report = orchestrator
            .run(SyncTarget::Paths(vec![
                "tenants/acme/projects/apollo/tasks/t1".into(),
            ]))
            .await;

        assert!(report.success);
        let record = index.get("tasks_index", "t1").await.unwrap();
        assert_eq!(record.get("tenantId"), Some(&json!("acme")));
        assert_eq!(record.get("projectId"), Some(&json!("apollo")));
        assert_eq!(record.get("title"), Some(&json!("Launch")));
    }

    #[tokio::test]
    async fn test_no_routes_is_a_run_error() {
        let (orchestrator, _) = orchestrator(vec![], seeded(), RecordConfig::default());
        let report = orchestrator.run(SyncTarget::All).await;

        assert!(!report.success);
        assert_eq!(report.total_errors, 1);
        assert_eq!(report.error.as_deref(), Some(NO_ROUTES));
    }

    #[tokio::test]
    async fn test_collection_query_failure_counts_once() {
        let store = seeded();
        store.set_fail_queries(true);
        let (orchestrator, _) = orchestrator(routes(), store, RecordConfig::default());
        let report = orchestrator.run(SyncTarget::All).await;

        assert_eq!(report.total_errors, 2);
        assert!(report.collections.iter().all(|c| c.errors.len() == 1));
    }

    #[tokio::test]
    async fn test_path_read_failure_keeps_imported_pages() {
        let store = MemoryStore::with_documents((0..25).map(|i| {
            (format!("users/u{:04}", i), fields(json!({"n": i})))
        }))
        .unwrap();
        store.fail_queries_from(3);
        let (orchestrator, index) = paged_orchestrator(
            routes(),
            store,
            RecordConfig::default(),
            BatchConfig {
                size: 10,
                max_pages: 100,
            },
        );

        let report = orchestrator
            .run(SyncTarget::Paths(vec!["users".into()]))
            .await;

        assert!(!report.success);
        assert_eq!(report.total_documents, 20);
        assert_eq!(report.total_errors, 1);
        assert_eq!(report.paths[0].documents_processed, 20);
        assert!(report.paths[0].error.is_none());
        assert!(report.paths[0].errors[0].error.starts_with("Failed to read page 3"));
        assert_eq!(index.count("users_index").await, 20);
    }

    #[tokio::test]
    async fn test_group_skips_reach_the_run_totals() {
        let store = MemoryStore::with_documents([
            ("products/p1/reviews/r1", FieldMap::new()),
            ("archive/x/reviews/r2", FieldMap::new()),
        ])
        .unwrap();
        let (orchestrator, _) = orchestrator(
            vec![CollectionRoute::new("products/*/reviews", "reviews_index", vec![])],
            store,
            RecordConfig::default(),
        );

        let report = orchestrator.run(SyncTarget::All).await;

        assert!(report.success);
        assert_eq!(report.total_documents, 1);
        assert_eq!(report.total_skipped, 1);
        assert_eq!(report.collections[0].documents_skipped, 1);
    }
}
