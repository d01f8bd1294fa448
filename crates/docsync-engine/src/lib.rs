//! # docsync engine
//!
//! Runs syncs from a document store into a search index.
//!
//! ## Components
//!
//! - `DocumentTransfer`: convert and write one document
//! - `BatchSynchronizer`: paged bulk import of a collection
//! - `SyncOrchestrator`: full or path-scoped runs with per-item isolation
//! - `AutomaticSync` / `ManualSync`: write and request triggers
//! - `ScheduledSync`: cron-driven sync requests
//!
//! `MemoryStore` and `MemoryIndex` are in-memory collaborators used by the
//! CLI snapshot mode and the tests.

pub mod batch;
pub mod index;
pub mod orchestrator;
pub mod retry;
pub mod schedule;
pub mod store;
pub mod transfer;
pub mod trigger;

pub use batch::*;
pub use index::*;
pub use orchestrator::*;
pub use retry::*;
pub use schedule::*;
pub use store::*;
pub use transfer::*;
pub use trigger::*;

use docsync_core::prelude::*;
use docsync_core::auto_schema;
use std::sync::Arc;
use tracing::{info, warn};

/// Every handler wired over one store, one index and one configuration
pub struct SyncService {
    config: Arc<SyncConfig>,
    routes: Arc<RouteTable>,
    index: Arc<dyn IndexClient>,
    orchestrator: Arc<SyncOrchestrator>,
    automatic: AutomaticSync,
    manual: Arc<ManualSync>,
}

impl SyncService {
    pub fn new(
        config: Arc<SyncConfig>,
        store: Arc<dyn SourceStore>,
        index: Arc<dyn IndexClient>,
    ) -> Self {
        let routes = Arc::new(RouteTable::from_config(&config));
        let transfer = Arc::new(DocumentTransfer::new(index.clone(), &config.records));
        let batch = Arc::new(BatchSynchronizer::new(
            store.clone(),
            index.clone(),
            transfer.clone(),
            &config.batch,
            RetryPolicy::from(&config.retry),
        ));
        let orchestrator = Arc::new(SyncOrchestrator::new(
            routes.clone(),
            store.clone(),
            transfer.clone(),
            batch,
        ));
        let automatic = AutomaticSync::new(routes.clone(), store.clone(), transfer);
        let manual = Arc::new(ManualSync::new(
            orchestrator.clone(),
            store,
            config.trigger.manual_sync_collection.clone(),
        ));

        info!(
            routes = routes.len(),
            batch_size = config.batch.size,
            "Sync service ready"
        );
        Self {
            config,
            routes,
            index,
            orchestrator,
            automatic,
            manual,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }

    pub fn automatic(&self) -> &AutomaticSync {
        &self.automatic
    }

    pub fn manual(&self) -> &Arc<ManualSync> {
        &self.manual
    }

    pub async fn run(&self, target: SyncTarget) -> SyncRunReport {
        self.orchestrator.run(target).await
    }

    /// Scheduled sync over the configured request collection
    pub fn scheduled(&self, store: Arc<dyn SourceStore>) -> Result<ScheduledSync> {
        let schedule = SyncSchedule::from_config(&self.config.schedule)?;
        Ok(ScheduledSync::new(
            store,
            self.config.trigger.manual_sync_collection.clone(),
            schedule,
        )
        .with_manual_sync(self.manual.clone()))
    }

    /// Create every target collection with an auto-detect schema
    ///
    /// Collections that already exist are left alone.
    pub async fn create_collections(&self) -> Result<usize> {
        let mut created = 0;
        for route in self.routes.routes() {
            match self.index.create_collection(&auto_schema(route.target())).await {
                Ok(()) => {
                    info!(collection = route.target(), "Created index collection");
                    created += 1;
                }
                Err(SyncError::Index {
                    status: Some(409), ..
                }) => {
                    warn!(collection = route.target(), "Index collection already exists");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(created)
    }
}
