//! Document transfer unit
//!
//! Converts one source document and writes it to the index with a single
//! call. Retries belong to callers.

use docsync_core::prelude::*;
use docsync_core::{
    projector_for, CollectionRoute, ErrorContext, ErrorContextExt, FieldProjector, RecordConfig,
    RecordOptions, SyncMetrics, DOC_ID_PARAM,
};
use std::sync::Arc;
use tracing::debug;

/// What a single-document sync did
#[derive(Debug, Clone, PartialEq)]
pub enum TransferOutcome {
    Upserted { target: String, record: IndexRecord },
    Deleted { target: String, id: String },
}

/// Converts and writes single documents
pub struct DocumentTransfer {
    index: Arc<dyn IndexClient>,
    projector: Box<dyn FieldProjector>,
    options: RecordOptions,
    log_full_records: bool,
    metrics: SyncMetrics,
}

impl DocumentTransfer {
    pub fn new(index: Arc<dyn IndexClient>, config: &RecordConfig) -> Self {
        Self {
            index,
            projector: projector_for(config),
            options: RecordOptions::from(config),
            log_full_records: config.log_full_records,
            metrics: SyncMetrics::new("transfer"),
        }
    }

    /// Pure conversion for the given route and captures
    pub fn convert(
        &self,
        doc: &SourceDocument,
        route: &CollectionRoute,
        params: &MatchParams,
    ) -> IndexRecord {
        IndexRecord::from_source(doc, route, params, &self.options, self.projector.as_ref())
    }

    /// Debug-log a record about to be written
    pub fn log_record(&self, action: &str, record: &IndexRecord, target: &str) {
        if self.log_full_records {
            let body = serde_json::to_string(record).unwrap_or_default();
            debug!(action, collection = target, record = %body, "Writing document");
        } else {
            debug!(action, collection = target, id = ?record.id(), "Writing document");
        }
    }

    /// Convert and upsert one document
    pub async fn upsert(
        &self,
        doc: &SourceDocument,
        route: &CollectionRoute,
        params: &MatchParams,
    ) -> Result<IndexRecord> {
        let record = self.convert(doc, route, params);
        self.log_record("upsert", &record, route.target());

        let result = self
            .index
            .upsert_document(route.target(), &record)
            .await
            .with_context(
                ErrorContext::new("transfer", "upsert")
                    .document(doc.id.clone())
                    .collection(route.target())
                    .path(doc.path.clone()),
            );
        self.metrics
            .record_document_write("upsert", if result.is_ok() { "ok" } else { "error" });
        result.map(|()| record)
    }

    /// Delete one document; an id the index does not know counts as deleted
    pub async fn delete(&self, route: &CollectionRoute, id: &str) -> Result<()> {
        debug!(collection = route.target(), id, "Deleting document");
        match self.index.delete_document(route.target(), id).await {
            Ok(()) => {
                self.metrics.record_document_write("delete", "ok");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!(collection = route.target(), id, "Document not in index, skipping delete");
                self.metrics.record_document_write("delete", "not_found");
                Ok(())
            }
            Err(e) => {
                self.metrics.record_document_write("delete", "error");
                Err::<(), _>(e).with_context(
                    ErrorContext::new("transfer", "delete")
                        .document(id)
                        .collection(route.target()),
                )
            }
        }
    }

    /// Upsert the post-image, or delete when it is absent
    pub async fn sync_document(
        &self,
        path: &str,
        after: Option<&SourceDocument>,
        route: &CollectionRoute,
        params: &MatchParams,
    ) -> Result<TransferOutcome> {
        match after {
            Some(doc) => {
                let record = self.upsert(doc, route, params).await?;
                Ok(TransferOutcome::Upserted {
                    target: route.target().to_string(),
                    record,
                })
            }
            None => {
                let id = delete_id(path, params);
                self.delete(route, &id).await?;
                Ok(TransferOutcome::Deleted {
                    target: route.target().to_string(),
                    id,
                })
            }
        }
    }
}

/// The `docId` capture, else the last path segment
fn delete_id(path: &str, params: &MatchParams) -> String {
    params
        .get(DOC_ID_PARAM)
        .map(str::to_string)
        .or_else(|| docsync_core::path_segments(path).last().map(|s| s.to_string()))
        .unwrap_or_default()
}
