//! Batch synchronizer
//!
//! Pages through one collection (or collection group) with a cursor and
//! bulk-imports each page. Import failures are recorded per page and never
//! stop pagination.

use crate::retry::RetryPolicy;
use crate::transfer::DocumentTransfer;
use docsync_core::prelude::*;
use docsync_core::{
    path_segments, BatchConfig, BatchError, CollectionRoute, ImportAction, LatencyTimer,
    MatchMode, SyncMetrics, DOC_ID_PARAM,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Full-collection sync through paged bulk imports
pub struct BatchSynchronizer {
    store: Arc<dyn SourceStore>,
    index: Arc<dyn IndexClient>,
    transfer: Arc<DocumentTransfer>,
    batch_size: usize,
    max_pages: usize,
    retry: RetryPolicy,
    metrics: SyncMetrics,
}

impl BatchSynchronizer {
    pub fn new(
        store: Arc<dyn SourceStore>,
        index: Arc<dyn IndexClient>,
        transfer: Arc<DocumentTransfer>,
        batch: &BatchConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            index,
            transfer,
            batch_size: batch.size.max(1),
            max_pages: batch.max_pages.max(1),
            retry,
            metrics: SyncMetrics::new("batch"),
        }
    }

    /// Sync every document under `override_path`, or the route's own pattern
    ///
    /// Read and import failures are recorded in the result; pagination ends
    /// at a failed read and continues past a failed import.
    pub async fn sync_collection(
        &self,
        route: &CollectionRoute,
        override_path: Option<&str>,
    ) -> BatchRunResult {
        let path = override_path.unwrap_or(route.pattern().as_str());
        let query = CollectionQuery::for_path(path);
        let target = route.target();
        let fields = match route.fields() {
            [] => "all".to_string(),
            named => named.join(","),
        };

        info!(path, collection = target, query = %query, fields = %fields, "Syncing collection");

        let mut result = BatchRunResult::new();
        let mut cursor: Option<SourceDocument> = None;
        let mut pages = 0usize;

        loop {
            let timer = LatencyTimer::start(|d| self.metrics.record_page_fetch_latency(d));
            let fetched = self
                .store
                .query_page(&query, cursor.as_ref(), self.batch_size)
                .await;
            timer.stop();

            let page = match fetched {
                Ok(page) => page,
                Err(e) => {
                    error!(path, collection = target, page = pages + 1, error = %e, "Failed to read page");
                    result.push_error(BatchError::new(
                        target,
                        cursor.as_ref().map(|d| d.id.as_str()),
                        None,
                        format!("Failed to read page {}: {}", pages + 1, e),
                    ));
                    break;
                }
            };

            if page.is_empty() {
                break;
            }

            // A non-empty page past the cap is left unimported
            if pages >= self.max_pages {
                let err = SyncError::PageLimitExceeded {
                    collection: path.to_string(),
                    pages,
                };
                warn!(path, collection = target, pages, "Stopping pagination at page limit");
                result.push_error(BatchError::new(
                    target,
                    page.first().map(|d| d.id.as_str()),
                    page.last().map(|d| d.id.as_str()),
                    err.to_string(),
                ));
                break;
            }
            pages += 1;
            let fetched = page.len();

            let records = self.convert_page(&page, route, query.is_group());
            let skipped = fetched - records.len();
            if skipped > 0 {
                debug!(path, skipped, "Skipped documents outside the route pattern");
                self.metrics.record_skipped(skipped as u64, target);
                result.add_skipped(skipped);
            }

            cursor = page.into_iter().last();
            if !records.is_empty() {
                let last_id = cursor.as_ref().map(|d| d.id.as_str());
                self.import_page(target, &records, last_id, &mut result).await;
            }

            if fetched < self.batch_size {
                break;
            }
            tokio::task::yield_now().await;
        }

        info!(
            path,
            collection = target,
            documents = result.documents_processed,
            skipped = result.documents_skipped,
            errors = result.errors.len(),
            pages,
            "Done syncing collection"
        );
        result.finish()
    }

    /// Convert one page, dropping group-query hits outside the route pattern
    fn convert_page(
        &self,
        page: &[SourceDocument],
        route: &CollectionRoute,
        group: bool,
    ) -> Vec<IndexRecord> {
        page.iter()
            .filter_map(|doc| {
                let collection = doc.collection_path();
                let segments = path_segments(&collection);
                let matched = route.pattern().match_segments(&segments, MatchMode::Exact);
                if group && matched.is_none() {
                    return None;
                }
                let mut params = matched.unwrap_or_default();
                params.insert(DOC_ID_PARAM, doc.id.clone());

                let record = self.transfer.convert(doc, route, &params);
                self.transfer.log_record("import", &record, route.target());
                Some(record)
            })
            .collect()
    }

    /// Submit one page, retrying retryable transport failures
    async fn import_page(
        &self,
        target: &str,
        records: &[IndexRecord],
        last_id: Option<&str>,
        result: &mut BatchRunResult,
    ) {
        let first_id = records.first().and_then(IndexRecord::id);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let timer = LatencyTimer::start(|d| self.metrics.record_import_latency(d));
            let outcome = self
                .index
                .import_documents(target, records, ImportAction::Upsert)
                .await;
            timer.stop();

            match outcome {
                Ok(outcome) => {
                    result.add_processed(records.len());
                    self.metrics
                        .record_imported(outcome.success_count() as u64, target);

                    if outcome.is_complete_success() {
                        self.metrics.record_import_request("ok");
                        info!(
                            collection = target,
                            imported = records.len(),
                            total = result.documents_processed,
                            "Imported documents"
                        );
                        return;
                    }

                    let failures = outcome.failures();
                    for failure in &failures {
                        error!(
                            collection = target,
                            id = ?failure.id,
                            error = %failure.error,
                            "Error importing document"
                        );
                    }
                    self.metrics.record_import_request("partial");
                    self.metrics.record_failed(failures.len() as u64, target);
                    result.push_error(
                        BatchError::new(
                            target,
                            first_id,
                            last_id,
                            format!(
                                "{} of {} documents failed to import",
                                failures.len(),
                                records.len()
                            ),
                        )
                        .with_failures(failures),
                    );
                    return;
                }
                Err(e) if e.is_retryable() && self.retry.should_retry(attempt) => {
                    let delay = self.retry.delay(attempt);
                    warn!(
                        collection = target,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Import failed, retrying"
                    );
                    self.metrics.record_retry();
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    let e = if attempt > 1 {
                        SyncError::retry_exhausted(attempt, &e)
                    } else {
                        e
                    };
                    error!(
                        collection = target,
                        first = ?first_id,
                        last = ?last_id,
                        attempts = attempt,
                        error = %e,
                        "Import error in a batch of documents"
                    );
                    self.metrics.record_import_request("error");
                    result.push_error(BatchError::new(target, first_id, last_id, e.to_string()));
                    return;
                }
            }
        }
    }
}
