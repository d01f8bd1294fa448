//! Run results: batch outcomes, per-item reports and persisted run metadata

use crate::error::Result;
use crate::record::FieldMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Render a duration the way run metadata stores it, e.g. `3.2s`
pub fn format_duration(duration: Duration) -> String {
    format!("{:.1}s", duration.as_secs_f64())
}

// ============================================================================
// Batch results
// ============================================================================

/// One document rejected inside an accepted bulk import
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentFailure {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub error: String,
}

/// A failed page import, identified by its boundary document ids
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchError {
    /// Target index collection
    pub collection: String,
    /// `"<first id> to <last id>"`
    pub batch: String,
    pub error: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<DocumentFailure>,
}

impl BatchError {
    pub fn new(
        collection: impl Into<String>,
        first_id: Option<&str>,
        last_id: Option<&str>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            collection: collection.into(),
            batch: format!(
                "{} to {}",
                first_id.unwrap_or("undefined"),
                last_id.unwrap_or("undefined")
            ),
            error: error.into(),
            failures: Vec::new(),
        }
    }

    pub fn with_failures(mut self, failures: Vec<DocumentFailure>) -> Self {
        self.failures = failures;
        self
    }
}

/// Outcome of syncing one collection path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRunResult {
    pub success: bool,
    pub documents_processed: usize,
    /// Group-query hits outside the route pattern
    #[serde(default)]
    pub documents_skipped: usize,
    pub errors: Vec<BatchError>,
}

impl BatchRunResult {
    pub fn new() -> Self {
        Self {
            success: true,
            documents_processed: 0,
            documents_skipped: 0,
            errors: Vec::new(),
        }
    }

    pub fn add_processed(&mut self, count: usize) {
        self.documents_processed += count;
    }

    pub fn add_skipped(&mut self, count: usize) {
        self.documents_skipped += count;
    }

    pub fn push_error(&mut self, error: BatchError) {
        self.errors.push(error);
        self.success = false;
    }

    /// Seal the result; success iff no batch failed
    pub fn finish(mut self) -> Self {
        self.success = self.errors.is_empty();
        self
    }
}

impl Default for BatchRunResult {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Run reports
// ============================================================================

/// Result for one explicitly requested path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathReport {
    pub path: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default)]
    pub documents_processed: usize,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub documents_skipped: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<BatchError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PathReport {
    /// A single document synced
    pub fn document(path: impl Into<String>, document_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            success: true,
            document_id: Some(document_id.into()),
            documents_processed: 1,
            documents_skipped: 0,
            errors: Vec::new(),
            error: None,
        }
    }

    /// A collection path synced through the batch synchronizer
    pub fn batch(path: impl Into<String>, result: BatchRunResult) -> Self {
        Self {
            path: path.into(),
            success: result.success,
            document_id: None,
            documents_processed: result.documents_processed,
            documents_skipped: result.documents_skipped,
            errors: result.errors,
            error: None,
        }
    }

    /// A failure local to this path
    pub fn failed(path: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            success: false,
            document_id: None,
            documents_processed: 0,
            documents_skipped: 0,
            errors: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// Errors this item adds to the run total
    pub fn error_count(&self) -> usize {
        error_count(self.success, &self.errors)
    }
}

/// Result for one configured route synced in full
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionReport {
    /// Source pattern of the route
    pub collection: String,
    pub target_collection: String,
    pub success: bool,
    #[serde(default)]
    pub documents_processed: usize,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub documents_skipped: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<BatchError>,
}

impl CollectionReport {
    pub fn batch(
        collection: impl Into<String>,
        target_collection: impl Into<String>,
        result: BatchRunResult,
    ) -> Self {
        Self {
            collection: collection.into(),
            target_collection: target_collection.into(),
            success: result.success,
            documents_processed: result.documents_processed,
            documents_skipped: result.documents_skipped,
            errors: result.errors,
        }
    }

    pub fn error_count(&self) -> usize {
        error_count(self.success, &self.errors)
    }
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

fn error_count(success: bool, errors: &[BatchError]) -> usize {
    match (success, errors.len()) {
        (_, n) if n > 0 => n,
        (false, _) => 1,
        (true, _) => 0,
    }
}

/// Aggregate result of one sync run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRunReport {
    pub run_id: Uuid,
    pub paths: Vec<PathReport>,
    pub collections: Vec<CollectionReport>,
    pub total_documents: usize,
    #[serde(default)]
    pub total_skipped: usize,
    pub total_errors: usize,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    pub success: bool,
    /// Run-level failure, e.g. no routes configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncRunReport {
    pub fn start() -> Self {
        Self::started_at(Utc::now())
    }

    pub fn started_at(start_time: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            paths: Vec::new(),
            collections: Vec::new(),
            total_documents: 0,
            total_skipped: 0,
            total_errors: 0,
            start_time,
            end_time: None,
            duration: None,
            success: false,
            error: None,
        }
    }

    pub fn record_path(&mut self, report: PathReport) {
        self.total_documents += report.documents_processed;
        self.total_skipped += report.documents_skipped;
        self.total_errors += report.error_count();
        self.paths.push(report);
    }

    pub fn record_collection(&mut self, report: CollectionReport) {
        self.total_documents += report.documents_processed;
        self.total_skipped += report.documents_skipped;
        self.total_errors += report.error_count();
        self.collections.push(report);
    }

    /// Record a failure that is not tied to a path or collection
    pub fn record_run_error(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.total_errors += 1;
    }

    /// Stamp the end time; success iff no errors were counted
    pub fn finish(mut self) -> Self {
        let end = Utc::now();
        let elapsed = (end - self.start_time).to_std().unwrap_or_default();
        self.end_time = Some(end);
        self.duration = Some(format_duration(elapsed));
        self.success = self.total_errors == 0;
        self
    }
}

// ============================================================================
// Requests and run metadata
// ============================================================================

/// What a run synchronizes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncTarget {
    /// Every configured route, in declaration order
    All,
    /// Explicit collection or document paths
    Paths(Vec<String>),
}

/// A sync request record, as written to the manual-sync collection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paths: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub scheduled_sync: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_sync_cron_interval: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_sync_interval: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl SyncRequest {
    pub fn paths(paths: Vec<String>) -> Self {
        Self {
            paths: Some(paths),
            ..Default::default()
        }
    }

    /// Read a request from a trigger record
    ///
    /// A `paths` value that is not an array means "sync everything";
    /// non-string entries become empty paths and fail individually.
    pub fn from_fields(fields: &FieldMap) -> Self {
        let paths = match fields.get("paths") {
            Some(Value::Array(items)) => Some(
                items
                    .iter()
                    .map(|v| v.as_str().unwrap_or_default().to_string())
                    .collect(),
            ),
            _ => None,
        };
        let text = |key: &str| fields.get(key).and_then(Value::as_str).map(str::to_string);
        Self {
            paths,
            scheduled_sync: fields
                .get("scheduledSync")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            scheduled_sync_cron_interval: text("scheduledSyncCronInterval"),
            scheduled_sync_interval: text("scheduledSyncInterval"),
            created_at: text("createdAt"),
        }
    }

    pub fn to_fields(&self) -> Result<FieldMap> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Ok(FieldMap::new()),
        }
    }

    /// Absent or empty `paths` means every configured route
    pub fn target(&self) -> SyncTarget {
        match self.paths {
            Some(ref paths) if !paths.is_empty() => SyncTarget::Paths(paths.clone()),
            _ => SyncTarget::All,
        }
    }
}

/// Lifecycle status written back onto a sync request record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    InProgress,
    Completed,
    CompletedWithErrors,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::CompletedWithErrors => "completed_with_errors",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata merged onto a request record as a run progresses
///
/// `None` fields are written as explicit nulls so stale values from an
/// earlier run are cleared.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetadata {
    pub sync_status: SyncStatus,
    pub sync_started_at: DateTime<Utc>,
    pub sync_completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_duration: Option<String>,
    pub sync_results: Option<SyncRunReport>,
    pub sync_error: Option<String>,
}

impl RunMetadata {
    pub fn in_progress(started_at: DateTime<Utc>) -> Self {
        Self {
            sync_status: SyncStatus::InProgress,
            sync_started_at: started_at,
            sync_completed_at: None,
            sync_duration: None,
            sync_results: None,
            sync_error: None,
        }
    }

    /// Completion metadata for a finished report
    pub fn completed(report: SyncRunReport) -> Self {
        let status = if report.success {
            SyncStatus::Completed
        } else {
            SyncStatus::CompletedWithErrors
        };
        let error = (report.total_errors > 0)
            .then(|| format!("{} errors occurred during sync", report.total_errors));
        Self {
            sync_status: status,
            sync_started_at: report.start_time,
            sync_completed_at: report.end_time,
            sync_duration: report.duration.clone(),
            sync_error: error,
            sync_results: Some(report),
        }
    }

    pub fn failed(
        started_at: DateTime<Utc>,
        error: impl Into<String>,
        partial: Option<SyncRunReport>,
    ) -> Self {
        let end = Utc::now();
        let elapsed = (end - started_at).to_std().unwrap_or_default();
        Self {
            sync_status: SyncStatus::Failed,
            sync_started_at: started_at,
            sync_completed_at: Some(end),
            sync_duration: Some(format_duration(elapsed)),
            sync_results: partial,
            sync_error: Some(error.into()),
        }
    }

    pub fn to_fields(&self) -> Result<FieldMap> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Ok(FieldMap::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(3240)), "3.2s");
        assert_eq!(format_duration(Duration::ZERO), "0.0s");
    }

    #[test]
    fn test_batch_error_boundaries() {
        let err = BatchError::new("users_index", Some("a"), Some("z"), "boom");
        assert_eq!(err.batch, "a to z");
        let err = BatchError::new("users_index", None, Some("z"), "boom");
        assert_eq!(err.batch, "undefined to z");
    }

    #[test]
    fn test_batch_result_finish() {
        let mut result = BatchRunResult::new();
        result.add_processed(10);
        assert!(result.clone().finish().success);
        result.push_error(BatchError::new("c", Some("a"), Some("b"), "x"));
        let result = result.finish();
        assert!(!result.success);
        assert_eq!(result.documents_processed, 10);
    }

    #[test]
    fn test_report_totals() {
        let mut report = SyncRunReport::start();
        report.record_path(PathReport::document("users/u1", "u1"));
        report.record_path(PathReport::failed("nope", "Path does not match any configured collection"));
        let mut batch = BatchRunResult::new();
        batch.add_processed(5);
        batch.add_skipped(2);
        batch.push_error(BatchError::new("c", Some("a"), Some("b"), "x"));
        batch.push_error(BatchError::new("c", Some("c"), Some("d"), "y"));
        report.record_collection(CollectionReport::batch("things", "things_index", batch.finish()));

        let report = report.finish();
        assert_eq!(report.total_documents, 6);
        assert_eq!(report.total_skipped, 2);
        assert_eq!(report.total_errors, 3);
        assert!(!report.success);
        assert!(report.end_time.is_some());
        assert!(report.duration.as_deref().unwrap().ends_with('s'));
    }

    #[test]
    fn test_run_error_counts() {
        let mut report = SyncRunReport::start();
        report.record_run_error("No collection configuration found");
        let report = report.finish();
        assert_eq!(report.total_errors, 1);
        assert!(!report.success);
    }

    #[test]
    fn test_request_target() {
        assert_eq!(SyncRequest::default().target(), SyncTarget::All);
        assert_eq!(SyncRequest::paths(vec![]).target(), SyncTarget::All);
        assert_eq!(
            SyncRequest::paths(vec!["users".into()]).target(),
            SyncTarget::Paths(vec!["users".into()])
        );
    }

    #[test]
    fn test_request_from_fields() {
        let Value::Object(fields) = json!({"paths": ["users", 7], "scheduledSync": true}) else {
            unreachable!()
        };
        let request = SyncRequest::from_fields(&fields);
        assert_eq!(request.paths, Some(vec!["users".to_string(), String::new()]));
        assert!(request.scheduled_sync);

        let Value::Object(fields) = json!({"paths": "users"}) else {
            unreachable!()
        };
        assert_eq!(SyncRequest::from_fields(&fields).target(), SyncTarget::All);
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_value(SyncStatus::CompletedWithErrors).unwrap(),
            json!("completed_with_errors")
        );
        assert_eq!(SyncStatus::InProgress.to_string(), "in_progress");
    }

    #[test]
    fn test_in_progress_metadata_clears_previous_results() {
        let fields = RunMetadata::in_progress(Utc::now()).to_fields().unwrap();
        assert_eq!(fields.get("syncStatus"), Some(&json!("in_progress")));
        assert_eq!(fields.get("syncCompletedAt"), Some(&Value::Null));
        assert_eq!(fields.get("syncResults"), Some(&Value::Null));
        assert_eq!(fields.get("syncError"), Some(&Value::Null));
        assert!(!fields.contains_key("syncDuration"));
    }

    #[test]
    fn test_completed_metadata() {
        let mut report = SyncRunReport::start();
        report.record_path(PathReport::failed("x", "Empty path"));
        report.record_path(PathReport::failed("y", "Empty path"));
        let meta = RunMetadata::completed(report.finish());
        assert_eq!(meta.sync_status, SyncStatus::CompletedWithErrors);
        assert_eq!(meta.sync_error.as_deref(), Some("2 errors occurred during sync"));

        let fields = meta.to_fields().unwrap();
        let results = fields.get("syncResults").unwrap();
        assert_eq!(results["totalErrors"], json!(2));
        assert_eq!(results["paths"][0]["error"], json!("Empty path"));
    }
}
