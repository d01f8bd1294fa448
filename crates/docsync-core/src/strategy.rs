//! Collaborator traits for docsync
//!
//! The synchronizer core only talks to the outside world through these
//! traits, so live services and in-memory stand-ins are interchangeable.
//!
//! ```text
//! HealthCheck
//!     │
//!     └── IndexClient (bulk import, upsert, delete, collection admin)
//!             └── TypesenseClient, MemoryIndex
//!
//! SourceStore (point reads, paged queries, metadata writes)
//!     └── MemoryStore, ...
//! ```

use crate::error::Result;
use crate::pattern::{has_wildcard, path_segments};
use crate::record::{FieldMap, IndexRecord, SourceDocument};
use crate::report::DocumentFailure;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

// ============================================================================
// Health
// ============================================================================

/// Health check capability
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// Returns Ok(()) if healthy, Err with details if not.
    async fn health_check(&self) -> Result<()>;

    /// Get component name for health reporting
    fn component_name(&self) -> &'static str;
}

// ============================================================================
// Source Store Strategy
// ============================================================================

/// How a collection path is queried
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionQuery {
    /// One concrete collection, by full path
    Collection(String),
    /// Every collection with this id, anywhere in the hierarchy
    CollectionGroup(String),
}

impl CollectionQuery {
    /// Group query iff the path has more than one segment and a wildcard
    pub fn for_path(path: &str) -> Self {
        let segments = path_segments(path);
        if segments.len() > 1 && has_wildcard(path) {
            let group = segments.last().copied().unwrap_or_default();
            Self::CollectionGroup(group.to_string())
        } else {
            Self::Collection(segments.join("/"))
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Self::CollectionGroup(_))
    }
}

impl fmt::Display for CollectionQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Collection(path) => write!(f, "collection({})", path),
            Self::CollectionGroup(id) => write!(f, "collection_group({})", id),
        }
    }
}

/// Hierarchical document store the index is fed from
///
/// Pages are returned in a stable order; `start_after` is the last
/// document of the previous page.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Point read; `Ok(None)` when the document does not exist
    async fn get_document(&self, path: &str) -> Result<Option<SourceDocument>>;

    /// Read up to `limit` documents after the cursor
    async fn query_page(
        &self,
        query: &CollectionQuery,
        start_after: Option<&SourceDocument>,
        limit: usize,
    ) -> Result<Vec<SourceDocument>>;

    /// Merge fields into an existing document
    async fn update_document(&self, path: &str, fields: FieldMap) -> Result<()>;

    /// Add a document with a generated id; returns the id
    async fn add_document(&self, collection: &str, fields: FieldMap) -> Result<String>;
}

// ============================================================================
// Index Client Strategy
// ============================================================================

/// Write mode for bulk imports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportAction {
    Create,
    Upsert,
    Update,
    Emplace,
}

impl ImportAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Upsert => "upsert",
            Self::Update => "update",
            Self::Emplace => "emplace",
        }
    }
}

/// Per-document result line of an accepted bulk import
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentOutcome {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DocumentOutcome {
    pub fn ok(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            success: true,
            error: None,
        }
    }

    pub fn failed(id: Option<String>, error: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Result of a bulk import the index accepted
///
/// A transport-level failure is an `Err` instead; an `ImportOutcome` always
/// means the request landed and documents were judged one by one.
#[derive(Debug, Clone, Default)]
pub struct ImportOutcome {
    pub results: Vec<DocumentOutcome>,
    /// Time taken for the import request
    pub duration_ms: u64,
}

impl ImportOutcome {
    pub fn new(results: Vec<DocumentOutcome>, duration_ms: u64) -> Self {
        Self {
            results,
            duration_ms,
        }
    }

    /// Every record accepted
    pub fn all_ok(records: &[IndexRecord]) -> Self {
        Self::new(
            records
                .iter()
                .map(|r| DocumentOutcome::ok(r.id().unwrap_or_default()))
                .collect(),
            0,
        )
    }

    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failure_count(&self) -> usize {
        self.results.len() - self.success_count()
    }

    /// Check if all documents were accepted
    pub fn is_complete_success(&self) -> bool {
        self.results.iter().all(|r| r.success)
    }

    pub fn failures(&self) -> Vec<DocumentFailure> {
        self.results
            .iter()
            .filter(|r| !r.success)
            .map(|r| DocumentFailure {
                id: r.id.clone(),
                error: r.error.clone().unwrap_or_else(|| "unknown error".to_string()),
            })
            .collect()
    }
}

/// Schema that lets the index infer every field's type
pub fn auto_schema(name: &str) -> Value {
    json!({
        "name": name,
        "fields": [{"name": ".*", "type": "auto"}],
    })
}

/// Search index the synchronizer writes to
#[async_trait]
pub trait IndexClient: HealthCheck {
    /// Create a collection from a schema document
    async fn create_collection(&self, schema: &Value) -> Result<()>;

    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Insert or replace one record
    async fn upsert_document(&self, collection: &str, record: &IndexRecord) -> Result<()>;

    /// Delete by id; `SyncError::NotFound` when the index has no such id
    async fn delete_document(&self, collection: &str, id: &str) -> Result<()>;

    /// Bulk import in one request
    async fn import_documents(
        &self,
        collection: &str,
        records: &[IndexRecord],
        action: ImportAction,
    ) -> Result<ImportOutcome>;
}
