//! Error types for docsync
//!
//! Uses `thiserror` for ergonomic error handling with full context preservation.

use std::fmt;
use thiserror::Error;

/// Result type alias for docsync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Primary error type for all docsync operations
#[derive(Error, Debug)]
pub enum SyncError {
    /// Source document store read/write errors
    #[error("Source store error: {message}")]
    SourceStore {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Search index errors (transport or non-success status)
    #[error("Index error: {message}")]
    Index {
        message: String,
        status: Option<u16>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Index resource does not exist (HTTP 404)
    #[error("Not found in index: {resource}")]
    NotFound { resource: String },

    /// Message serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A requested path has no configured route
    #[error("Path \"{path}\" does not match any configured collection")]
    NoMatchingRoute { path: String },

    /// A requested document is absent from the source store
    #[error("Document {path} does not exist")]
    DocumentNotFound { path: String },

    /// Pagination did not terminate within the page cap
    #[error("Pagination exceeded {pages} pages for {collection}")]
    PageLimitExceeded { collection: String, pages: usize },

    /// Operation timeout
    #[error("Timeout: {operation} exceeded {duration_ms}ms")]
    Timeout { operation: String, duration_ms: u64 },

    /// Retry limit exceeded
    #[error("Retry exhausted after {attempts} attempts: {message}")]
    RetryExhausted { attempts: u32, message: String },

    /// Schedule registration or cron parsing errors
    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

impl SyncError {
    /// Create a source store error
    pub fn source_store(message: impl Into<String>) -> Self {
        Self::SourceStore {
            message: message.into(),
            source: None,
        }
    }

    /// Create a source store error with source
    pub fn source_store_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::SourceStore {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an index error without a status (transport level)
    pub fn index(message: impl Into<String>) -> Self {
        Self::Index {
            message: message.into(),
            status: None,
            source: None,
        }
    }

    /// Create an index error carrying the HTTP status returned
    pub fn index_status(message: impl Into<String>, status: u16) -> Self {
        Self::Index {
            message: message.into(),
            status: Some(status),
            source: None,
        }
    }

    /// Create an index error with source
    pub fn index_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Index {
            message: message.into(),
            status: None,
            source: Some(Box::new(source)),
        }
    }

    /// Create a not-found error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, duration_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration_ms,
        }
    }

    /// Wrap the last error of a retried operation
    pub fn retry_exhausted(attempts: u32, last: &SyncError) -> Self {
        Self::RetryExhausted {
            attempts,
            message: last.to_string(),
        }
    }

    /// Check if error is retryable
    ///
    /// Transport failures, throttling (429) and server-side (5xx) index
    /// errors are retryable; other client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Index { status, .. } => status.map_or(true, |s| s == 429 || s >= 500),
            Self::SourceStore { .. } | Self::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Check if the error is a 404 from the index
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

/// Error context for enhanced debugging
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub component: &'static str,
    pub operation: String,
    pub document_id: Option<String>,
    pub collection: Option<String>,
    pub path: Option<String>,
}

impl ErrorContext {
    pub fn new(component: &'static str, operation: impl Into<String>) -> Self {
        Self {
            component,
            operation: operation.into(),
            document_id: None,
            collection: None,
            path: None,
        }
    }

    pub fn document(mut self, id: impl Into<String>) -> Self {
        self.document_id = Some(id.into());
        self
    }

    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collection = Some(name.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}::{}]", self.component, self.operation)?;
        if let Some(ref id) = self.document_id {
            write!(f, " doc={}", id)?;
        }
        if let Some(ref collection) = self.collection {
            write!(f, " collection={}", collection)?;
        }
        if let Some(ref path) = self.path {
            write!(f, " path={}", path)?;
        }
        Ok(())
    }
}

/// Extension trait for adding context to errors
pub trait ErrorContextExt<T> {
    fn with_context(self, ctx: ErrorContext) -> Result<T>;
}

impl<T> ErrorContextExt<T> for Result<T> {
    fn with_context(self, ctx: ErrorContext) -> Result<T> {
        self.map_err(|e| {
            tracing::error!(
                error = %e,
                component = ctx.component,
                operation = %ctx.operation,
                document_id = ?ctx.document_id,
                collection = ?ctx.collection,
                path = ?ctx.path,
                "Operation failed"
            );
            e
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(SyncError::index("connection reset").is_retryable());
        assert!(SyncError::index_status("bad gateway", 502).is_retryable());
        assert!(SyncError::index_status("slow down", 429).is_retryable());
        assert!(!SyncError::index_status("bad request", 400).is_retryable());
        assert!(!SyncError::not_found("users/doc1").is_retryable());
        assert!(!SyncError::config("missing").is_retryable());
    }

    #[test]
    fn test_retry_exhausted_keeps_last_error() {
        let err = SyncError::retry_exhausted(3, &SyncError::index_status("unavailable", 503));
        assert_eq!(
            err.to_string(),
            "Retry exhausted after 3 attempts: Index error: unavailable"
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_routing_message_mentions_match() {
        let err = SyncError::NoMatchingRoute {
            path: "a/b/c".to_string(),
        };
        assert!(err.to_string().contains("does not match any configured collection"));
    }

    #[test]
    fn test_context_display() {
        let ctx = ErrorContext::new("transfer", "upsert")
            .document("doc1")
            .collection("users_index");
        assert_eq!(ctx.to_string(), "[transfer::upsert] doc=doc1 collection=users_index");
    }
}
