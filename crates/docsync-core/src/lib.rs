//! # docsync core
//!
//! Core types, routing and collaborator traits for replicating documents
//! from a hierarchical document store into a search index.
//!
//! - Path patterns with positional (`*`) and named (`{name}`) wildcards
//! - Route resolution from a concrete path to its index collection
//! - Conversion of source documents into index records
//! - Run reports and the metadata written back to sync requests
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ SourceStore │────►│ RouteTable  │────►│ IndexClient │
//! │  (paged)    │     │ + Projector │     │  (bulk)     │
//! └─────────────┘     └─────────────┘     └─────────────┘
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod pattern;
pub mod record;
pub mod report;
pub mod route;
pub mod strategy;

pub use config::*;
pub use error::*;
pub use metrics::*;
pub use pattern::*;
pub use record::*;
pub use report::*;
pub use route::*;
pub use strategy::*;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::SyncConfig;
    pub use crate::error::{Result, SyncError};
    pub use crate::pattern::{MatchParams, PathPattern};
    pub use crate::record::{FieldProjector, IndexRecord, SourceDocument};
    pub use crate::report::{BatchRunResult, SyncRequest, SyncRunReport, SyncTarget};
    pub use crate::route::{PathKind, RouteTable};
    pub use crate::strategy::{CollectionQuery, HealthCheck, IndexClient, SourceStore};
}
