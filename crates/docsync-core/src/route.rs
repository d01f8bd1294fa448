//! Route table: which index collection a source path belongs to
//!
//! Routes are compiled once from configuration and resolved in declaration
//! order; the first matching route wins.

use crate::config::{CollectionConfig, SyncConfig};
use crate::pattern::{path_segments, MatchMode, MatchParams, PathPattern};
use std::fmt;
use tracing::{debug, error, info, warn};

/// Document vs collection, derived from segment-count parity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    /// Even segment count: `collection/doc[/collection/doc...]`
    Document,
    /// Odd segment count: `collection[/doc/collection...]`
    Collection,
}

impl PathKind {
    pub fn of(path: &str) -> Self {
        Self::of_segments(&path_segments(path))
    }

    pub fn of_segments(segments: &[&str]) -> Self {
        if segments.len() % 2 == 0 {
            Self::Document
        } else {
            Self::Collection
        }
    }
}

impl fmt::Display for PathKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Document => f.write_str("document"),
            Self::Collection => f.write_str("collection"),
        }
    }
}

/// A compiled source pattern paired with its index collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionRoute {
    pattern: PathPattern,
    target: String,
    fields: Vec<String>,
}

impl CollectionRoute {
    pub fn new(pattern: &str, target: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            pattern: PathPattern::compile(pattern),
            target: target.into(),
            fields,
        }
    }

    pub fn from_config(config: &CollectionConfig) -> Self {
        Self::new(&config.source_path, &config.target_collection, config.fields.clone())
    }

    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    /// Target index collection name
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Projected fields; empty means all fields
    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

/// Result of resolving a path against the route table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch<'a> {
    pub route: &'a CollectionRoute,
    pub params: MatchParams,
    pub kind: PathKind,
}

/// Ordered set of routes, immutable once built
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<CollectionRoute>,
}

impl RouteTable {
    pub fn new(routes: Vec<CollectionRoute>) -> Self {
        Self { routes }
    }

    /// Build the route table from configuration
    ///
    /// The structured `collections` list wins, then the raw JSON list, then
    /// the legacy single-collection settings. A malformed JSON list is
    /// logged and yields an empty table.
    pub fn from_config(config: &SyncConfig) -> Self {
        if !config.collections.is_empty() {
            return Self::from_entries(&config.collections);
        }

        if let Some(ref raw) = config.collections_json {
            match serde_json::from_str::<Vec<CollectionConfig>>(raw) {
                Ok(entries) if !entries.is_empty() => return Self::from_entries(&entries),
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, raw = %raw, "Failed to parse collections configuration");
                    return Self::default();
                }
            }
        }

        match config.legacy.to_collection() {
            Some(entry) => {
                info!(
                    source_path = %entry.source_path,
                    target = %entry.target_collection,
                    "Using legacy single collection configuration"
                );
                Self::from_entries(std::slice::from_ref(&entry))
            }
            None => {
                warn!("No collection configuration found");
                Self::default()
            }
        }
    }

    fn from_entries(entries: &[CollectionConfig]) -> Self {
        let routes = entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                info!(
                    index = i + 1,
                    source_path = %entry.source_path,
                    target = %entry.target_collection,
                    fields = entry.fields.len(),
                    "Loaded collection route"
                );
                CollectionRoute::from_config(entry)
            })
            .collect();
        Self { routes }
    }

    pub fn routes(&self) -> &[CollectionRoute] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Find the first route matching a concrete path
    ///
    /// Document paths are matched on their collection prefix (capturing
    /// `docId`); collection paths must match a pattern segment for segment.
    pub fn resolve(&self, path: &str) -> Option<RouteMatch<'_>> {
        let segments = path_segments(path);
        if segments.is_empty() {
            return None;
        }
        let kind = PathKind::of_segments(&segments);

        let found = match kind {
            PathKind::Document => {
                let (doc_id, prefix) = segments.split_last()?;
                let collection_path = prefix.join("/");
                self.routes.iter().find_map(|route| {
                    if route.pattern.as_str() == collection_path {
                        return Some((route, MatchParams::document(*doc_id)));
                    }
                    // Equal-length matches are collection hits, not documents
                    if route.pattern.len() + 1 != segments.len() {
                        return None;
                    }
                    route
                        .pattern
                        .match_segments(&segments, MatchMode::DocumentSuffix)
                        .map(|params| (route, params))
                })
            }
            PathKind::Collection => {
                let joined = segments.join("/");
                self.routes.iter().find_map(|route| {
                    if route.pattern.as_str() == joined {
                        return Some((route, MatchParams::new()));
                    }
                    route
                        .pattern
                        .match_segments(&segments, MatchMode::Exact)
                        .map(|params| (route, params))
                })
            }
        };

        match found {
            Some((route, params)) => {
                debug!(path, kind = %kind, target = %route.target, "Resolved route");
                Some(RouteMatch { route, params, kind })
            }
            None => {
                debug!(path, kind = %kind, "No route matches path");
                None
            }
        }
    }
}
