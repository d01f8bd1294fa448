//! Collection path patterns
//!
//! A pattern is a `/`-separated list of segments. Each segment is a literal,
//! a positional wildcard (`*`) or a named wildcard (`{name}`), e.g.
//! `tenants/{tenantId}/projects/*/tasks`. Patterns are compiled once into a
//! tagged segment list and matched segment by segment; nothing is turned
//! into a regular expression, so literal segments never need escaping.
//!
//! Two matching modes exist:
//!
//! - [`MatchMode::Exact`]: the path has exactly as many segments as the
//!   pattern. Used for collection membership tests.
//! - [`MatchMode::DocumentSuffix`]: the path may carry one extra trailing
//!   segment, captured as `docId`. Used to match a document path against the
//!   pattern of its collection.

use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Key under which the trailing document segment is captured
pub const DOC_ID_PARAM: &str = "docId";

/// One compiled pattern segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Positional,
    Named(String),
}

impl Segment {
    fn parse(raw: &str) -> Self {
        if raw == "*" {
            return Self::Positional;
        }
        match named_wildcard(raw) {
            Some(name) => Self::Named(name.to_string()),
            None => Self::Literal(raw.to_string()),
        }
    }

    /// Check if this segment is a wildcard of either kind
    pub fn is_wildcard(&self) -> bool {
        !matches!(self, Self::Literal(_))
    }
}

fn named_wildcard(raw: &str) -> Option<&str> {
    raw.strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .filter(|name| !name.is_empty())
}

/// Split a path into its non-empty segments
pub fn path_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Rewrite `{name}` segments to `*`
pub fn normalize_wildcards(pattern: &str) -> String {
    pattern
        .split('/')
        .map(|segment| match named_wildcard(segment) {
            Some(_) => "*",
            None => segment,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Check if a pattern contains a positional or named wildcard
pub fn has_wildcard(pattern: &str) -> bool {
    pattern
        .split('/')
        .any(|segment| segment == "*" || named_wildcard(segment).is_some())
}

/// How many trailing segments a path may carry beyond the pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Segment counts must be equal
    Exact,
    /// One optional extra segment, captured as `docId`
    DocumentSuffix,
}

/// Parameters captured from a successful match
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchParams {
    values: BTreeMap<String, String>,
}

impl MatchParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parameters holding only a document id
    pub fn document(doc_id: impl Into<String>) -> Self {
        let mut params = Self::new();
        params.insert(DOC_ID_PARAM, doc_id);
        params
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// The captured trailing document segment, if any
    pub fn doc_id(&self) -> Option<&str> {
        self.get(DOC_ID_PARAM)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Wildcard captures, without the trailing document id
    pub fn wildcards(&self) -> impl Iterator<Item = (&str, &str)> {
        self.iter().filter(|(k, _)| *k != DOC_ID_PARAM)
    }
}

impl Serialize for MatchParams {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.values.serialize(serializer)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MatchParams {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

/// A compiled collection pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Compile a pattern string
    pub fn compile(pattern: &str) -> Self {
        Self {
            raw: pattern.to_string(),
            segments: path_segments(pattern).into_iter().map(Segment::parse).collect(),
        }
    }

    /// The pattern as configured
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn has_wildcard(&self) -> bool {
        self.segments.iter().any(Segment::is_wildcard)
    }

    /// The pattern with named wildcards rewritten to `*`
    pub fn normalized(&self) -> String {
        normalize_wildcards(&self.raw)
    }

    /// Match a path in the given mode
    ///
    /// Returns `None` when segment counts are incompatible or a literal
    /// segment disagrees. A match with no wildcards yields an empty map.
    pub fn matches(&self, path: &str, mode: MatchMode) -> Option<MatchParams> {
        self.match_segments(&path_segments(path), mode)
    }

    /// Exact-length match
    pub fn match_exact(&self, path: &str) -> Option<MatchParams> {
        self.matches(path, MatchMode::Exact)
    }

    /// Suffix-extended match, capturing a trailing `docId`
    pub fn match_document(&self, path: &str) -> Option<MatchParams> {
        self.matches(path, MatchMode::DocumentSuffix)
    }

    /// Match pre-split path segments
    pub fn match_segments(&self, path: &[&str], mode: MatchMode) -> Option<MatchParams> {
        let extra = path.len().checked_sub(self.segments.len())?;
        match (mode, extra) {
            (_, 0) | (MatchMode::DocumentSuffix, 1) => {}
            _ => return None,
        }

        let mut params = MatchParams::new();
        let mut positional = 0usize;

        for (segment, value) in self.segments.iter().zip(path) {
            match segment {
                Segment::Literal(literal) => {
                    if literal != value {
                        return None;
                    }
                }
                Segment::Positional => {
                    params.insert(format!("param{}", positional), *value);
                    positional += 1;
                }
                Segment::Named(name) => params.insert(name.as_str(), *value),
            }
        }

        if extra == 1 {
            params.insert(DOC_ID_PARAM, path[path.len() - 1]);
        }

        Some(params)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
