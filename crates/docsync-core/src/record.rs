//! Source documents, index records and the conversion between them
//!
//! Conversion is pure: no I/O, no logging beyond `trace!`.

use crate::pattern::{path_segments, MatchParams};
use crate::route::CollectionRoute;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field map shared by source documents and index records
pub type FieldMap = Map<String, Value>;

/// Key holding the document identifier in an index record
pub const ID_FIELD: &str = "id";
/// Key holding a pre-existing source `id` value
pub const ORIGINAL_ID_FIELD: &str = "_id";
/// Key holding the full source path
pub const PATH_FIELD: &str = "_path";

/// A document as read from the source store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    /// Full slash-delimited path, e.g. `users/u1`
    pub path: String,
    /// Last path segment
    pub id: String,
    /// Document contents
    #[serde(default)]
    pub fields: FieldMap,
}

impl SourceDocument {
    /// Build a document from its full path; the id is the last segment
    pub fn new(path: impl Into<String>, fields: FieldMap) -> Self {
        let path = path.into();
        let id = path_segments(&path).last().copied().unwrap_or_default().to_string();
        Self { path, id, fields }
    }

    /// Path of the collection holding this document
    pub fn collection_path(&self) -> String {
        let segments = path_segments(&self.path);
        match segments.split_last() {
            Some((_, prefix)) => prefix.join("/"),
            None => String::new(),
        }
    }
}

/// A document shaped for the search index
///
/// Always carries `id`; may carry `_id` and `_path`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexRecord(FieldMap);

impl IndexRecord {
    pub fn new(fields: FieldMap) -> Self {
        Self(fields)
    }

    /// Convert a source document for the given route
    ///
    /// The pre-existing `id` is read from the unprojected data, so it is
    /// preserved as `_id` even when projection drops it.
    pub fn from_source(
        doc: &SourceDocument,
        route: &CollectionRoute,
        params: &MatchParams,
        options: &RecordOptions,
        projector: &dyn FieldProjector,
    ) -> Self {
        let original_id = doc.fields.get(ID_FIELD).cloned();

        let projected = if route.fields().is_empty() {
            doc.fields.clone()
        } else {
            route
                .fields()
                .iter()
                .filter_map(|name| doc.fields.get(name).map(|v| (name.clone(), v.clone())))
                .collect()
        };

        let mut fields = projector.project(projected);

        if let Some(original) = original_id {
            fields.insert(ORIGINAL_ID_FIELD.to_string(), original);
        }
        fields.insert(ID_FIELD.to_string(), Value::String(doc.id.clone()));

        if options.include_source_path {
            fields.insert(PATH_FIELD.to_string(), Value::String(doc.path.clone()));
        }

        if options.include_path_params {
            for (name, value) in params.wildcards() {
                fields
                    .entry(name.to_string())
                    .or_insert_with(|| Value::String(value.to_string()));
            }
        }

        tracing::trace!(path = %doc.path, fields = fields.len(), "Converted document");
        Self(fields)
    }

    pub fn id(&self) -> Option<&str> {
        self.0.get(ID_FIELD).and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> &FieldMap {
        &self.0
    }

    pub fn into_fields(self) -> FieldMap {
        self.0
    }
}

/// Record shaping switches, taken from `records` configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordOptions {
    pub include_source_path: bool,
    pub include_path_params: bool,
}

impl From<&crate::config::RecordConfig> for RecordOptions {
    fn from(config: &crate::config::RecordConfig) -> Self {
        Self {
            include_source_path: config.include_source_path,
            include_path_params: config.include_path_params,
        }
    }
}

// ============================================================================
// Field Projection Strategy
// ============================================================================

/// Field map transformation applied after projection
pub trait FieldProjector: Send + Sync {
    fn project(&self, fields: FieldMap) -> FieldMap;

    fn name(&self) -> &'static str;
}

/// Leaves fields untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl FieldProjector for PassThrough {
    fn project(&self, fields: FieldMap) -> FieldMap {
        fields
    }

    fn name(&self) -> &'static str {
        "pass_through"
    }
}

/// Flattens nested objects into dot-joined keys
///
/// `{"a": {"b": 1}}` becomes `{"a.b": 1}`. Arrays and scalars are kept as
/// values; an empty nested object contributes no keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlattenProjector;

impl FlattenProjector {
    const SEPARATOR: &'static str = ".";

    fn flatten_into(prefix: Option<&str>, fields: FieldMap, out: &mut FieldMap) {
        for (key, value) in fields {
            let key = match prefix {
                Some(p) => format!("{}{}{}", p, Self::SEPARATOR, key),
                None => key,
            };
            match value {
                Value::Object(nested) => Self::flatten_into(Some(&key), nested, out),
                other => {
                    out.insert(key, other);
                }
            }
        }
    }
}

impl FieldProjector for FlattenProjector {
    fn project(&self, fields: FieldMap) -> FieldMap {
        let mut out = FieldMap::new();
        Self::flatten_into(None, fields, &mut out);
        out
    }

    fn name(&self) -> &'static str {
        "flatten"
    }
}

/// Projector selected by the `records.flatten_nested` switch
pub fn projector_for(config: &crate::config::RecordConfig) -> Box<dyn FieldProjector> {
    if config.flatten_nested {
        Box::new(FlattenProjector)
    } else {
        Box::new(PassThrough)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(path: &str, value: Value) -> SourceDocument {
        match value {
            Value::Object(fields) => SourceDocument::new(path, fields),
            _ => panic!("fixture must be an object"),
        }
    }

    fn keys(record: &IndexRecord) -> Vec<&str> {
        let mut keys: Vec<&str> = record.keys().collect();
        keys.sort_unstable();
        keys
    }

    #[test]
    fn test_source_document_id_and_collection() {
        let d = doc("products/p1/reviews/r9", json!({}));
        assert_eq!(d.id, "r9");
        assert_eq!(d.collection_path(), "products/p1/reviews");
    }

    #[test]
    fn test_projection_keeps_listed_fields_and_id() {
        let route = CollectionRoute::new("users", "users_index", vec!["name".into(), "email".into()]);
        let d = doc(
            "users/user1",
            json!({"name": "John", "email": "john@example.com", "age": 30, "secret": "x"}),
        );
        let record = IndexRecord::from_source(
            &d,
            &route,
            &MatchParams::document("user1"),
            &RecordOptions::default(),
            &PassThrough,
        );
        assert_eq!(keys(&record), vec!["email", "id", "name"]);
        assert_eq!(record.id(), Some("user1"));
    }

    #[test]
    fn test_missing_projected_fields_are_omitted() {
        let route = CollectionRoute::new("users", "users_index", vec!["name".into(), "phone".into()]);
        let d = doc("users/u2", json!({"name": "Ann"}));
        let record = IndexRecord::from_source(
            &d,
            &route,
            &MatchParams::new(),
            &RecordOptions::default(),
            &PassThrough,
        );
        assert_eq!(keys(&record), vec!["id", "name"]);
    }

    #[test]
    fn test_original_id_preserved_even_when_projected_away() {
        let route = CollectionRoute::new("users", "users_index", vec!["name".into()]);
        let d = doc("users/u3", json!({"id": "legacy-42", "name": "Bo"}));
        let record = IndexRecord::from_source(
            &d,
            &route,
            &MatchParams::new(),
            &RecordOptions::default(),
            &PassThrough,
        );
        assert_eq!(record.get("_id"), Some(&json!("legacy-42")));
        assert_eq!(record.id(), Some("u3"));

        let all_fields = CollectionRoute::new("users", "users_index", vec![]);
        let record = IndexRecord::from_source(
            &d,
            &all_fields,
            &MatchParams::new(),
            &RecordOptions::default(),
            &PassThrough,
        );
        assert_eq!(record.get("_id"), Some(&json!("legacy-42")));
        assert_eq!(record.id(), Some("u3"));
    }

    #[test]
    fn test_source_path_and_params() {
        let route = CollectionRoute::new("products/{productId}/reviews", "reviews", vec![]);
        let d = doc("products/p1/reviews/r1", json!({"stars": 5}));
        let params: MatchParams = [("productId", "p1"), ("docId", "r1")].into_iter().collect();
        let options = RecordOptions {
            include_source_path: true,
            include_path_params: true,
        };
        let record = IndexRecord::from_source(&d, &route, &params, &options, &PassThrough);
        assert_eq!(record.get("_path"), Some(&json!("products/p1/reviews/r1")));
        assert_eq!(record.get("productId"), Some(&json!("p1")));
        assert!(!record.contains_key("docId"));
    }

    #[test]
    fn test_path_params_do_not_overwrite_fields() {
        let route = CollectionRoute::new("stores/{region}/items", "items", vec![]);
        let d = doc("stores/eu/items/i1", json!({"region": "Europe"}));
        let params: MatchParams = [("region", "eu")].into_iter().collect();
        let options = RecordOptions {
            include_source_path: false,
            include_path_params: true,
        };
        let record = IndexRecord::from_source(&d, &route, &params, &options, &PassThrough);
        assert_eq!(record.get("region"), Some(&json!("Europe")));
    }

    #[test]
    fn test_flatten_projector() {
        let projector = FlattenProjector;
        let input = json!({
            "name": "x",
            "address": {"city": "Oslo", "geo": {"lat": 1.5}},
            "tags": ["a", "b"],
            "empty": {}
        });
        let Value::Object(fields) = input else {
            unreachable!()
        };
        let out = projector.project(fields);
        assert_eq!(out.get("address.city"), Some(&json!("Oslo")));
        assert_eq!(out.get("address.geo.lat"), Some(&json!(1.5)));
        assert_eq!(out.get("tags"), Some(&json!(["a", "b"])));
        assert!(!out.contains_key("address"));
        assert!(!out.contains_key("empty"));
    }

    #[test]
    fn test_flattened_record_keeps_top_level_id() {
        let route = CollectionRoute::new("users", "users_index", vec![]);
        let d = doc("users/u1", json!({"profile": {"id": "nested"}}));
        let record = IndexRecord::from_source(
            &d,
            &route,
            &MatchParams::new(),
            &RecordOptions::default(),
            &FlattenProjector,
        );
        assert_eq!(record.get("profile.id"), Some(&json!("nested")));
        assert!(!record.contains_key("_id"));
        assert_eq!(record.id(), Some("u1"));
    }

    #[test]
    fn test_record_serializes_as_plain_object() {
        let mut fields = FieldMap::new();
        fields.insert("id".into(), json!("a"));
        let record = IndexRecord::new(fields);
        assert_eq!(serde_json::to_string(&record).unwrap(), r#"{"id":"a"}"#);
    }
}
