//! Configuration types for docsync
//!
//! Uses the `config` crate for layered configuration from files and environment.

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration, loaded once per process and passed explicitly
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Ordered collection routes; declaration order is match priority
    #[serde(default)]
    pub collections: Vec<CollectionConfig>,

    /// The same list as a raw JSON string (environment form)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collections_json: Option<String>,

    /// Legacy single-collection settings, used when no list is configured
    #[serde(default)]
    pub legacy: LegacyCollectionConfig,

    /// Index record shaping
    #[serde(default)]
    pub records: RecordConfig,

    /// Bulk transfer configuration
    #[serde(default)]
    pub batch: BatchConfig,

    /// Retry configuration for bulk imports
    #[serde(default)]
    pub retry: RetryConfig,

    /// Recurring full resync
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Manual sync trigger configuration
    #[serde(default)]
    pub trigger: TriggerConfig,

    /// Target index connection
    #[serde(default)]
    pub index: IndexConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ============================================================================
// Collections
// ============================================================================

/// One source pattern → index collection mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Source collection pattern, e.g. `products/{productId}/reviews`
    #[serde(alias = "firestorePath")]
    pub source_path: String,

    /// Target index collection name
    #[serde(alias = "typesenseCollection")]
    pub target_collection: String,

    /// Fields to sync; empty syncs every field
    #[serde(default, alias = "firestoreFields")]
    pub fields: Vec<String>,
}

/// Legacy single-collection settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LegacyCollectionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_path: Option<String>,

    /// Comma-separated field list
    #[serde(default)]
    pub collection_fields: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_collection: Option<String>,
}

impl LegacyCollectionConfig {
    /// The equivalent single route, if a collection path is configured
    pub fn to_collection(&self) -> Option<CollectionConfig> {
        let source_path = self.collection_path.as_ref().filter(|p| !p.trim().is_empty())?;
        Some(CollectionConfig {
            source_path: source_path.clone(),
            target_collection: self.target_collection.clone().unwrap_or_default(),
            fields: self
                .collection_fields
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(str::to_string)
                .collect(),
        })
    }
}

// ============================================================================
// Records
// ============================================================================

/// Index record shaping options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordConfig {
    /// Add `_path` with the full source path
    #[serde(default)]
    pub include_source_path: bool,

    /// Flatten nested objects into dot-joined keys
    #[serde(default)]
    pub flatten_nested: bool,

    /// Copy wildcard captures into the record
    #[serde(default)]
    pub include_path_params: bool,

    /// Log full record bodies instead of ids
    #[serde(default)]
    pub log_full_records: bool,
}

// ============================================================================
// Batching and retry
// ============================================================================

/// Bulk transfer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Documents per page and per bulk import
    #[serde(default = "default_batch_size")]
    pub size: usize,

    /// Page cap per collection sync
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

fn default_batch_size() -> usize {
    1000
}

fn default_max_pages() -> usize {
    1000
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            size: default_batch_size(),
            max_pages: default_max_pages(),
        }
    }
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts per bulk import, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial backoff delay
    #[serde(with = "humantime_serde", default = "default_initial_backoff")]
    pub initial_backoff: Duration,

    /// Maximum backoff delay
    #[serde(with = "humantime_serde", default = "default_max_backoff")]
    pub max_backoff: Duration,

    /// Backoff multiplier
    #[serde(default = "default_backoff_multiplier")]
    pub multiplier: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff() -> Duration {
    Duration::from_millis(100)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(10)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
            multiplier: default_backoff_multiplier(),
        }
    }
}

// ============================================================================
// Schedule and triggers
// ============================================================================

/// Recurring resync schedule
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// 5-field cron expression in UTC; absent or "never" disables it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
}

/// Manual sync trigger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Collection whose new records request a sync run
    #[serde(default = "default_manual_sync_collection")]
    pub manual_sync_collection: String,
}

fn default_manual_sync_collection() -> String {
    "typesense_manual_sync".to_string()
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            manual_sync_collection: default_manual_sync_collection(),
        }
    }
}

// ============================================================================
// Index connection
// ============================================================================

/// Search index connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Index hosts (host names, without protocol or port)
    #[serde(default = "default_index_hosts")]
    pub hosts: Vec<String>,

    #[serde(default = "default_index_port")]
    pub port: u16,

    #[serde(default = "default_index_protocol")]
    pub protocol: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Connection timeout
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub connect_timeout: Duration,

    /// Request timeout
    #[serde(with = "humantime_serde", default = "default_request_timeout")]
    pub request_timeout: Duration,

    /// How the index treats values that do not match the schema type
    #[serde(default = "default_dirty_values")]
    pub dirty_values: String,
}

fn default_dirty_values() -> String {
    "coerce_or_drop".to_string()
}

fn default_index_hosts() -> Vec<String> {
    vec!["localhost".to_string()]
}

fn default_index_port() -> u16 {
    443
}

fn default_index_protocol() -> String {
    "https".to_string()
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

impl IndexConfig {
    /// Base URLs, one per host
    pub fn base_urls(&self) -> Vec<String> {
        self.hosts
            .iter()
            .map(|h| h.trim())
            .filter(|h| !h.is_empty())
            .map(|h| format!("{}://{}:{}", self.protocol, h, self.port))
            .collect()
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            hosts: default_index_hosts(),
            port: default_index_port(),
            protocol: default_index_protocol(),
            api_key: None,
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
            dirty_values: default_dirty_values(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format: "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

// ============================================================================
// Configuration Loading
// ============================================================================

impl SyncConfig {
    /// Load configuration from file and environment
    pub fn load(path: Option<&str>) -> std::result::Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default values
        builder = builder.add_source(config::Config::try_from(&Self::default())?);

        // Add config file if specified
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Add environment variables with prefix DOCSYNC_
        builder = builder.add_source(
            config::Environment::with_prefix("DOCSYNC")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("index.hosts")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Reject settings the synchronizer cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.batch.size == 0 {
            return Err(SyncError::config("batch.size must be at least 1"));
        }
        if self.batch.max_pages == 0 {
            return Err(SyncError::config("batch.max_pages must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(SyncError::config("retry.max_attempts must be at least 1"));
        }
        if self.index.base_urls().is_empty() {
            return Err(SyncError::config("index.hosts must name at least one host"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.batch.size, 1000);
        assert_eq!(config.batch.max_pages, 1000);
        assert_eq!(config.trigger.manual_sync_collection, "typesense_manual_sync");
        assert!(!config.records.include_source_path);
        assert!(config.schedule.interval.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_collection_aliases() {
        let entry: CollectionConfig = serde_json::from_str(
            r#"{"firestorePath": "users", "typesenseCollection": "users_index"}"#,
        )
        .unwrap();
        assert_eq!(entry.source_path, "users");
        assert_eq!(entry.target_collection, "users_index");
        assert!(entry.fields.is_empty());
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let mut config = SyncConfig::default();
        config.batch.size = 0;
        assert!(matches!(
            config.validate(),
            Err(SyncError::Configuration { .. })
        ));
    }

    #[test]
    fn test_base_urls() {
        let index = IndexConfig {
            hosts: vec!["a.example".into(), " b.example ".into(), "".into()],
            port: 8108,
            protocol: "http".into(),
            ..Default::default()
        };
        assert_eq!(
            index.base_urls(),
            vec!["http://a.example:8108", "http://b.example:8108"]
        );
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{
                "collections": [
                    {{"source_path": "users", "target_collection": "users_index", "fields": ["name"]}}
                ],
                "batch": {{"size": 50}},
                "retry": {{"initial_backoff": "250ms"}},
                "records": {{"include_source_path": true}}
            }}"#
        )
        .unwrap();

        let config = SyncConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.collections.len(), 1);
        assert_eq!(config.batch.size, 50);
        assert_eq!(config.batch.max_pages, 1000);
        assert_eq!(config.retry.initial_backoff, Duration::from_millis(250));
        assert!(config.records.include_source_path);
    }
}
