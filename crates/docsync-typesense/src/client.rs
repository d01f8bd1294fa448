//! Typesense REST client
//!
//! Implements [`IndexClient`] over the Typesense HTTP API. Hosts are used
//! round-robin; collection names and ids are percent-encoded as single path
//! segments.

use async_trait::async_trait;
use docsync_core::prelude::*;
use docsync_core::{DocumentOutcome, ImportAction, ImportOutcome, IndexConfig};
use reqwest::{Client, Method, Response, StatusCode};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};
use url::Url;

const API_KEY_HEADER: &str = "X-TYPESENSE-API-KEY";

/// Typesense client configuration
#[derive(Debug, Clone)]
pub struct TypesenseConfig {
    /// Base URLs, e.g. `https://search.example.com:443`
    pub base_urls: Vec<String>,
    pub api_key: Option<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Forwarded as the `dirty_values` import parameter
    pub dirty_values: String,
}

impl Default for TypesenseConfig {
    fn default() -> Self {
        Self {
            base_urls: vec!["http://localhost:8108".to_string()],
            api_key: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
            dirty_values: "coerce_or_drop".to_string(),
        }
    }
}

impl From<&IndexConfig> for TypesenseConfig {
    fn from(config: &IndexConfig) -> Self {
        Self {
            base_urls: config.base_urls(),
            api_key: config.api_key.clone(),
            connect_timeout: config.connect_timeout,
            request_timeout: config.request_timeout,
            dirty_values: config.dirty_values.clone(),
        }
    }
}

/// Typesense index client
pub struct TypesenseClient {
    client: Client,
    hosts: Vec<Url>,
    config: TypesenseConfig,
    host_index: AtomicUsize,
}

impl TypesenseClient {
    pub fn new(config: TypesenseConfig) -> Result<Self> {
        let hosts = config
            .base_urls
            .iter()
            .map(|raw| {
                Url::parse(raw).map_err(|e| {
                    SyncError::config(format!("Invalid index host URL {}: {}", raw, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        if hosts.is_empty() {
            return Err(SyncError::config("No index hosts configured"));
        }
        if let Some(bad) = hosts.iter().find(|u| u.cannot_be_a_base()) {
            return Err(SyncError::config(format!("Index host {} cannot be a base URL", bad)));
        }

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SyncError::index_with_source("Failed to create client", e))?;

        Ok(Self {
            client,
            hosts,
            config,
            host_index: AtomicUsize::new(0),
        })
    }

    /// Get the next host (round-robin)
    fn next_host(&self) -> &Url {
        let idx = self.host_index.fetch_add(1, Ordering::Relaxed) % self.hosts.len();
        &self.hosts[idx]
    }

    /// Build an endpoint URL from unencoded path segments
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.next_host().clone();
        url.path_segments_mut()
            .map_err(|_| SyncError::config("Index host cannot be a base URL"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        let req = self.client.request(method, url);
        match self.config.api_key {
            Some(ref key) => req.header(API_KEY_HEADER, key),
            None => req,
        }
    }

    async fn send(&self, req: reqwest::RequestBuilder, operation: &str) -> Result<Response> {
        req.send().await.map_err(|e| {
            if e.is_timeout() {
                SyncError::timeout(
                    operation,
                    self.config.request_timeout.as_millis() as u64,
                )
            } else {
                SyncError::index_with_source(format!("{} failed", operation), e)
            }
        })
    }

    /// Map a non-success response to an index error carrying its status
    async fn check(resp: Response, operation: &str, resource: &str) -> Result<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(SyncError::not_found(resource));
        }
        let body = resp.text().await.unwrap_or_default();
        Err(SyncError::index_status(
            format!("{} failed: {} - {}", operation, status, body),
            status.as_u16(),
        ))
    }

    /// Parse the JSONL result body of an import; lines align with the input
    fn parse_import_results(body: &str, records: &[IndexRecord]) -> Vec<DocumentOutcome> {
        body.lines()
            .filter(|line| !line.trim().is_empty())
            .enumerate()
            .map(|(i, line)| {
                let fallback_id = records.get(i).and_then(|r| r.id()).map(str::to_string);
                match serde_json::from_str::<DocumentOutcome>(line) {
                    Ok(mut outcome) => {
                        if outcome.id.is_none() {
                            outcome.id = fallback_id;
                        }
                        outcome
                    }
                    Err(e) => DocumentOutcome::failed(
                        fallback_id,
                        format!("Unreadable import result: {}", e),
                    ),
                }
            })
            .collect()
    }
}

#[async_trait]
impl HealthCheck for TypesenseClient {
    async fn health_check(&self) -> Result<()> {
        let url = self.endpoint(&["health"])?;
        let resp = self.send(self.request(Method::GET, url), "Health check").await?;
        let resp = Self::check(resp, "Health check", "health").await?;
        let body: Value = resp
            .json()
            .await
            .map_err(|e| SyncError::index_with_source("Failed to parse health response", e))?;

        if body["ok"].as_bool() == Some(true) {
            Ok(())
        } else {
            Err(SyncError::index(format!("Index reports unhealthy: {}", body)))
        }
    }

    fn component_name(&self) -> &'static str {
        "typesense"
    }
}

#[async_trait]
impl IndexClient for TypesenseClient {
    async fn create_collection(&self, schema: &Value) -> Result<()> {
        let name = schema["name"].as_str().unwrap_or_default().to_string();
        let url = self.endpoint(&["collections"])?;
        let resp = self
            .send(self.request(Method::POST, url).json(schema), "Create collection")
            .await?;
        Self::check(resp, "Create collection", &name).await?;
        debug!(collection = %name, "Created index collection");
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let url = self.endpoint(&["collections", name])?;
        let resp = self
            .send(self.request(Method::DELETE, url), "Delete collection")
            .await?;
        Self::check(resp, "Delete collection", name).await?;
        debug!(collection = %name, "Deleted index collection");
        Ok(())
    }

    async fn upsert_document(&self, collection: &str, record: &IndexRecord) -> Result<()> {
        let url = self.endpoint(&["collections", collection, "documents"])?;
        let req = self
            .request(Method::POST, url)
            .query(&[("action", ImportAction::Upsert.as_str())])
            .json(record);
        let resp = self.send(req, "Upsert document").await?;
        Self::check(resp, "Upsert document", collection).await?;
        trace!(collection, id = ?record.id(), "Upserted document");
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<()> {
        let url = self.endpoint(&["collections", collection, "documents", id])?;
        let resp = self
            .send(self.request(Method::DELETE, url), "Delete document")
            .await?;
        Self::check(resp, "Delete document", &format!("{}/{}", collection, id)).await?;
        trace!(collection, id, "Deleted document");
        Ok(())
    }

    async fn import_documents(
        &self,
        collection: &str,
        records: &[IndexRecord],
        action: ImportAction,
    ) -> Result<ImportOutcome> {
        let start = Instant::now();

        let mut body = String::new();
        for record in records {
            body.push_str(&serde_json::to_string(record)?);
            body.push('\n');
        }

        let url = self.endpoint(&["collections", collection, "documents", "import"])?;
        let req = self
            .request(Method::POST, url)
            .query(&[
                ("action", action.as_str()),
                ("return_id", "true"),
                ("dirty_values", self.config.dirty_values.as_str()),
            ])
            .header("Content-Type", "text/plain")
            .body(body);

        let resp = self.send(req, "Import documents").await?;
        let resp = Self::check(resp, "Import documents", collection).await?;
        let text = resp
            .text()
            .await
            .map_err(|e| SyncError::index_with_source("Failed to read import response", e))?;

        let mut results = Self::parse_import_results(&text, records);
        if results.len() != records.len() {
            warn!(
                collection,
                submitted = records.len(),
                returned = results.len(),
                "Import result count differs from submitted records"
            );
        }
        // Records without a result line count as failed
        if let Some(missing) = records.get(results.len()..) {
            results.extend(missing.iter().map(|record| {
                DocumentOutcome::failed(record.id().map(str::to_string), "No import result returned")
            }));
        }

        let outcome = ImportOutcome::new(results, start.elapsed().as_millis() as u64);
        debug!(
            collection,
            succeeded = outcome.success_count(),
            failed = outcome.failure_count(),
            duration_ms = outcome.duration_ms,
            "Import completed"
        );
        Ok(outcome)
    }
}
