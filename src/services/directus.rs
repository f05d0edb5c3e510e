// src/services/directus.rs

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Instant;
use url::Url;

use crate::config::SyncConfig;
use crate::services::retry::RetryPolicy;
use crate::types::{LookupMap, SyncLogEntry};
use crate::utils::{SyncError, SyncResult};
use crate::{log_debug, EXTERNAL_SOURCE};

/// Target-store collection holding the audit trail.
pub const SYNC_LOG_COLLECTION: &str = "sync_logs";

/// How many previously synced rows one lookup query may return. Catalogs
/// beyond this need paging on the lookup query, which no deployment has
/// reached yet.
const LOOKUP_LIMIT: u32 = 10_000;

/// Primitives the reconciler and orchestrator need from the target store.
/// `DirectusClient` is the production implementation; tests substitute an
/// in-memory mock.
#[async_trait]
pub trait TargetStore: Send + Sync {
    async fn list_items(
        &self,
        collection: &str,
        filter: Option<Value>,
        limit: Option<u32>,
        sort: Option<&str>,
    ) -> SyncResult<Vec<Value>>;

    async fn create_item(&self, collection: &str, data: &Value) -> SyncResult<Value>;

    async fn update_item(&self, collection: &str, id: &str, data: &Value) -> SyncResult<Value>;

    /// Round-trip latency in milliseconds. An error marks the store
    /// unhealthy.
    async fn health(&self) -> SyncResult<f64>;

    async fn find_by_external_id(
        &self,
        collection: &str,
        external_id: &str,
    ) -> SyncResult<Option<Value>> {
        let filter = json!({ "external_id": { "_eq": external_id } });
        let mut items = self.list_items(collection, Some(filter), Some(1), None).await?;
        Ok(if items.is_empty() {
            None
        } else {
            Some(items.remove(0))
        })
    }

    /// Reads then creates-if-absent else updates by primary key.
    async fn upsert_item(
        &self,
        collection: &str,
        filter: Value,
        data: &Value,
    ) -> SyncResult<Value> {
        let existing = self.list_items(collection, Some(filter), Some(1), None).await?;
        match existing.first().and_then(item_id) {
            Some(id) => self.update_item(collection, &id, data).await,
            None => self.create_item(collection, data).await,
        }
    }

    /// Builds the source-id -> target-primary-key association for records
    /// previously synced from the source system.
    async fn build_lookup(&self, collection: &str) -> SyncResult<LookupMap> {
        let filter = json!({ "external_source": { "_eq": EXTERNAL_SOURCE } });
        let items = self
            .list_items(collection, Some(filter), Some(LOOKUP_LIMIT), None)
            .await?;
        let mut lookup: LookupMap = HashMap::new();
        for item in &items {
            let external_id = item
                .get("external_id")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            if external_id.is_empty() {
                continue;
            }
            if let Some(id) = item_id(item) {
                lookup.insert(external_id.to_string(), id);
            }
        }
        Ok(lookup)
    }

    async fn write_sync_log(&self, entry: &SyncLogEntry) -> SyncResult<()> {
        let data = serde_json::to_value(entry)?;
        self.create_item(SYNC_LOG_COLLECTION, &data).await?;
        Ok(())
    }
}

/// Extracts the primary key of a target-store row as a string. Directus
/// returns string keys for UUID collections and numbers for serial ones.
pub fn item_id(item: &Value) -> Option<String> {
    match item.get("id") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// HTTP client for the Directus items API, with bearer auth and the uniform
/// retry policy around every call.
pub struct DirectusClient {
    client: Client,
    base_url: Url,
    token: String,
    retry: RetryPolicy,
}

impl DirectusClient {
    pub fn new(config: &SyncConfig) -> SyncResult<Self> {
        let base_url = Url::parse(&config.directus_url)?;
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SyncError::config_error(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url,
            token: config.directus_token.clone(),
            retry: RetryPolicy::new(config.max_retries, config.retry_delay_ms),
        })
    }

    fn items_url(&self, collection: &str) -> SyncResult<Url> {
        Ok(self.base_url.join(&format!("items/{}", collection))?)
    }

    fn item_url(&self, collection: &str, id: &str) -> SyncResult<Url> {
        Ok(self.base_url.join(&format!("items/{}/{}", collection, id))?)
    }

    async fn send(request: RequestBuilder) -> SyncResult<Value> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(
                SyncError::api_error(format!("Directus API error: {}", body))
                    .with_status(status.as_u16()),
            );
        }
        response
            .json()
            .await
            .map_err(|e| SyncError::parse_error(format!("Failed to parse Directus response: {}", e)))
    }

    /// Unwraps the `{ "data": ... }` envelope every items endpoint returns.
    fn unwrap_data(mut body: Value) -> Value {
        match body.get_mut("data") {
            Some(data) => data.take(),
            None => body,
        }
    }
}

#[async_trait]
impl TargetStore for DirectusClient {
    async fn list_items(
        &self,
        collection: &str,
        filter: Option<Value>,
        limit: Option<u32>,
        sort: Option<&str>,
    ) -> SyncResult<Vec<Value>> {
        let url = self.items_url(collection)?;
        let filter_param = filter.map(|f| f.to_string());
        let body = self
            .retry
            .execute(|| {
                let mut request = self.client.get(url.clone()).bearer_auth(&self.token);
                if let Some(f) = &filter_param {
                    request = request.query(&[("filter", f.as_str())]);
                }
                if let Some(l) = limit {
                    request = request.query(&[("limit", l.to_string())]);
                }
                if let Some(s) = sort {
                    request = request.query(&[("sort", s)]);
                }
                async move { Self::send(request).await }
            })
            .await?;

        match Self::unwrap_data(body) {
            Value::Array(items) => Ok(items),
            other => Err(SyncError::parse_error(format!(
                "Expected an array from {}, got: {}",
                collection, other
            ))),
        }
    }

    async fn create_item(&self, collection: &str, data: &Value) -> SyncResult<Value> {
        let url = self.items_url(collection)?;
        log_debug!(
            "Creating item",
            json!({ "collection": collection })
        );
        let body = self
            .retry
            .execute(|| {
                let request = self
                    .client
                    .post(url.clone())
                    .bearer_auth(&self.token)
                    .json(data);
                async move { Self::send(request).await }
            })
            .await?;
        Ok(Self::unwrap_data(body))
    }

    async fn update_item(&self, collection: &str, id: &str, data: &Value) -> SyncResult<Value> {
        let url = self.item_url(collection, id)?;
        let body = self
            .retry
            .execute(|| {
                let request = self
                    .client
                    .patch(url.clone())
                    .bearer_auth(&self.token)
                    .json(data);
                async move { Self::send(request).await }
            })
            .await?;
        Ok(Self::unwrap_data(body))
    }

    async fn health(&self) -> SyncResult<f64> {
        let url = self.base_url.join("server/health")?;
        let started = Instant::now();
        // Single probe, no retries: the orchestrator treats a failure as
        // unhealthy rather than transient.
        let response = self.client.get(url).bearer_auth(&self.token).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(
                SyncError::api_error(format!("Directus health probe returned {}", status))
                    .with_status(status.as_u16()),
            );
        }
        Ok(started.elapsed().as_secs_f64() * 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl TargetStore for MemoryStore {
        async fn list_items(
            &self,
            _collection: &str,
            filter: Option<Value>,
            limit: Option<u32>,
            _sort: Option<&str>,
        ) -> SyncResult<Vec<Value>> {
            let mut rows = self.rows.lock().unwrap().clone();
            if let Some(conditions) = filter.as_ref().and_then(|f| f.as_object()) {
                rows.retain(|row| {
                    conditions.iter().all(|(field, cond)| match cond.get("_eq") {
                        Some(expected) => row.get(field) == Some(expected),
                        None => true,
                    })
                });
            }
            if let Some(limit) = limit {
                rows.truncate(limit as usize);
            }
            Ok(rows)
        }

        async fn create_item(&self, _collection: &str, data: &Value) -> SyncResult<Value> {
            let mut rows = self.rows.lock().unwrap();
            let mut row = data.as_object().cloned().unwrap_or_default();
            row.insert("id".to_string(), json!(rows.len() as u64 + 1));
            let row = Value::Object(row);
            rows.push(row.clone());
            Ok(row)
        }

        async fn update_item(&self, _collection: &str, id: &str, data: &Value) -> SyncResult<Value> {
            let mut rows = self.rows.lock().unwrap();
            for row in rows.iter_mut() {
                if item_id(row).as_deref() != Some(id) {
                    continue;
                }
                if let (Value::Object(target), Some(patch)) = (row, data.as_object()) {
                    for (k, v) in patch {
                        target.insert(k.clone(), v.clone());
                    }
                }
                return Ok(data.clone());
            }
            Err(SyncError::not_found(format!("No row {}", id)))
        }

        async fn health(&self) -> SyncResult<f64> {
            Ok(1.0)
        }
    }

    #[tokio::test]
    async fn test_upsert_creates_then_updates_in_place() {
        let store = MemoryStore::default();
        let filter = json!({ "external_id": { "_eq": "B1" } });

        let created = store
            .upsert_item(
                "branches",
                filter.clone(),
                &json!({ "external_id": "B1", "name": "Main" }),
            )
            .await
            .unwrap();
        assert!(item_id(&created).is_some());

        store
            .upsert_item(
                "branches",
                filter,
                &json!({ "external_id": "B1", "name": "Main Hall" }),
            )
            .await
            .unwrap();

        let rows = store.list_items("branches", None, None, None).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], json!("Main Hall"));
    }

    #[tokio::test]
    async fn test_build_lookup_skips_rows_without_keys() {
        let store = MemoryStore::default();
        store
            .create_item(
                "branches",
                &json!({ "external_id": "B1", "external_source": EXTERNAL_SOURCE }),
            )
            .await
            .unwrap();
        store
            .create_item("branches", &json!({ "external_source": EXTERNAL_SOURCE }))
            .await
            .unwrap();
        store
            .create_item("branches", &json!({ "external_id": "X1", "external_source": "other" }))
            .await
            .unwrap();

        let lookup = store.build_lookup("branches").await.unwrap();
        assert_eq!(lookup.len(), 1);
        assert_eq!(lookup.get("B1"), Some(&"1".to_string()));
    }

    #[test]
    fn test_item_id_variants() {
        assert_eq!(item_id(&json!({ "id": "abc" })), Some("abc".to_string()));
        assert_eq!(item_id(&json!({ "id": 7 })), Some("7".to_string()));
        assert_eq!(item_id(&json!({ "name": "x" })), None);
    }

    #[test]
    fn test_unwrap_data_envelope() {
        let wrapped = json!({ "data": [{ "id": 1 }] });
        assert_eq!(DirectusClient::unwrap_data(wrapped), json!([{ "id": 1 }]));
        let bare = json!([{ "id": 2 }]);
        assert_eq!(DirectusClient::unwrap_data(bare.clone()), bare);
    }

    #[test]
    fn test_urls_join_collection() {
        let config = SyncConfig {
            directus_url: "https://cms.example.com/".to_string(),
            directus_token: "t".to_string(),
            ..SyncConfig::default()
        };
        let client = DirectusClient::new(&config).unwrap();
        assert_eq!(
            client.items_url("menu_items").unwrap().as_str(),
            "https://cms.example.com/items/menu_items"
        );
        assert_eq!(
            client.item_url("tables", "42").unwrap().as_str(),
            "https://cms.example.com/items/tables/42"
        );
    }
}
