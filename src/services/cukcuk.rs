// src/services/cukcuk.rs

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use std::time::Instant;
use tokio::sync::Mutex;
use url::Url;

use crate::config::SyncConfig;
use crate::services::retry::RetryPolicy;
use crate::types::SourceRecord;
use crate::utils::{SyncError, SyncResult};

type HmacSha256 = Hmac<Sha256>;

/// One page of a branch-partitioned menu-item listing.
#[derive(Debug, Clone)]
pub struct ItemPage {
    pub records: Vec<SourceRecord>,
    pub total: u64,
}

/// Primitives the collector and orchestrator need from the source POS
/// system. `CukcukClient` is the production implementation; tests
/// substitute an in-memory mock.
#[async_trait]
pub trait SourcePos: Send + Sync {
    async fn list_branches(&self, include_inactive: bool) -> SyncResult<Vec<SourceRecord>>;

    async fn list_categories(&self, include_inactive: bool) -> SyncResult<Vec<SourceRecord>>;

    async fn fetch_menu_items_page(
        &self,
        branch_id: &str,
        category_id: Option<&str>,
        page: u32,
        limit: u32,
        include_inactive: bool,
    ) -> SyncResult<ItemPage>;

    async fn list_tables_for_branch(&self, branch_id: &str) -> SyncResult<Vec<SourceRecord>>;

    /// Round-trip latency in milliseconds. An error marks the source
    /// system unhealthy.
    async fn health(&self) -> SyncResult<f64>;
}

/// Accepted paging envelopes. The source API answers either a flat
/// `{Data, Total}` object or the same object nested under a lowercase
/// `data` key; anything else is a decode error, not a silent fallback.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PageEnvelope {
    Flat {
        #[serde(rename = "Data")]
        data: Vec<Value>,
        #[serde(rename = "Total", default)]
        total: u64,
    },
    Nested {
        data: NestedPage,
    },
}

#[derive(Debug, Deserialize)]
struct NestedPage {
    #[serde(rename = "Data")]
    data: Vec<Value>,
    #[serde(rename = "Total", default)]
    total: u64,
}

impl PageEnvelope {
    fn into_parts(self) -> (Vec<Value>, u64) {
        match self {
            PageEnvelope::Flat { data, total } => (data, total),
            PageEnvelope::Nested { data } => (data.data, data.total),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LoginEnvelope {
    #[serde(rename = "Success", default)]
    success: bool,
    #[serde(rename = "Data")]
    data: Option<LoginData>,
}

#[derive(Debug, Deserialize)]
struct LoginData {
    #[serde(rename = "AccessToken")]
    access_token: String,
}

/// Converts one raw payload entry into a `SourceRecord`. The source-native
/// `Id` is required; a record without it cannot be reconciled.
fn decode_source_record(value: Value) -> SyncResult<SourceRecord> {
    let Value::Object(fields) = value else {
        return Err(SyncError::parse_error(format!(
            "Expected an object record, got: {}",
            value
        )));
    };
    let external_id = match fields.get("Id") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => {
            return Err(SyncError::parse_error(
                "Source record is missing its Id field",
            ))
        }
    };
    Ok(SourceRecord::new(external_id, fields))
}

fn decode_records(values: Vec<Value>) -> SyncResult<Vec<SourceRecord>> {
    values.into_iter().map(decode_source_record).collect()
}

/// Authenticated HTTP client for the CukCuk OpenAPI. Obtains an access
/// token on first use and caches it for the rest of the run.
pub struct CukcukClient {
    client: Client,
    base_url: Url,
    secret_key: String,
    domain: String,
    app_id: String,
    company_code: String,
    retry: RetryPolicy,
    token: Mutex<Option<String>>,
}

impl CukcukClient {
    pub fn new(config: &SyncConfig) -> SyncResult<Self> {
        let base_url = Url::parse(&config.cukcuk_base_url)?;
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SyncError::config_error(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url,
            secret_key: config.cukcuk_secret_key.clone(),
            domain: config.cukcuk_domain.clone(),
            app_id: config.cukcuk_app_id.clone(),
            company_code: config.cukcuk_company_code.clone(),
            retry: RetryPolicy::new(config.max_retries, config.retry_delay_ms),
            token: Mutex::new(None),
        })
    }

    fn url(&self, path: &str) -> SyncResult<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// Login signature: HMAC-SHA256 over `{app_id}{domain}{login_time}`
    /// keyed with the partner secret, hex-encoded.
    fn signature(&self, login_time: &str) -> SyncResult<String> {
        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .map_err(|e| SyncError::authentication_error(format!("Invalid secret key: {}", e)))?;
        mac.update(format!("{}{}{}", self.app_id, self.domain, login_time).as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    async fn login(&self) -> SyncResult<String> {
        let url = self.url("api/Account/Login")?;
        let login_time = chrono::Utc::now().to_rfc3339();
        let body = json!({
            "Domain": self.domain,
            "AppId": self.app_id,
            "LoginTime": login_time,
            "SignatureInfo": self.signature(&login_time)?,
        });

        let response = self
            .retry
            .execute(|| {
                let request = self.client.post(url.clone()).json(&body);
                async move { Self::send(request).await }
            })
            .await?;

        let envelope: LoginEnvelope = serde_json::from_value(response)
            .map_err(|e| SyncError::parse_error(format!("Unexpected login response: {}", e)))?;
        match envelope.data {
            Some(data) if envelope.success && !data.access_token.is_empty() => {
                Ok(data.access_token)
            }
            _ => Err(SyncError::authentication_error(
                "CukCuk login rejected the signature",
            )),
        }
    }

    async fn ensure_token(&self) -> SyncResult<String> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            return Ok(token.clone());
        }
        let token = self.login().await?;
        *guard = Some(token.clone());
        Ok(token)
    }

    async fn send(request: RequestBuilder) -> SyncResult<Value> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(
                SyncError::api_error(format!("CukCuk API error: {}", body))
                    .with_status(status.as_u16()),
            );
        }
        response
            .json()
            .await
            .map_err(|e| SyncError::parse_error(format!("Failed to parse CukCuk response: {}", e)))
    }

    async fn get_page(&self, path: &str, query: &[(&str, String)]) -> SyncResult<(Vec<Value>, u64)> {
        let token = self.ensure_token().await?;
        let url = self.url(path)?;
        let response = self
            .retry
            .execute(|| {
                let request = self
                    .client
                    .get(url.clone())
                    .bearer_auth(&token)
                    .header("CompanyCode", &self.company_code)
                    .query(query);
                async move { Self::send(request).await }
            })
            .await?;
        let envelope: PageEnvelope = serde_json::from_value(response)
            .map_err(|e| SyncError::parse_error(format!("Unexpected page envelope: {}", e)))?;
        Ok(envelope.into_parts())
    }
}

#[async_trait]
impl SourcePos for CukcukClient {
    async fn list_branches(&self, include_inactive: bool) -> SyncResult<Vec<SourceRecord>> {
        let (values, _) = self
            .get_page(
                "api/v1/branchs/all",
                &[("includeInactive", include_inactive.to_string())],
            )
            .await?;
        decode_records(values)
    }

    async fn list_categories(&self, include_inactive: bool) -> SyncResult<Vec<SourceRecord>> {
        let (values, _) = self
            .get_page(
                "api/v1/categories/list",
                &[("includeInactive", include_inactive.to_string())],
            )
            .await?;
        decode_records(values)
    }

    async fn fetch_menu_items_page(
        &self,
        branch_id: &str,
        category_id: Option<&str>,
        page: u32,
        limit: u32,
        include_inactive: bool,
    ) -> SyncResult<ItemPage> {
        let token = self.ensure_token().await?;
        let url = self.url("api/v1/products/paging")?;
        let body = json!({
            "Page": page,
            "Limit": limit,
            "BranchId": branch_id,
            "CategoryId": category_id,
            "KeySearch": "",
            "IncludeInactive": include_inactive,
        });

        let response = self
            .retry
            .execute(|| {
                let request = self
                    .client
                    .post(url.clone())
                    .bearer_auth(&token)
                    .header("CompanyCode", &self.company_code)
                    .json(&body);
                async move { Self::send(request).await }
            })
            .await?;

        let envelope: PageEnvelope = serde_json::from_value(response)
            .map_err(|e| SyncError::parse_error(format!("Unexpected page envelope: {}", e)))?;
        let (values, total) = envelope.into_parts();
        Ok(ItemPage {
            records: decode_records(values)?,
            total,
        })
    }

    async fn list_tables_for_branch(&self, branch_id: &str) -> SyncResult<Vec<SourceRecord>> {
        let (values, _) = self
            .get_page(
                "api/v1/tables/list",
                &[("branchId", branch_id.to_string())],
            )
            .await?;
        decode_records(values)
    }

    async fn health(&self) -> SyncResult<f64> {
        // A fresh login exercises both connectivity and credentials.
        let started = Instant::now();
        self.login().await?;
        Ok(started.elapsed().as_secs_f64() * 1000.0)
    }
}
