// src/config.rs

use serde::{Deserialize, Serialize};
use url::Url;

use crate::types::EntityType;

/// Explicit run configuration, constructed once at process start and passed
/// into the orchestrator. No ambient global state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Directus base URL, e.g. `https://cms.example.com`.
    pub directus_url: String,
    /// Directus static access token.
    pub directus_token: String,
    /// CukCuk OpenAPI base URL.
    pub cukcuk_base_url: String,
    pub cukcuk_secret_key: String,
    pub cukcuk_domain: String,
    pub cukcuk_app_id: String,
    pub cukcuk_company_code: String,
    /// Upper bound on reconciliation chunk sizes (entity defaults are
    /// clamped to this).
    pub batch_size: usize,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub timeout_secs: u64,
    /// Pause between reconciliation chunks to throttle the target store.
    pub batch_pause_ms: u64,
    /// Enabled entity types; disabled types are logged as skipped.
    pub sync_types: Vec<EntityType>,
    /// Entries in the declared sync types that matched no known entity
    /// type. Carried so `validate` can reject them instead of silently
    /// disabling a misspelled type.
    #[serde(skip)]
    pub unknown_sync_types: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            directus_url: String::new(),
            directus_token: String::new(),
            cukcuk_base_url: "https://graphapi.cukcuk.vn".to_string(),
            cukcuk_secret_key: String::new(),
            cukcuk_domain: String::new(),
            cukcuk_app_id: String::new(),
            cukcuk_company_code: String::new(),
            batch_size: 200,
            max_retries: 3,
            retry_delay_ms: 1000,
            timeout_secs: 30,
            batch_pause_ms: 1000,
            sync_types: EntityType::ALL.to_vec(),
            unknown_sync_types: Vec::new(),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Splits a comma-separated sync-type declaration into recognized entity
/// types and the names that matched nothing.
fn parse_sync_types(raw: &str) -> (Vec<EntityType>, Vec<String>) {
    let mut known = Vec::new();
    let mut unknown = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        match EntityType::parse(part) {
            Some(entity) => known.push(entity),
            None => unknown.push(part.to_string()),
        }
    }
    (known, unknown)
}

impl SyncConfig {
    /// Reads configuration from the environment, applying defaults for the
    /// tunables. Missing required values are reported by `validate`, not
    /// here.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let sync_types_raw = env_or("SYNC_TYPES", "");
        let (sync_types, unknown_sync_types) = if sync_types_raw.trim().is_empty() {
            (defaults.sync_types.clone(), Vec::new())
        } else {
            parse_sync_types(&sync_types_raw)
        };

        Self {
            directus_url: env_or("DIRECTUS_URL", ""),
            directus_token: env_or("DIRECTUS_TOKEN", ""),
            cukcuk_base_url: env_or("CUKCUK_BASE_URL", &defaults.cukcuk_base_url),
            cukcuk_secret_key: env_or("CUKCUK_SECRET_KEY", ""),
            cukcuk_domain: env_or("CUKCUK_DOMAIN", ""),
            cukcuk_app_id: env_or("CUKCUK_APP_ID", ""),
            cukcuk_company_code: env_or("CUKCUK_COMPANY_CODE", ""),
            batch_size: env_or("SYNC_BATCH_SIZE", "200").parse().unwrap_or(200),
            max_retries: env_or("SYNC_MAX_RETRIES", "3").parse().unwrap_or(3),
            retry_delay_ms: env_or("SYNC_RETRY_DELAY_MS", "1000").parse().unwrap_or(1000),
            timeout_secs: env_or("SYNC_TIMEOUT_SECS", "30").parse().unwrap_or(30),
            batch_pause_ms: env_or("SYNC_BATCH_PAUSE_MS", "1000").parse().unwrap_or(1000),
            sync_types,
            unknown_sync_types,
        }
    }

    /// Validates required connection parameters and tunable bounds. A
    /// failed validation is fatal to the whole run before any entity sync
    /// starts.
    pub fn validate(&self) -> ValidationReport {
        let mut errors = Vec::new();

        if self.directus_url.trim().is_empty() {
            errors.push("directus_url is required".to_string());
        } else if Url::parse(&self.directus_url).is_err() {
            errors.push(format!("directus_url is not a valid URL: {}", self.directus_url));
        }
        if self.directus_token.trim().is_empty() {
            errors.push("directus_token is required".to_string());
        }

        if self.cukcuk_base_url.trim().is_empty() {
            errors.push("cukcuk_base_url is required".to_string());
        } else if Url::parse(&self.cukcuk_base_url).is_err() {
            errors.push(format!(
                "cukcuk_base_url is not a valid URL: {}",
                self.cukcuk_base_url
            ));
        }
        for (name, value) in [
            ("cukcuk_secret_key", &self.cukcuk_secret_key),
            ("cukcuk_domain", &self.cukcuk_domain),
            ("cukcuk_app_id", &self.cukcuk_app_id),
            ("cukcuk_company_code", &self.cukcuk_company_code),
        ] {
            if value.trim().is_empty() {
                errors.push(format!("{} is required", name));
            }
        }

        if !(1..=500).contains(&self.batch_size) {
            errors.push(format!("batch_size must be within 1..=500, got {}", self.batch_size));
        }
        if self.max_retries > 10 {
            errors.push(format!("max_retries must be within 0..=10, got {}", self.max_retries));
        }
        if !(100..=60_000).contains(&self.retry_delay_ms) {
            errors.push(format!(
                "retry_delay_ms must be within 100..=60000, got {}",
                self.retry_delay_ms
            ));
        }
        if !(1..=300).contains(&self.timeout_secs) {
            errors.push(format!(
                "timeout_secs must be within 1..=300, got {}",
                self.timeout_secs
            ));
        }
        if self.sync_types.is_empty() {
            errors.push("sync_types must name at least one entity type".to_string());
        }
        for name in &self.unknown_sync_types {
            errors.push(format!(
                "sync_types contains an unknown entity type: {}",
                name
            ));
        }

        ValidationReport {
            valid: errors.is_empty(),
            errors,
        }
    }

    pub fn is_enabled(&self, entity: EntityType) -> bool {
        self.sync_types.contains(&entity)
    }

    /// Entity chunk size clamped to the configured upper bound.
    pub fn chunk_size(&self, entity: EntityType) -> usize {
        entity.batch_size().min(self.batch_size).max(1)
    }
}
