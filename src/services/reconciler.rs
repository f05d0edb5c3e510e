// src/services/reconciler.rs

use chrono::Utc;
use serde_json::{json, Value};

use crate::log_warn;
use crate::services::directus::{item_id, TargetStore};
use crate::types::{BatchStats, MappedRecord};
use crate::utils::SyncResult;

enum Reconciled {
    Created,
    Updated,
}

/// Upserts validated records into the target store one at a time,
/// continuing past individual failures. Batch-size-agnostic; chunking and
/// inter-batch pauses belong to the orchestrator.
pub struct Reconciler<'a> {
    store: &'a dyn TargetStore,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a dyn TargetStore) -> Self {
        Self { store }
    }

    /// Reconciles one batch into `collection`, returning its statistics.
    /// A per-record failure increments `failed`, records an error
    /// descriptor, and best-effort flags any pre-existing row as
    /// `sync_status: "failed"` before moving on.
    pub async fn reconcile(&self, records: &[MappedRecord], collection: &str) -> BatchStats {
        let mut stats = BatchStats::default();

        for record in records {
            stats.processed += 1;
            let external_id = record.external_id().to_string();

            match self.reconcile_one(record, &external_id, collection).await {
                Ok(Reconciled::Created) => stats.created += 1,
                Ok(Reconciled::Updated) => stats.updated += 1,
                Err(err) => {
                    log_warn!(
                        "Record reconciliation failed",
                        json!({
                            "collection": collection,
                            "external_id": external_id,
                            "error": err.to_string(),
                        })
                    );
                    stats.record_failure(&external_id, &err.to_string());
                    self.mark_failed(collection, &external_id).await;
                }
            }
        }

        stats
    }

    async fn reconcile_one(
        &self,
        record: &MappedRecord,
        external_id: &str,
        collection: &str,
    ) -> SyncResult<Reconciled> {
        let payload = stamped_payload(record);
        match self.store.find_by_external_id(collection, external_id).await? {
            Some(existing) => {
                let id = item_id(&existing).ok_or_else(|| {
                    crate::utils::SyncError::database_error(format!(
                        "Existing row for {} has no primary key",
                        external_id
                    ))
                })?;
                self.store.update_item(collection, &id, &payload).await?;
                Ok(Reconciled::Updated)
            }
            None => {
                self.store.create_item(collection, &payload).await?;
                Ok(Reconciled::Created)
            }
        }
    }

    /// Best-effort follow-up after a failed create/update: flag any
    /// pre-existing matching row so operators can query for stragglers.
    /// Failures here are swallowed; they must never mask the original
    /// error.
    async fn mark_failed(&self, collection: &str, external_id: &str) {
        if let Ok(Some(existing)) = self.store.find_by_external_id(collection, external_id).await {
            if let Some(id) = item_id(&existing) {
                let _ = self
                    .store
                    .update_item(collection, &id, &json!({ "sync_status": "failed" }))
                    .await;
            }
        }
    }
}

/// The record's fields plus the sync-status stamp written on every
/// successful create/update.
fn stamped_payload(record: &MappedRecord) -> Value {
    let mut payload = record.fields.clone();
    payload.insert("sync_status".to_string(), json!("synced"));
    payload.insert(
        "last_sync_at".to_string(),
        json!(Utc::now().to_rfc3339()),
    );
    Value::Object(payload)
}
