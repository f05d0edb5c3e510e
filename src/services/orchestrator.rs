// src/services/orchestrator.rs

use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashMap;
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::services::collector::Collector;
use crate::services::cukcuk::SourcePos;
use crate::services::directus::TargetStore;
use crate::services::mapper;
use crate::services::reconciler::Reconciler;
use crate::types::{
    BatchStats, EntityOutcome, EntityType, LookupMap, RunSummary, SourceRecord, SyncLogEntry,
    SyncState, SyncStatus,
};
use crate::utils::{SyncError, SyncResult};
use crate::{log_error, log_info, log_success, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone)]
pub struct SystemHealth {
    pub status: HealthStatus,
    pub latency_ms: Option<f64>,
    pub message: Option<String>,
}

impl SystemHealth {
    fn from_probe(result: SyncResult<f64>) -> Self {
        match result {
            Ok(latency_ms) => Self {
                status: HealthStatus::Healthy,
                latency_ms: Some(latency_ms),
                message: None,
            },
            Err(err) => Self {
                status: HealthStatus::Unhealthy,
                latency_ms: None,
                message: Some(err.to_string()),
            },
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Health of both remote systems. Produced by `Orchestrator::health_check`,
/// which never fails; an unreachable system shows up as `Unhealthy`.
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub cukcuk: SystemHealth,
    pub directus: SystemHealth,
}

impl HealthReport {
    pub fn all_healthy(&self) -> bool {
        self.cukcuk.is_healthy() && self.directus.is_healthy()
    }
}

/// Sequences entity-type syncs in dependency order, owns run-level
/// statistics, and writes the audit trail.
pub struct Orchestrator<'a> {
    config: &'a SyncConfig,
    source: &'a dyn SourcePos,
    store: &'a dyn TargetStore,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        config: &'a SyncConfig,
        source: &'a dyn SourcePos,
        store: &'a dyn TargetStore,
    ) -> Self {
        Self {
            config,
            source,
            store,
        }
    }

    /// Probes both remote systems independently. Never returns an error;
    /// failures are captured as unhealthy status.
    pub async fn health_check(&self) -> HealthReport {
        HealthReport {
            cukcuk: SystemHealth::from_probe(self.source.health().await),
            directus: SystemHealth::from_probe(self.store.health().await),
        }
    }

    /// Runs one full sync: configuration validation, health checks, then
    /// branches, categories, menu items, and tables in that fixed order.
    /// Configuration and connectivity failures abort the run; a failure
    /// inside one entity type is recorded and the remaining types still
    /// run.
    pub async fn run(&self) -> SyncResult<RunSummary> {
        let report = self.config.validate();
        if !report.valid {
            return Err(SyncError::config_error(format!(
                "Invalid configuration: {}",
                report.errors.join("; ")
            )));
        }

        let health = self.health_check().await;
        log_info!(
            "Health check",
            json!({
                "cukcuk": {
                    "healthy": health.cukcuk.is_healthy(),
                    "latency_ms": health.cukcuk.latency_ms,
                    "message": health.cukcuk.message,
                },
                "directus": {
                    "healthy": health.directus.is_healthy(),
                    "latency_ms": health.directus.latency_ms,
                    "message": health.directus.message,
                },
            })
        );
        if !health.all_healthy() {
            return Err(SyncError::network_error(
                "Aborting run: one or more remote systems are unhealthy",
            ));
        }

        let run_id = Uuid::new_v4();
        log_info!(
            "Sync run starting",
            json!({
                "run_id": run_id,
                "sync_types": self.config.sync_types,
            })
        );

        let mut states: HashMap<EntityType, SyncState> = EntityType::ALL
            .iter()
            .map(|e| (*e, SyncState::NotStarted))
            .collect();
        let mut summary = RunSummary::default();

        for entity in EntityType::ALL {
            debug_assert_eq!(states.get(&entity), Some(&SyncState::NotStarted));
            let outcome = if self.config.is_enabled(entity) {
                states.insert(entity, SyncState::Running);
                self.sync_entity(entity).await
            } else {
                self.skip_entity(entity).await
            };
            let terminal = SyncState::from_status(outcome.status);
            states.insert(entity, terminal);
            crate::log_debug!(
                "Entity state transition",
                json!({ "entity": entity, "state": format!("{:?}", terminal) })
            );
            summary.push(outcome);
        }

        let level_meta = json!({
            "run_id": run_id,
            "processed": summary.total_processed(),
            "created": summary.total_created(),
            "updated": summary.total_updated(),
            "failed": summary.total_failed(),
        });
        if summary.succeeded() {
            log_success!("Sync run completed", level_meta);
        } else {
            log_warn!("Sync run completed with failures", level_meta);
        }

        Ok(summary)
    }

    async fn skip_entity(&self, entity: EntityType) -> EntityOutcome {
        let now = Utc::now();
        log_info!(
            "Entity type disabled by configuration, skipping",
            json!({ "entity": entity })
        );
        let stats = BatchStats::default();
        let entry = SyncLogEntry::new(entity, SyncStatus::Skipped, &stats, now, now, None, None);
        self.write_log(&entry).await;
        EntityOutcome {
            entity,
            status: SyncStatus::Skipped,
            stats,
            error: None,
        }
    }

    async fn sync_entity(&self, entity: EntityType) -> EntityOutcome {
        let started_at = Utc::now();
        log_info!("Entity sync starting", json!({ "entity": entity }));

        let result = self.sync_entity_inner(entity).await;
        let completed_at = Utc::now();

        match result {
            Ok((stats, metrics)) => {
                let status = if stats.failed == 0 {
                    SyncStatus::Completed
                } else {
                    SyncStatus::Partial
                };
                let last_error = stats.errors.last().map(|e| e.message.clone());
                let entry = SyncLogEntry::new(
                    entity,
                    status,
                    &stats,
                    started_at,
                    completed_at,
                    last_error,
                    Some(metrics),
                );
                self.write_log(&entry).await;
                log_success!(
                    "Entity sync finished",
                    json!({
                        "entity": entity,
                        "status": status.as_str(),
                        "processed": stats.processed,
                        "created": stats.created,
                        "updated": stats.updated,
                        "failed": stats.failed,
                    })
                );
                EntityOutcome {
                    entity,
                    status,
                    stats,
                    error: None,
                }
            }
            Err(err) => {
                let stats = BatchStats::default();
                let entry = SyncLogEntry::new(
                    entity,
                    SyncStatus::Failed,
                    &stats,
                    started_at,
                    completed_at,
                    Some(err.to_string()),
                    None,
                );
                self.write_log(&entry).await;
                log_error!(
                    "Entity sync failed",
                    json!({ "entity": entity, "error": err.to_string() })
                );
                EntityOutcome {
                    entity,
                    status: SyncStatus::Failed,
                    stats,
                    error: Some(err.to_string()),
                }
            }
        }
    }

    async fn sync_entity_inner(&self, entity: EntityType) -> SyncResult<(BatchStats, Value)> {
        let records = self.fetch_source_records(entity).await?;
        let (branch_lookup, category_lookup) = self.build_lookups(entity).await?;

        let outcome = mapper::map_batch(&records, entity, &branch_lookup, &category_lookup);

        let mut stats = BatchStats::default();
        for error in &outcome.errors {
            stats.processed += 1;
            stats.record_failure(&error.external_id, &error.messages.join("; "));
        }

        let reconciler = Reconciler::new(self.store);
        let chunk_size = self.config.chunk_size(entity);
        let mut batches = 0usize;
        for (index, chunk) in outcome.results.chunks(chunk_size).enumerate() {
            if index > 0 && self.config.batch_pause_ms > 0 {
                // Deliberate pause so large catalogs do not hammer the
                // target store.
                tokio::time::sleep(std::time::Duration::from_millis(self.config.batch_pause_ms))
                    .await;
            }
            let batch = reconciler.reconcile(chunk, entity.collection()).await;
            stats.merge(batch);
            batches += 1;
        }

        let metrics = json!({
            "fetched": records.len(),
            "mapped": outcome.success_count,
            "mapping_failures": outcome.error_count,
            "batches": batches,
            "chunk_size": chunk_size,
        });
        Ok((stats, metrics))
    }

    async fn fetch_source_records(&self, entity: EntityType) -> SyncResult<Vec<SourceRecord>> {
        match entity {
            EntityType::Branches => self.source.list_branches(true).await,
            EntityType::Categories => self.source.list_categories(true).await,
            EntityType::MenuItems => {
                Collector::new(self.source)
                    .collect_menu_items(false, None, None, None)
                    .await
            }
            EntityType::Tables => self.fetch_tables().await,
        }
    }

    /// Tables are fetched per branch; like the collector, one branch's
    /// failure only loses that branch's tables.
    async fn fetch_tables(&self) -> SyncResult<Vec<SourceRecord>> {
        let branches = self.source.list_branches(false).await?;
        let mut records = Vec::new();
        for branch in &branches {
            let branch_name = branch.get_str("Name").unwrap_or_default().to_string();
            match self.source.list_tables_for_branch(&branch.external_id).await {
                Ok(tables) => {
                    for mut table in tables {
                        table
                            .fields
                            .insert("BranchId".to_string(), json!(branch.external_id));
                        table
                            .fields
                            .insert("BranchName".to_string(), json!(branch_name));
                        records.push(table);
                    }
                }
                Err(err) => {
                    log_warn!(
                        "Table listing failed for branch",
                        json!({ "branch_id": branch.external_id, "error": err.to_string() })
                    );
                }
            }
        }
        Ok(records)
    }

    async fn build_lookups(&self, entity: EntityType) -> SyncResult<(LookupMap, LookupMap)> {
        match entity {
            EntityType::MenuItems => Ok((
                self.store.build_lookup(EntityType::Branches.collection()).await?,
                self.store
                    .build_lookup(EntityType::Categories.collection())
                    .await?,
            )),
            EntityType::Tables => Ok((
                self.store.build_lookup(EntityType::Branches.collection()).await?,
                LookupMap::new(),
            )),
            _ => Ok((LookupMap::new(), LookupMap::new())),
        }
    }

    /// Audit-log writes must not fail the sync they describe.
    async fn write_log(&self, entry: &SyncLogEntry) {
        if let Err(err) = self.store.write_sync_log(entry).await {
            log_warn!(
                "Failed to write sync log entry",
                json!({ "sync_type": entry.sync_type, "error": err.to_string() })
            );
        }
    }
}
