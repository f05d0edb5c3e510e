// src/types.rs

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// Association from a source-native id to the target-store primary key.
/// Built fresh from the target store at the start of each run.
pub type LookupMap = HashMap<String, String>;

/// Per-record error descriptors are capped so a pathological batch cannot
/// balloon run statistics.
pub const MAX_RECORD_ERRORS: usize = 50;

/// The entity types the engine knows how to synchronize, in required sync
/// order: branches and categories first because menu items and tables
/// reference them through lookup maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Branches,
    Categories,
    MenuItems,
    Tables,
}

impl EntityType {
    pub const ALL: [EntityType; 4] = [
        EntityType::Branches,
        EntityType::Categories,
        EntityType::MenuItems,
        EntityType::Tables,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Branches => "branches",
            EntityType::Categories => "categories",
            EntityType::MenuItems => "menu_items",
            EntityType::Tables => "tables",
        }
    }

    /// Target-store collection holding this entity type.
    pub fn collection(&self) -> &'static str {
        self.as_str()
    }

    /// Reconciliation chunk size. Menu items run in larger chunks because
    /// catalogs reach thousands of records; the reference collections stay
    /// small.
    pub fn batch_size(&self) -> usize {
        match self {
            EntityType::MenuItems => 200,
            _ => 50,
        }
    }

    pub fn parse(s: &str) -> Option<EntityType> {
        match s.trim().to_lowercase().as_str() {
            "branches" => Some(EntityType::Branches),
            "categories" => Some(EntityType::Categories),
            "menu_items" => Some(EntityType::MenuItems),
            "tables" => Some(EntityType::Tables),
            _ => None,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An entity as returned by the source system: a source-native id plus a
/// loosely typed payload (optional fields absent rather than null).
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    pub external_id: String,
    pub fields: Map<String, Value>,
}

impl SourceRecord {
    pub fn new(external_id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            external_id: external_id.into(),
            fields,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|v| v.as_str())
    }
}

/// The target-store representation of a source record after field mapping:
/// a flat record keyed by target schema names, always carrying
/// `external_id` and `external_source`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MappedRecord {
    pub fields: Map<String, Value>,
}

impl MappedRecord {
    pub fn new() -> Self {
        Self { fields: Map::new() }
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        self.fields.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|v| v.as_str())
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(|v| v.as_f64())
    }

    pub fn external_id(&self) -> &str {
        self.get_str("external_id").unwrap_or_default()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

/// Resumable cursor into a branch-partitioned paginated collection. The
/// engine only produces and consumes this shape; persisting it is the
/// caller's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub branch_id: String,
    pub page: u32,
}

impl Checkpoint {
    pub fn new(branch_id: impl Into<String>, page: u32) -> Self {
        Self {
            branch_id: branch_id.into(),
            page,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordError {
    pub external_id: String,
    pub message: String,
}

/// Per-batch counters, mutated only by the reconciler driving the batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchStats {
    pub processed: u64,
    pub created: u64,
    pub updated: u64,
    pub failed: u64,
    pub errors: Vec<RecordError>,
}

impl BatchStats {
    pub fn record_failure(&mut self, external_id: &str, message: &str) {
        self.failed += 1;
        if self.errors.len() < MAX_RECORD_ERRORS {
            self.errors.push(RecordError {
                external_id: external_id.to_string(),
                message: message.to_string(),
            });
        }
    }

    /// Folds another batch's counters into this one.
    pub fn merge(&mut self, other: BatchStats) {
        self.processed += other.processed;
        self.created += other.created;
        self.updated += other.updated;
        self.failed += other.failed;
        for err in other.errors {
            if self.errors.len() >= MAX_RECORD_ERRORS {
                break;
            }
            self.errors.push(err);
        }
    }
}

/// Status of one entity-type sync, persisted on the audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Completed,
    Failed,
    Skipped,
    Partial,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Completed => "completed",
            SyncStatus::Failed => "failed",
            SyncStatus::Skipped => "skipped",
            SyncStatus::Partial => "partial",
        }
    }
}

/// Per-entity-type state machine. Terminal states are never re-entered
/// within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    NotStarted,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl SyncState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncState::Completed | SyncState::Failed | SyncState::Skipped
        )
    }

    pub fn from_status(status: SyncStatus) -> Self {
        match status {
            // Partial runs still reached the end of the entity sync.
            SyncStatus::Completed | SyncStatus::Partial => SyncState::Completed,
            SyncStatus::Failed => SyncState::Failed,
            SyncStatus::Skipped => SyncState::Skipped,
        }
    }
}

/// Immutable audit record written to the target store per entity-type run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncLogEntry {
    pub sync_type: String,
    pub source: String,
    pub status: SyncStatus,
    pub records_processed: u64,
    pub records_created: u64,
    pub records_updated: u64,
    pub records_failed: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance_metrics: Option<Value>,
    pub batch_id: String,
}

impl SyncLogEntry {
    pub fn new(
        entity: EntityType,
        status: SyncStatus,
        stats: &BatchStats,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        last_error_message: Option<String>,
        performance_metrics: Option<Value>,
    ) -> Self {
        let duration_seconds =
            (completed_at - started_at).num_milliseconds().max(0) as f64 / 1000.0;
        Self {
            sync_type: entity.as_str().to_string(),
            source: crate::EXTERNAL_SOURCE.to_string(),
            status,
            records_processed: stats.processed,
            records_created: stats.created,
            records_updated: stats.updated,
            records_failed: stats.failed,
            started_at,
            completed_at,
            duration_seconds,
            last_error_message,
            performance_metrics,
            batch_id: generate_batch_id(entity, started_at),
        }
    }
}

/// Batch id format: `{sync_type}-{sanitized iso timestamp}-{random6}`.
pub fn generate_batch_id(entity: EntityType, at: DateTime<Utc>) -> String {
    let sanitized = at
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    let random6: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect();
    format!("{}-{}-{}", entity.as_str(), sanitized, random6)
}

/// Outcome of one entity type within a run.
#[derive(Debug, Clone)]
pub struct EntityOutcome {
    pub entity: EntityType,
    pub status: SyncStatus,
    pub stats: BatchStats,
    pub error: Option<String>,
}

/// Run-level aggregate across all entity types. The caller-visible run
/// outcome, not a thrown error.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub outcomes: Vec<EntityOutcome>,
}

impl RunSummary {
    pub fn push(&mut self, outcome: EntityOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn total_processed(&self) -> u64 {
        self.outcomes.iter().map(|o| o.stats.processed).sum()
    }

    pub fn total_created(&self) -> u64 {
        self.outcomes.iter().map(|o| o.stats.created).sum()
    }

    pub fn total_updated(&self) -> u64 {
        self.outcomes.iter().map(|o| o.stats.updated).sum()
    }

    pub fn total_failed(&self) -> u64 {
        self.outcomes.iter().map(|o| o.stats.failed).sum()
    }

    /// True when no record failed and no entity sync aborted.
    pub fn succeeded(&self) -> bool {
        self.total_failed() == 0
            && !self.outcomes.iter().any(|o| o.status == SyncStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_entity_type_roundtrip() {
        for entity in EntityType::ALL {
            assert_eq!(EntityType::parse(entity.as_str()), Some(entity));
        }
        assert_eq!(EntityType::parse("orders"), None);
    }

    #[test]
    fn test_batch_size_defaults() {
        assert_eq!(EntityType::MenuItems.batch_size(), 200);
        assert_eq!(EntityType::Branches.batch_size(), 50);
        assert_eq!(EntityType::Tables.batch_size(), 50);
    }

    #[test]
    fn test_batch_stats_merge() {
        let mut total = BatchStats::default();
        let mut batch = BatchStats::default();
        batch.processed = 10;
        batch.created = 6;
        batch.updated = 3;
        batch.record_failure("M7", "boom");
        total.merge(batch);
        assert_eq!(total.processed, 10);
        assert_eq!(total.created, 6);
        assert_eq!(total.updated, 3);
        assert_eq!(total.failed, 1);
        assert_eq!(total.errors.len(), 1);
    }

    #[test]
    fn test_record_error_cap() {
        let mut stats = BatchStats::default();
        for i in 0..(MAX_RECORD_ERRORS + 20) {
            stats.record_failure(&format!("id-{}", i), "failed");
        }
        assert_eq!(stats.failed as usize, MAX_RECORD_ERRORS + 20);
        assert_eq!(stats.errors.len(), MAX_RECORD_ERRORS);
    }

    #[test]
    fn test_batch_id_format() {
        let at = chrono::Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 45).unwrap();
        let id = generate_batch_id(EntityType::MenuItems, at);
        assert!(id.starts_with("menu_items-2024-05-01T12-30-45"));
        assert!(!id.contains(':'));
        assert!(!id.contains('.'));
        let suffix = id.rsplit('-').next().unwrap();
        assert_eq!(suffix.len(), 6);
    }

    #[test]
    fn test_sync_log_entry_duration() {
        let started = chrono::Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let completed = started + chrono::Duration::milliseconds(2500);
        let entry = SyncLogEntry::new(
            EntityType::Branches,
            SyncStatus::Completed,
            &BatchStats::default(),
            started,
            completed,
            None,
            None,
        );
        assert_eq!(entry.duration_seconds, 2.5);
        assert_eq!(entry.source, "cukcuk");
        assert_eq!(entry.sync_type, "branches");
    }

    #[test]
    fn test_run_summary_outcome() {
        let mut summary = RunSummary::default();
        let mut stats = BatchStats::default();
        stats.processed = 5;
        stats.created = 5;
        summary.push(EntityOutcome {
            entity: EntityType::Branches,
            status: SyncStatus::Completed,
            stats,
            error: None,
        });
        assert!(summary.succeeded());

        let mut failed_stats = BatchStats::default();
        failed_stats.processed = 2;
        failed_stats.record_failure("X", "nope");
        summary.push(EntityOutcome {
            entity: EntityType::Tables,
            status: SyncStatus::Partial,
            stats: failed_stats,
            error: None,
        });
        assert!(!summary.succeeded());
        assert_eq!(summary.total_processed(), 7);
        assert_eq!(summary.total_failed(), 1);
    }

    #[test]
    fn test_sync_state_transitions() {
        assert!(!SyncState::Running.is_terminal());
        assert!(SyncState::from_status(SyncStatus::Partial).is_terminal());
        assert_eq!(SyncState::from_status(SyncStatus::Failed), SyncState::Failed);
        assert_eq!(SyncState::from_status(SyncStatus::Skipped), SyncState::Skipped);
    }
}
