// src/lib.rs

pub mod config;
pub mod services;
pub mod types;
pub mod utils;

pub use config::SyncConfig;
pub use services::orchestrator::Orchestrator;
pub use types::{BatchStats, Checkpoint, EntityType, RunSummary, SyncLogEntry, SyncStatus};
pub use utils::{SyncError, SyncResult};

/// Constant tag identifying records that originate from the CukCuk platform.
pub const EXTERNAL_SOURCE: &str = "cukcuk";
