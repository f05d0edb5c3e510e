// src/services/mod.rs

pub mod collector;
pub mod cukcuk;
pub mod directus;
pub mod mapper;
pub mod orchestrator;
pub mod reconciler;
pub mod retry;

pub use collector::{CheckpointSink, Collector};
pub use cukcuk::{CukcukClient, ItemPage, SourcePos};
pub use directus::{DirectusClient, TargetStore};
pub use orchestrator::Orchestrator;
pub use reconciler::Reconciler;
pub use retry::RetryPolicy;
