// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod config;
pub mod error;
pub mod metrics;
pub mod model;
pub mod store;

// Scoring and text rules (data-driven via config/curation.toml)
pub mod categorize;
pub mod posts;
pub mod relevance;

// Cycles: feed ingestion, content enrichment, lifecycle and publishing
pub mod curator;
pub mod enrich;
pub mod ingest;
pub mod lifecycle;
pub mod publish;
pub mod scheduler;

// ---- Re-exports for stable public API ----
pub use crate::curator::{AutoPolicy, Curator, CuratorDeps, DashboardStats};
pub use crate::error::{CurationError, CurationResult};
pub use crate::lifecycle::{LifecycleController, PublishReport};
pub use crate::store::{CurationStore, MemoryStore};
