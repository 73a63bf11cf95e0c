//! Core enrichment and query logic.
//!
//! This module contains:
//! - Store: The entry store boundary and its snapshot implementation
//! - Pipeline: The per-entry enrichment state machine
//! - Hooks: Observer registry and dispatch
//! - Search: Cosine-similarity ranking
//! - Analytics: Pattern reports and digests
//! - Journal: Facade wiring the above together

pub mod analytics;
pub mod hooks;
pub mod journal;
pub mod pipeline;
pub mod search;
pub mod store;

// Re-export commonly used types
pub use analytics::{digest_window, pattern_report, reporting_offset, Analytics};
pub use hooks::{HookCall, HookDispatcher, Observer, ObserverManifest, RegistrationError};
pub use journal::{EnrichmentTask, Journal};
pub use pipeline::{EnrichmentPipeline, PipelineError};
pub use search::{cosine_similarity, rank, SearchEngine, SearchHit, SearchOptions};
pub use store::{EntryMutation, EntryStore, SnapshotStore, StoreError};
