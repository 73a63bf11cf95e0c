//! murmur - Voice-note enrichment pipeline
//!
//! Captured voice notes are progressively enriched (transcribed, analyzed,
//! embedded) in the background, then made searchable and summarizable.
//!
//! # Architecture
//!
//! - Every entry moves through a per-entry state machine:
//!   captured → transcribed → analyzed → embedded
//! - Each stage is one provider call followed by one atomic store update
//! - Observers attach auxiliary context at fixed hook points
//! - Search and analytics are read-only queries over the entry store
//!
//! # Modules
//!
//! - `adapters`: Provider interfaces and backends (whisper, OpenAI-compatible)
//! - `core`: Store, pipeline, hooks, search, analytics, and the `Journal` facade
//! - `domain`: Data structures (Entry, EntryState, reports)
//! - `ingest`: Content-addressed audio storage
//! - `plugins`: Built-in observers (sessions, activity)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Capture a typed note
//! murmur add --text "Meeting went well" --context work
//!
//! # Search and summarize
//! murmur search "budget" --threshold 0.5
//! murmur digest weekly --narrative
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod ingest;
pub mod plugins;

// Re-export main types at crate root for convenience
pub use crate::core::{EnrichmentPipeline, Journal, PipelineError};
pub use domain::{Entry, EntryId, EntryState, NewEntry, Stage};
