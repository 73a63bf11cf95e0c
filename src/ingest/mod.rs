//! Audio ingestion.
//!
//! Audio captured by a device is imported into a content-addressed store
//! and referenced from entries by an opaque handle. The enrichment
//! pipeline resolves handles back to files when transcribing.

pub mod audio;

// Re-export key types
pub use audio::{compute_file_hash, AudioStore, AudioStoreError};
