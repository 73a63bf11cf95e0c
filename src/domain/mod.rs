//! Domain types for murmur.
//!
//! This module contains the core data structures:
//! - Entry: A captured voice note and its enrichment fields
//! - State: The per-entry enrichment state machine
//! - Hook: Hook points and observer contributions
//! - Report: Pattern reports and digests

pub mod entry;
pub mod hook;
pub mod report;
pub mod state;

// Re-export commonly used types
pub use entry::{
    Analysis, AnalysisResult, AudioRef, Entry, EntryId, EntryView, NewEntry, Sentiment,
    DEFAULT_CONTEXT, DEFAULT_DEVICE,
};
pub use hook::{HookContribution, HookPoint};
pub use report::{
    ActiveHour, DailySentiment, DateRange, Digest, DigestPeriod, Highlight, LabelCount,
    Narrative, PatternOutcome, PatternReport,
};
pub use state::{EntryState, Stage};
