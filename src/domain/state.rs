//! Enrichment state machine for a single entry.
//!
//! ```text
//! Captured → Transcribing → Transcribed → Analyzing → Analyzed → Embedding → Embedded
//!                 ↓                           ↓                      ↓
//!          Failed(Transcribe)          Failed(Analyze)         Failed(Embed)
//! ```
//!
//! `Transcribed → Embedding` is also legal when analysis is not configured.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::entry::Entry;

/// One provider-backed pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Transcribe,
    Analyze,
    Embed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Transcribe => write!(f, "transcribe"),
            Stage::Analyze => write!(f, "analyze"),
            Stage::Embed => write!(f, "embed"),
        }
    }
}

/// Pipeline state of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "stage", rename_all = "snake_case")]
pub enum EntryState {
    Captured,
    Transcribing,
    Transcribed,
    Analyzing,
    Analyzed,
    Embedding,
    Embedded,
    Failed(Stage),
}

impl EntryState {
    /// Settled state implied by an entry's populated fields
    pub fn of(entry: &Entry) -> Self {
        if entry.embedding.is_some() {
            EntryState::Embedded
        } else if entry.analysis.is_some() {
            EntryState::Analyzed
        } else if entry.transcript.is_some() {
            EntryState::Transcribed
        } else {
            EntryState::Captured
        }
    }

    /// In-flight state for a stage
    pub fn running(stage: Stage) -> Self {
        match stage {
            Stage::Transcribe => EntryState::Transcribing,
            Stage::Analyze => EntryState::Analyzing,
            Stage::Embed => EntryState::Embedding,
        }
    }

    /// Settled state after a stage succeeds
    pub fn completed(stage: Stage) -> Self {
        match stage {
            Stage::Transcribe => EntryState::Transcribed,
            Stage::Analyze => EntryState::Analyzed,
            Stage::Embed => EntryState::Embedded,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            EntryState::Transcribing | EntryState::Analyzing | EntryState::Embedding
        )
    }

    /// Whether the automatic pipeline may move from `self` to `next`
    pub fn can_transition_to(&self, next: EntryState) -> bool {
        use EntryState::*;

        match (self, next) {
            (Captured, Transcribing) => true,
            (Transcribing, Transcribed) | (Transcribing, Failed(Stage::Transcribe)) => true,
            (Transcribed, Analyzing) | (Transcribed, Embedding) => true,
            (Analyzing, Analyzed) | (Analyzing, Failed(Stage::Analyze)) => true,
            (Analyzed, Embedding) => true,
            (Embedding, Embedded) | (Embedding, Failed(Stage::Embed)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryState::Captured => write!(f, "captured"),
            EntryState::Transcribing => write!(f, "transcribing"),
            EntryState::Transcribed => write!(f, "transcribed"),
            EntryState::Analyzing => write!(f, "analyzing"),
            EntryState::Analyzed => write!(f, "analyzed"),
            EntryState::Embedding => write!(f, "embedding"),
            EntryState::Embedded => write!(f, "embedded"),
            EntryState::Failed(stage) => write!(f, "failed({})", stage),
        }
    }
}
