//! Derived reports: pattern reports and digests.
//!
//! Neither is persisted; both are recomputed from the entry store on every
//! request.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::entry::EntryId;
use super::hook::HookContribution;

/// Half-open time range `[from, to)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl DateRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.from && at < self.to
    }
}

/// A label with an occurrence count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelCount {
    pub label: String,
    pub count: usize,
}

/// Mean sentiment for one calendar day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySentiment {
    pub date: NaiveDate,
    pub avg_sentiment: f64,
    pub entries: usize,
}

/// Entry count for one hour of the day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveHour {
    /// Hour of day, 0-23, in the configured reporting offset
    pub hour: u32,
    pub count: usize,
    /// Most frequent mood among entries recorded in this hour
    pub dominant_mood: Option<String>,
}

/// Statistics over a trailing window of entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternReport {
    pub range: DateRange,

    /// Entries in the window
    pub total_entries: usize,

    /// Entries in the window that carry analysis fields
    pub analyzed_entries: usize,

    /// Mean sentiment score over analyzed entries
    pub avg_sentiment: Option<f64>,

    /// Top 10 topics by count
    pub top_topics: Vec<LabelCount>,

    /// Count per mood, descending
    pub mood_distribution: Vec<LabelCount>,

    /// Mean sentiment per calendar day, chronological
    pub sentiment_trend: Vec<DailySentiment>,

    /// Top 5 hours of the day by entry count
    pub active_hours: Vec<ActiveHour>,

    /// Entry count per weekday, Sunday first
    pub day_of_week: Vec<LabelCount>,
}

/// Result of a pattern query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PatternOutcome {
    /// The window contained entries
    Report(PatternReport),

    /// The window was empty
    NoEntries { range: DateRange },
}

impl PatternOutcome {
    pub fn report(&self) -> Option<&PatternReport> {
        match self {
            PatternOutcome::Report(report) => Some(report),
            PatternOutcome::NoEntries { .. } => None,
        }
    }
}

/// Calendar alignment of a digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestPeriod {
    /// One calendar day
    Daily,

    /// Sunday through Saturday
    Weekly,
}

/// Summary line for one entry in a digest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Highlight {
    pub entry_id: EntryId,
    pub timestamp: DateTime<Utc>,
    pub summary: String,
}

/// Narrative fields produced by the narrative-generation provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Narrative {
    pub headline: String,
    pub summary: String,
    #[serde(default)]
    pub highlights: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

/// Aggregate (and optionally narrative) summary of a calendar window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Digest {
    pub period: DigestPeriod,
    pub range: DateRange,
    pub entry_count: usize,
    pub avg_sentiment: Option<f64>,
    pub sentiment_breakdown: Vec<LabelCount>,
    pub top_topics: Vec<LabelCount>,
    pub moods: Vec<LabelCount>,
    pub action_items: Vec<String>,
    pub highlights: Vec<Highlight>,

    /// Advisory context returned by observers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contributions: Vec<HookContribution>,

    /// Present only when requested and the provider succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrative: Option<Narrative>,
}
