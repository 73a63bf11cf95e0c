//! Entry records: one captured voice note and everything derived from it.
//!
//! Fields are populated monotonically by the enrichment pipeline. The
//! analysis fields live in a single [`Analysis`] value so that summary,
//! sentiment and mood can only ever be present together.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::hook::{HookContribution, HookPoint};

/// Entry identifier (creation-time derived, strictly increasing)
pub type EntryId = u64;

/// Default device tag when the capturing client does not supply one
pub const DEFAULT_DEVICE: &str = "web";

/// Default context tag when the capturing client does not supply one
pub const DEFAULT_CONTEXT: &str = "auto";

/// Opaque handle to externally stored audio
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AudioRef(String);

impl AudioRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AudioRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Overall sentiment label produced by analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
    Mixed,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
            Sentiment::Mixed => "mixed",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sentiment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "positive" => Ok(Sentiment::Positive),
            "negative" => Ok(Sentiment::Negative),
            "neutral" => Ok(Sentiment::Neutral),
            "mixed" => Ok(Sentiment::Mixed),
            other => Err(format!("unknown sentiment '{}'", other)),
        }
    }
}

/// Validated output of the text-analysis provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// One or two sentence summary of the note
    pub summary: String,

    /// Overall sentiment label
    pub sentiment: Sentiment,

    /// Sentiment strength, 0.0 (most negative) to 1.0 (most positive)
    pub sentiment_score: f64,

    /// Topics mentioned, deduplicated, in order of appearance
    pub topics: Vec<String>,

    /// Action items extracted from the note, in order
    pub action_items: Vec<String>,

    /// Single-word mood
    pub mood: String,
}

/// Wire shape accepted from providers (camelCase or snake_case keys)
#[derive(Debug, Deserialize)]
struct RawAnalysis {
    summary: Option<String>,
    sentiment: Option<String>,
    #[serde(alias = "sentimentScore")]
    sentiment_score: Option<f64>,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default, alias = "actionItems")]
    action_items: Vec<String>,
    mood: Option<String>,
}

impl AnalysisResult {
    /// Validate a provider's JSON object into an analysis result.
    ///
    /// Missing summary or mood, an unknown sentiment label, or a score
    /// outside 0.0..=1.0 are all rejected.
    pub fn from_value(value: Value) -> Result<Self, String> {
        if !value.is_object() {
            return Err("analysis response is not a JSON object".to_string());
        }

        let raw: RawAnalysis =
            serde_json::from_value(value).map_err(|e| format!("malformed analysis: {}", e))?;

        let summary = raw
            .summary
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or("analysis is missing a summary")?;

        let sentiment: Sentiment = raw
            .sentiment
            .ok_or("analysis is missing a sentiment")?
            .parse()?;

        let sentiment_score = raw
            .sentiment_score
            .ok_or("analysis is missing a sentiment score")?;
        if !(0.0..=1.0).contains(&sentiment_score) {
            return Err(format!(
                "sentiment score {} is outside 0.0..=1.0",
                sentiment_score
            ));
        }

        let mood = raw
            .mood
            .map(|m| m.trim().to_lowercase())
            .filter(|m| !m.is_empty())
            .ok_or("analysis is missing a mood")?;

        Ok(Self {
            summary,
            sentiment,
            sentiment_score,
            topics: dedupe_topics(raw.topics),
            action_items: raw
                .action_items
                .into_iter()
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect(),
            mood,
        })
    }
}

/// Trim, lowercase and deduplicate topics, keeping first occurrence order
fn dedupe_topics(topics: Vec<String>) -> Vec<String> {
    let mut seen: Vec<String> = Vec::with_capacity(topics.len());
    for topic in topics {
        let topic = topic.trim().to_lowercase();
        if !topic.is_empty() && !seen.contains(&topic) {
            seen.push(topic);
        }
    }
    seen
}

/// Analysis fields as stored on an entry (always written as one unit)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    #[serde(flatten)]
    pub result: AnalysisResult,

    /// When the analysis was written
    pub analyzed_at: DateTime<Utc>,
}

/// A captured voice note and its derived fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Unique, strictly increasing identifier
    pub id: EntryId,

    /// Logical event time (defaults to creation time)
    pub timestamp: DateTime<Utc>,

    /// When the entry was created
    pub created_at: DateTime<Utc>,

    /// Capturing device tag
    pub device: String,

    /// Free-form classification tag
    pub context: String,

    /// Handle to stored audio, absent for text-only entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_ref: Option<AudioRef>,

    /// Transcript text
    #[serde(default)]
    pub transcript: Option<String>,

    /// When the transcript was written
    #[serde(default)]
    pub transcribed_at: Option<DateTime<Utc>>,

    /// Analysis fields (summary, sentiment, topics, action items, mood)
    #[serde(default)]
    pub analysis: Option<Analysis>,

    /// Embedding vector of transcript + summary
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,

    /// When the embedding was written
    #[serde(default)]
    pub embedded_at: Option<DateTime<Utc>>,

    /// Whether the automatic pipeline reached a terminal state
    #[serde(default)]
    pub processed: bool,

    /// Advisory context attached by observers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hook_context: Vec<HookContribution>,
}

impl Entry {
    /// Build a fresh entry from ingestion input
    pub fn from_new(id: EntryId, new: NewEntry, now: DateTime<Utc>) -> Self {
        let transcript = new
            .transcript
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        let transcribed_at = transcript.as_ref().map(|_| now);

        Self {
            id,
            timestamp: new.timestamp.unwrap_or(now),
            created_at: now,
            device: new.device.unwrap_or_else(|| DEFAULT_DEVICE.to_string()),
            context: new.context.unwrap_or_else(|| DEFAULT_CONTEXT.to_string()),
            audio_ref: new.audio_ref,
            transcript,
            transcribed_at,
            analysis: None,
            embedding: None,
            embedded_at: None,
            processed: false,
            hook_context: Vec::new(),
        }
    }

    pub fn summary(&self) -> Option<&str> {
        self.analysis.as_ref().map(|a| a.result.summary.as_str())
    }

    pub fn sentiment(&self) -> Option<Sentiment> {
        self.analysis.as_ref().map(|a| a.result.sentiment)
    }

    pub fn sentiment_score(&self) -> Option<f64> {
        self.analysis.as_ref().map(|a| a.result.sentiment_score)
    }

    pub fn mood(&self) -> Option<&str> {
        self.analysis.as_ref().map(|a| a.result.mood.as_str())
    }

    pub fn topics(&self) -> &[String] {
        self.analysis
            .as_ref()
            .map(|a| a.result.topics.as_slice())
            .unwrap_or(&[])
    }

    pub fn action_items(&self) -> &[String] {
        self.analysis
            .as_ref()
            .map(|a| a.result.action_items.as_slice())
            .unwrap_or(&[])
    }

    pub fn analyzed_at(&self) -> Option<DateTime<Utc>> {
        self.analysis.as_ref().map(|a| a.analyzed_at)
    }

    /// Text fed to the embedder: transcript, then summary when present
    pub fn embedding_text(&self) -> Option<String> {
        let transcript = self.transcript.as_deref()?;
        Some(match self.summary() {
            Some(summary) => format!("{}\n\n{}", transcript, summary),
            None => transcript.to_string(),
        })
    }

    /// Replace all contributions previously attached for one hook point
    pub fn attach_context(&mut self, hook: HookPoint, contributions: Vec<HookContribution>) {
        self.hook_context.retain(|c| c.hook != hook);
        self.hook_context.extend(contributions);
    }
}

/// Ingestion input
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewEntry {
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub audio_ref: Option<AudioRef>,
    /// Text-only entries arrive already transcribed
    #[serde(default)]
    pub transcript: Option<String>,
}

impl NewEntry {
    pub fn text(transcript: impl Into<String>) -> Self {
        Self {
            transcript: Some(transcript.into()),
            ..Self::default()
        }
    }

    pub fn audio(audio_ref: AudioRef) -> Self {
        Self {
            audio_ref: Some(audio_ref),
            ..Self::default()
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Entry as returned to callers of search (no raw embedding)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryView {
    pub id: EntryId,
    pub timestamp: DateTime<Utc>,
    pub device: String,
    pub context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_ref: Option<AudioRef>,
    pub transcript: Option<String>,
    pub summary: Option<String>,
    pub sentiment: Option<Sentiment>,
    pub sentiment_score: Option<f64>,
    pub topics: Vec<String>,
    pub action_items: Vec<String>,
    pub mood: Option<String>,
    pub has_embedding: bool,
    pub processed: bool,
}

impl From<&Entry> for EntryView {
    fn from(entry: &Entry) -> Self {
        Self {
            id: entry.id,
            timestamp: entry.timestamp,
            device: entry.device.clone(),
            context: entry.context.clone(),
            audio_ref: entry.audio_ref.clone(),
            transcript: entry.transcript.clone(),
            summary: entry.summary().map(str::to_string),
            sentiment: entry.sentiment(),
            sentiment_score: entry.sentiment_score(),
            topics: entry.topics().to_vec(),
            action_items: entry.action_items().to_vec(),
            mood: entry.mood().map(str::to_string),
            has_embedding: entry.embedding.is_some(),
            processed: entry.processed,
        }
    }
}
