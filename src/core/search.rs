//! Semantic search over embedded entries.
//!
//! The query is embedded with the same provider used for entries and
//! compared against every stored vector. Entries without an embedding are
//! excluded, never scored as zero.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::adapters::Embedder;
use crate::domain::{Entry, EntryView, Stage};

use super::pipeline::PipelineError;
use super::store::EntryStore;

/// Default minimum similarity for a hit
pub const DEFAULT_THRESHOLD: f32 = 0.3;

/// Default maximum number of hits
pub const DEFAULT_LIMIT: usize = 10;

/// Cosine similarity of two vectors.
///
/// Returns `None` when the dimensions differ; zero-magnitude vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return Some(0.0);
    }

    Some(dot_product / (magnitude_a * magnitude_b))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    pub threshold: f32,
    pub limit: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            limit: DEFAULT_LIMIT,
        }
    }
}

/// One ranked result; the raw embedding is omitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub entry: EntryView,
    pub similarity: f32,
}

/// Rank entries against a query vector.
///
/// Keeps entries at or above `threshold`, sorted by descending similarity
/// with ties broken by most recent timestamp, truncated to `limit`.
pub fn rank(query: &[f32], entries: &[Entry], options: SearchOptions) -> Vec<SearchHit> {
    let mut scored: Vec<(&Entry, f32)> = entries
        .iter()
        .filter_map(|entry| {
            let vector = entry.embedding.as_deref()?;
            let similarity = cosine_similarity(query, vector)?;
            (similarity >= options.threshold).then_some((entry, similarity))
        })
        .collect();

    scored.sort_by(|(a, sa), (b, sb)| {
        sb.partial_cmp(sa)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.timestamp.cmp(&a.timestamp))
    });
    scored.truncate(options.limit);

    scored
        .into_iter()
        .map(|(entry, similarity)| SearchHit {
            entry: EntryView::from(entry),
            similarity,
        })
        .collect()
}

/// Case-insensitive substring match over transcripts, summaries and topics, newest first.
///
/// Used when no embedding provider is configured.
pub fn keyword_match(query: &str, entries: &[Entry], limit: usize) -> Vec<EntryView> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }

    let mut matches: Vec<&Entry> = entries
        .iter()
        .filter(|entry| {
            let in_transcript = entry
                .transcript
                .as_deref()
                .is_some_and(|t| t.to_lowercase().contains(&needle));
            let in_summary = entry
                .summary()
                .is_some_and(|s| s.to_lowercase().contains(&needle));
            let in_topics = entry.topics().iter().any(|t| t.contains(&needle));
            in_transcript || in_summary || in_topics
        })
        .collect();

    matches.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    matches.into_iter().take(limit).map(EntryView::from).collect()
}

/// Embeds queries and ranks the store's entries against them
pub struct SearchEngine {
    store: Arc<dyn EntryStore>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl SearchEngine {
    pub fn new(store: Arc<dyn EntryStore>, embedder: Option<Arc<dyn Embedder>>) -> Self {
        Self { store, embedder }
    }

    #[instrument(skip(self), fields(threshold = options.threshold, limit = options.limit))]
    pub async fn search(
        &self,
        query: &str,
        options: SearchOptions,
    ) -> Result<Vec<SearchHit>, PipelineError> {
        let embedder = self
            .embedder
            .as_ref()
            .ok_or(PipelineError::NotConfigured(Stage::Embed))?;

        let query_vector = embedder
            .embed(query)
            .await
            .map_err(|source| PipelineError::Provider {
                stage: Stage::Embed,
                source,
            })?;

        let entries = self.store.list_all().await?;
        let hits = rank(&query_vector, &entries, options);
        debug!(candidates = entries.len(), hits = hits.len(), "Semantic search complete");
        Ok(hits)
    }

    pub async fn keyword(&self, query: &str, limit: usize) -> Result<Vec<EntryView>, PipelineError> {
        let entries = self.store.list_all().await?;
        Ok(keyword_match(query, &entries, limit))
    }
}
