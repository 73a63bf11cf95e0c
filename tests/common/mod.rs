//! Shared fixtures: deterministic stub providers and a temp-dir journal.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tempfile::TempDir;

use murmur::adapters::{
    Analyzer, AudioSource, Embedder, NarrativeGenerator, ProviderError, Providers, Transcriber,
};
use murmur::core::{reporting_offset, HookDispatcher, Journal, SnapshotStore};
use murmur::domain::{AnalysisResult, Narrative, Sentiment};
use murmur::ingest::AudioStore;

/// Transcriber that returns fixed text and counts calls
pub struct StubTranscriber {
    pub text: String,
    pub calls: AtomicUsize,
}

impl StubTranscriber {
    pub fn new(text: &str) -> Arc<Self> {
        Arc::new(Self {
            text: text.to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcriber for StubTranscriber {
    fn name(&self) -> &str {
        "stub-transcriber"
    }

    async fn transcribe(&self, _audio: &AudioSource) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.text.clone())
    }
}

/// Analyzer returning a fixed result, optionally failing or slow
pub struct StubAnalyzer {
    pub result: AnalysisResult,
    pub fail: bool,
    pub delay: Option<Duration>,
    pub calls: AtomicUsize,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
}

impl StubAnalyzer {
    pub fn new(result: AnalysisResult) -> Self {
        Self {
            result,
            fail: false,
            delay: None,
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(analysis("unused", Sentiment::Neutral, 0.5, &[], "flat"))
        }
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Analyzer for StubAnalyzer {
    fn name(&self) -> &str {
        "stub-analyzer"
    }

    async fn analyze(&self, _transcript: &str, _context: &str) -> Result<AnalysisResult, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.fail {
            return Err(ProviderError::invalid("analysis", "no JSON object in response"));
        }
        Ok(self.result.clone())
    }
}

/// Embedder mapping keywords to fixed vectors; unmatched text gets `fallback`
pub struct KeywordEmbedder {
    pub keywords: Vec<(&'static str, Vec<f32>)>,
    pub fallback: Vec<f32>,
    pub fail: bool,
}

impl KeywordEmbedder {
    pub fn new(keywords: Vec<(&'static str, Vec<f32>)>, fallback: Vec<f32>) -> Self {
        Self {
            keywords,
            fallback,
            fail: false,
        }
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn name(&self) -> &str {
        "keyword-embedder"
    }

    fn dimensions(&self) -> usize {
        self.fallback.len()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        if self.fail {
            return Err(ProviderError::failure("embedding service unavailable"));
        }
        let lower = text.to_lowercase();
        Ok(self
            .keywords
            .iter()
            .find(|(k, _)| lower.contains(k))
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| self.fallback.clone()))
    }
}

/// Narrative provider that echoes the entry count, or fails
pub struct StubNarrator {
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl StubNarrator {
    pub fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            fail,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl NarrativeGenerator for StubNarrator {
    fn name(&self) -> &str {
        "stub-narrator"
    }

    async fn generate_narrative(&self, payload: &Value) -> Result<Narrative, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ProviderError::failure("narrative service returned 500"));
        }
        Ok(Narrative {
            headline: format!("{} notes", payload["entry_count"]),
            summary: "A steady day.".to_string(),
            highlights: vec![],
            suggestions: vec!["Keep going".to_string()],
        })
    }
}

pub fn analysis(
    summary: &str,
    sentiment: Sentiment,
    score: f64,
    topics: &[&str],
    mood: &str,
) -> AnalysisResult {
    AnalysisResult {
        summary: summary.to_string(),
        sentiment,
        sentiment_score: score,
        topics: topics.iter().map(|t| t.to_string()).collect(),
        action_items: vec![],
        mood: mood.to_string(),
    }
}

/// A journal persisted under a fresh temp dir
pub struct TestJournal {
    pub journal: Journal,
    pub temp: TempDir,
}

pub async fn journal_with(providers: Providers, hooks: HookDispatcher) -> TestJournal {
    let temp = TempDir::new().unwrap();
    let store = SnapshotStore::open(temp.path().join("entries.json"))
        .await
        .unwrap();
    let audio = AudioStore::new(temp.path().join("audio"));

    TestJournal {
        journal: Journal::new(Arc::new(store), providers, hooks, audio, reporting_offset(0)),
        temp,
    }
}

pub async fn journal(providers: Providers) -> TestJournal {
    journal_with(providers, HookDispatcher::new()).await
}
