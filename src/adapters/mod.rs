//! Adapter interfaces for external providers.
//!
//! The pipeline consumes four opaque services: transcription, text
//! analysis, embedding, and digest narrative generation. Each is a trait so
//! that concrete backends (local whisper, OpenAI-compatible HTTP APIs, test
//! stubs) can be swapped without touching the pipeline.

pub mod json;
pub mod openai;
pub mod whisper;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::config::{ResolvedConfig, TranscriptionBackend};
use crate::domain::{AnalysisResult, Narrative, Stage};

pub use openai::{OpenAiClient, OpenAiTranscriber};
pub use whisper::WhisperTranscriber;

/// Errors returned by provider calls
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{0} provider not configured")]
    NotConfigured(Stage),

    #[error("provider failure: {0}")]
    Failure(String),

    #[error("invalid {kind} response: {detail}")]
    InvalidResponse { kind: &'static str, detail: String },
}

impl ProviderError {
    pub fn failure(err: impl std::fmt::Display) -> Self {
        Self::Failure(err.to_string())
    }

    pub fn invalid(kind: &'static str, detail: impl Into<String>) -> Self {
        Self::InvalidResponse {
            kind,
            detail: detail.into(),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        Self::Failure(err.to_string())
    }
}

/// Audio handed to a transcriber
#[derive(Debug, Clone)]
pub struct AudioSource {
    /// Local path of the audio file
    pub path: PathBuf,
}

/// Speech-to-text provider
#[async_trait]
pub trait Transcriber: Send + Sync {
    fn name(&self) -> &str;

    async fn transcribe(&self, audio: &AudioSource) -> Result<String, ProviderError>;
}

/// Text-analysis provider
#[async_trait]
pub trait Analyzer: Send + Sync {
    fn name(&self) -> &str;

    /// Analyze a transcript; `context` is the entry's classification tag
    async fn analyze(&self, transcript: &str, context: &str)
        -> Result<AnalysisResult, ProviderError>;
}

/// Embedding provider
#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    /// Fixed vector length produced by this provider
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

/// Digest narrative provider
#[async_trait]
pub trait NarrativeGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate_narrative(&self, payload: &Value) -> Result<Narrative, ProviderError>;
}

/// The set of configured providers; `None` means "not configured"
#[derive(Clone, Default)]
pub struct Providers {
    pub transcriber: Option<Arc<dyn Transcriber>>,
    pub analyzer: Option<Arc<dyn Analyzer>>,
    pub embedder: Option<Arc<dyn Embedder>>,
    pub narrator: Option<Arc<dyn NarrativeGenerator>>,
}

impl Providers {
    pub fn with_transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_narrator(mut self, narrator: Arc<dyn NarrativeGenerator>) -> Self {
        self.narrator = Some(narrator);
        self
    }

    pub fn is_configured(&self, stage: Stage) -> bool {
        match stage {
            Stage::Transcribe => self.transcriber.is_some(),
            Stage::Analyze => self.analyzer.is_some(),
            Stage::Embed => self.embedder.is_some(),
        }
    }

    /// Build providers from resolved configuration
    pub fn from_config(config: &ResolvedConfig) -> Self {
        let mut providers = Self::default();

        if let Some(ref t) = config.transcription {
            let transcriber: Option<Arc<dyn Transcriber>> = match t.backend {
                TranscriptionBackend::Whisper => Some(Arc::new(WhisperTranscriber::from_settings(t))),
                TranscriptionBackend::OpenAi => config
                    .api_key
                    .as_ref()
                    .map(|key| Arc::new(OpenAiTranscriber::new(t, key.clone())) as Arc<dyn Transcriber>),
            };
            providers.transcriber = transcriber;
        }

        if let Some(ref key) = config.api_key {
            if let Some(ref analysis) = config.analysis {
                providers.analyzer = Some(Arc::new(OpenAiClient::new(analysis, key.clone())));
            }
            if let Some(ref embedding) = config.embedding {
                providers.embedder = Some(Arc::new(
                    OpenAiClient::new(&embedding.llm, key.clone())
                        .with_dimensions(embedding.dimensions),
                ));
            }
            if let Some(ref narrative) = config.narrative {
                providers.narrator = Some(Arc::new(OpenAiClient::new(narrative, key.clone())));
            }
        }

        providers
    }
}

impl std::fmt::Debug for Providers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Providers")
            .field("transcriber", &self.transcriber.as_ref().map(|p| p.name().to_string()))
            .field("analyzer", &self.analyzer.as_ref().map(|p| p.name().to_string()))
            .field("embedder", &self.embedder.as_ref().map(|p| p.name().to_string()))
            .field("narrator", &self.narrator.as_ref().map(|p| p.name().to_string()))
            .finish()
    }
}
