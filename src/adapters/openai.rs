//! OpenAI-compatible HTTP providers.
//!
//! One client type serves analysis, embeddings and digest narratives; each
//! configured section gets its own instance with its own model. Chat calls
//! request JSON output and the returned object is validated against the
//! expected schema before it reaches the pipeline.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::json::{choice_content, extract_object};
use super::{Analyzer, AudioSource, Embedder, NarrativeGenerator, ProviderError, Transcriber};
use crate::config::{LlmSettings, TranscriptionSettings};
use crate::domain::{AnalysisResult, Narrative};

const ANALYSIS_PROMPT: &str = "You analyze short personal voice notes. \
Respond with a single JSON object with keys: \
summary (1-2 sentences), \
sentiment (one of positive, negative, neutral, mixed), \
sentimentScore (number from 0.0 = very negative to 1.0 = very positive), \
topics (array of short lowercase topic strings), \
actionItems (array of strings, empty if none), \
mood (a single lowercase word).";

const NARRATIVE_PROMPT: &str = "You write a short reflective digest of someone's voice notes. \
You receive aggregate statistics and the summaries of each note. \
Respond with a single JSON object with keys: \
headline (one line), summary (one paragraph), \
highlights (array of strings), suggestions (array of strings).";

/// Client for chat-completions and embeddings endpoints
pub struct OpenAiClient {
    api_base: String,
    api_key: String,
    model: String,
    dimensions: usize,
    timeout: Duration,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(settings: &LlmSettings, api_key: String) -> Self {
        Self {
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            api_key,
            model: settings.model.clone(),
            dimensions: 0,
            timeout: Duration::from_secs(settings.timeout_seconds),
            client: reqwest::Client::new(),
        }
    }

    /// Set the embedding dimensionality requested from the provider
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    /// Run a chat completion and return the JSON object it produced
    async fn chat_json(
        &self,
        kind: &'static str,
        system: &str,
        user: String,
    ) -> Result<Value, ProviderError> {
        let body = json!({
            "model": self.model,
            "temperature": 0.2,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });

        let response: Value = self
            .client
            .post(self.url("/chat/completions"))
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let content = choice_content(&response)
            .ok_or_else(|| ProviderError::invalid(kind, "missing message content"))?;

        extract_object(content).ok_or_else(|| {
            debug!(kind, content, "Model output did not contain a JSON object");
            ProviderError::invalid(kind, "no JSON object in model output")
        })
    }
}

#[async_trait]
impl Analyzer for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn analyze(
        &self,
        transcript: &str,
        context: &str,
    ) -> Result<AnalysisResult, ProviderError> {
        let user = format!("Context: {}\n\nVoice note transcript:\n{}", context, transcript);
        let value = self.chat_json("analysis", ANALYSIS_PROMPT, user).await?;

        AnalysisResult::from_value(value).map_err(|detail| ProviderError::invalid("analysis", detail))
    }
}

#[async_trait]
impl Embedder for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let mut body = json!({
            "model": self.model,
            "input": text,
        });
        if self.dimensions > 0 {
            body["dimensions"] = json!(self.dimensions);
        }

        let response: Value = self
            .client
            .post(self.url("/embeddings"))
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let vector = parse_embedding_response(&response)?;
        if self.dimensions > 0 && vector.len() != self.dimensions {
            return Err(ProviderError::invalid(
                "embedding",
                format!("expected {} dimensions, got {}", self.dimensions, vector.len()),
            ));
        }

        Ok(vector)
    }
}

#[async_trait]
impl NarrativeGenerator for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate_narrative(&self, payload: &Value) -> Result<Narrative, ProviderError> {
        let user = serde_json::to_string_pretty(payload).map_err(ProviderError::failure)?;
        let value = self.chat_json("narrative", NARRATIVE_PROMPT, user).await?;

        serde_json::from_value(value).map_err(|e| ProviderError::invalid("narrative", e.to_string()))
    }
}

fn parse_embedding_response(response: &Value) -> Result<Vec<f32>, ProviderError> {
    let embedding = response
        .get("data")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .and_then(|item| item.get("embedding"))
        .and_then(|v| v.as_array())
        .ok_or_else(|| ProviderError::invalid("embedding", "missing data[0].embedding"))?;

    let mut vector = Vec::with_capacity(embedding.len());
    for value in embedding {
        let number = value
            .as_f64()
            .ok_or_else(|| ProviderError::invalid("embedding", "non-numeric value"))?;
        vector.push(number as f32);
    }

    if vector.is_empty() {
        return Err(ProviderError::invalid("embedding", "empty vector"));
    }

    Ok(vector)
}

/// Transcription response from `/audio/transcriptions`
#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Transcriber backed by the `/audio/transcriptions` endpoint
pub struct OpenAiTranscriber {
    api_base: String,
    api_key: String,
    model: String,
    language: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl OpenAiTranscriber {
    pub fn new(settings: &TranscriptionSettings, api_key: String) -> Self {
        Self {
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            api_key,
            model: settings.model.clone(),
            language: settings.language.clone(),
            timeout: Duration::from_secs(settings.timeout_seconds),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Transcriber for OpenAiTranscriber {
    fn name(&self) -> &str {
        "openai"
    }

    async fn transcribe(&self, audio: &AudioSource) -> Result<String, ProviderError> {
        let file_name = audio
            .path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        let file_bytes = tokio::fs::read(&audio.path)
            .await
            .map_err(|e| ProviderError::Failure(format!("failed to read audio: {}", e)))?;

        let file_part = Part::bytes(file_bytes)
            .file_name(file_name)
            .mime_str("application/octet-stream")?;

        let form = Form::new()
            .text("model", self.model.clone())
            .text("language", self.language.clone())
            .part("file", file_part);

        let response: TranscriptionResponse = self
            .client
            .post(format!("{}/audio/transcriptions", self.api_base))
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| ProviderError::invalid("transcription", e.to_string()))?;

        let text = response.text.trim().to_string();
        if text.is_empty() {
            return Err(ProviderError::invalid("transcription", "empty transcript"));
        }

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> LlmSettings {
        LlmSettings {
            api_base: "https://api.example.com/v1/".to_string(),
            model: "test-model".to_string(),
            timeout_seconds: 5,
        }
    }

    #[test]
    fn test_url_strips_trailing_slash() {
        let client = OpenAiClient::new(&settings(), "key".to_string());
        assert_eq!(
            client.url("/embeddings"),
            "https://api.example.com/v1/embeddings"
        );
    }

    #[test]
    fn test_parse_embedding_response() {
        let response = json!({ "data": [{ "index": 0, "embedding": [0.5, -1.0, 2.0] }] });
        assert_eq!(
            parse_embedding_response(&response).unwrap(),
            vec![0.5, -1.0, 2.0]
        );
    }

    #[test]
    fn test_parse_embedding_rejects_malformed() {
        assert!(parse_embedding_response(&json!({ "data": [] })).is_err());
        assert!(parse_embedding_response(&json!({ "data": [{ "embedding": ["x"] }] })).is_err());
        assert!(parse_embedding_response(&json!({ "data": [{ "embedding": [] }] })).is_err());
    }

    #[test]
    fn test_dimensions_default_to_unset() {
        let client = OpenAiClient::new(&settings(), "key".to_string());
        assert_eq!(client.dimensions(), 0);
        assert_eq!(client.with_dimensions(256).dimensions(), 256);
    }
}
