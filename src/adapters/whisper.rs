//! Local whisper transcription backend.
//!
//! Shells out to a whisper binary and reads its JSON output from a temp dir.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::{AudioSource, ProviderError, Transcriber};
use crate::config::TranscriptionSettings;

/// Whisper output JSON structure
#[derive(Debug, Deserialize)]
struct WhisperOutput {
    text: String,
}

/// Transcriber backed by a local whisper binary
pub struct WhisperTranscriber {
    binary_path: String,
    model: String,
    language: String,
    timeout: Duration,
}

impl WhisperTranscriber {
    pub fn new(binary_path: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
            model: model.into(),
            language: "en".to_string(),
            timeout: Duration::from_secs(600),
        }
    }

    pub fn from_settings(settings: &TranscriptionSettings) -> Self {
        let binary_path = settings.binary.clone().unwrap_or_else(|| {
            std::env::var("WHISPER_PATH").unwrap_or_else(|_| "whisper".to_string())
        });

        Self {
            binary_path,
            model: settings.model.clone(),
            language: settings.language.clone(),
            timeout: Duration::from_secs(settings.timeout_seconds),
        }
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    fn name(&self) -> &str {
        "whisper"
    }

    async fn transcribe(&self, audio: &AudioSource) -> Result<String, ProviderError> {
        let temp_dir = tempfile::tempdir().map_err(ProviderError::failure)?;

        debug!(path = %audio.path.display(), model = %self.model, "Running whisper");

        let child = Command::new(&self.binary_path)
            .arg(&audio.path)
            .arg("--model")
            .arg(&self.model)
            .arg("--output_dir")
            .arg(temp_dir.path())
            .arg("--output_format")
            .arg("json")
            .arg("--language")
            .arg(&self.language)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = timeout(self.timeout, child)
            .await
            .map_err(|_| {
                ProviderError::Failure(format!("whisper timed out after {:?}", self.timeout))
            })?
            .map_err(|e| ProviderError::Failure(format!("failed to run whisper: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProviderError::Failure(format!(
                "whisper exited with {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        let stem = audio
            .path
            .file_stem()
            .unwrap_or_default()
            .to_string_lossy();
        let json_path = temp_dir.path().join(format!("{}.json", stem));

        let json_content = tokio::fs::read_to_string(&json_path)
            .await
            .map_err(|e| ProviderError::Failure(format!("failed to read whisper output: {}", e)))?;

        parse_whisper_output(&json_content)
    }
}

fn parse_whisper_output(content: &str) -> Result<String, ProviderError> {
    let whisper: WhisperOutput = serde_json::from_str(content)
        .map_err(|e| ProviderError::invalid("transcription", e.to_string()))?;

    let text = whisper.text.trim().to_string();
    if text.is_empty() {
        return Err(ProviderError::invalid("transcription", "empty transcript"));
    }

    Ok(text)
}
