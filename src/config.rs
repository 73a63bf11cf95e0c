//! Configuration for murmur.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (MURMUR_HOME, OPENAI_API_KEY, WHISPER_PATH)
//! 2. Config file (.murmur/config.yaml)
//! 3. Defaults (~/.murmur, no providers configured)
//!
//! Config file discovery:
//! - Searches current directory and parents for .murmur/config.yaml
//! - Falls back to $MURMUR_HOME/config.yaml
//! - `paths.home` in the config file is relative to the .murmur/ directory
//!
//! A provider section that is absent means that provider is not configured.
//! HTTP providers additionally require an API key.

pub mod paths;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub transcription: Option<TranscriptionSettings>,
    #[serde(default)]
    pub analysis: Option<LlmSettings>,
    #[serde(default)]
    pub embedding: Option<EmbeddingSettings>,
    #[serde(default)]
    pub narrative: Option<LlmSettings>,
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub analytics: AnalyticsSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Data directory (relative to the .murmur/ directory)
    pub home: Option<String>,
}

/// Which transcription backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptionBackend {
    /// Local whisper binary
    #[default]
    Whisper,

    /// OpenAI-compatible `/audio/transcriptions`
    #[serde(rename = "openai")]
    OpenAi,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptionSettings {
    #[serde(default)]
    pub backend: TranscriptionBackend,
    /// Whisper binary path (falls back to WHISPER_PATH, then `whisper`)
    #[serde(default)]
    pub binary: Option<String>,
    #[serde(default = "default_whisper_model")]
    pub model: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_transcription_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    pub model: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingSettings {
    #[serde(flatten)]
    pub llm: LlmSettings,
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchSettings {
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            limit: default_limit(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsSettings {
    /// Trailing window for pattern reports
    #[serde(default = "default_days")]
    pub default_days: i64,
    /// Offset used for calendar days, hours and weekdays
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl Default for AnalyticsSettings {
    fn default() -> Self {
        Self {
            default_days: default_days(),
            utc_offset_minutes: 0,
        }
    }
}

fn default_whisper_model() -> String {
    "base".to_string()
}
fn default_language() -> String {
    "en".to_string()
}
fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}
fn default_transcription_timeout() -> u64 {
    600
}
fn default_llm_timeout() -> u64 {
    60
}
fn default_dimensions() -> usize {
    1536
}
fn default_threshold() -> f32 {
    0.3
}
fn default_limit() -> usize {
    10
}
fn default_days() -> i64 {
    30
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to the data directory
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// API key for HTTP providers
    pub api_key: Option<String>,
    pub transcription: Option<TranscriptionSettings>,
    pub analysis: Option<LlmSettings>,
    pub embedding: Option<EmbeddingSettings>,
    pub narrative: Option<LlmSettings>,
    pub search: SearchSettings,
    pub analytics: AnalyticsSettings,
}

impl ResolvedConfig {
    /// Configuration with no providers, rooted at `home`
    pub fn with_home(home: PathBuf) -> Self {
        Self::from_file(home, None, ConfigFile::default(), None)
    }

    fn from_file(
        home: PathBuf,
        config_file: Option<PathBuf>,
        file: ConfigFile,
        env_api_key: Option<String>,
    ) -> Self {
        Self {
            home,
            config_file,
            api_key: env_api_key.or(file.api_key).filter(|k| !k.is_empty()),
            transcription: file.transcription,
            analysis: file.analysis,
            embedding: file.embedding,
            narrative: file.narrative,
            search: file.search,
            analytics: file.analytics,
        }
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".murmur").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content).with_context(|| format!("Failed to parse config file: {}", path.display()))
}

fn parse_config(content: &str) -> Result<ConfigFile> {
    Ok(serde_yaml::from_str(content)?)
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".murmur");
    let env_home = std::env::var("MURMUR_HOME").ok().map(PathBuf::from);
    let env_api_key = std::env::var("OPENAI_API_KEY").ok();

    let config_file = find_config_file().or_else(|| {
        let candidate = env_home.as_ref().unwrap_or(&default_home).join("config.yaml");
        candidate.exists().then_some(candidate)
    });

    let Some(config_path) = config_file else {
        let home = env_home.unwrap_or(default_home);
        return Ok(ResolvedConfig::from_file(
            home,
            None,
            ConfigFile::default(),
            env_api_key,
        ));
    };

    let file = load_config_file(&config_path)?;

    let home = if let Some(env_home) = env_home {
        env_home
    } else if let Some(ref home_path) = file.paths.home {
        let murmur_dir = config_path.parent().unwrap_or(Path::new("."));
        resolve_path(murmur_dir, home_path)
    } else {
        default_home
    };

    Ok(ResolvedConfig::from_file(
        home,
        Some(config_path),
        file,
        env_api_key,
    ))
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}
