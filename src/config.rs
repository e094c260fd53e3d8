use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::audio::TranscoderConfig;
use crate::vendor::GenerationConfig;

/// Environment variable prefix, e.g. `TUTOR__SPEECH__API_KEY`
pub const ENV_PREFIX: &str = "TUTOR";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub logging: LoggingConfig,
    pub transcoder: TranscoderConfig,
    pub speech: SpeechConfig,
    pub vision: VisionConfig,
    pub llm: LlmConfig,
    pub chat: ChatConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "tutor-gateway".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionMode {
    /// Windowed streaming with interim results
    Streaming,
    /// One final result per chunk
    OneShot,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub api_key: String,
    /// Override for the API host (tests point this at a local server)
    pub base_url: Option<String>,
    pub language: String,
    pub model: String,
    pub mode: RecognitionMode,
    /// New audio between interim results (windowed streaming)
    pub interim_bytes: usize,
    /// Audio per final result (windowed streaming)
    pub window_bytes: usize,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: None,
            language: "en-US".to_string(),
            model: "latest_short".to_string(),
            mode: RecognitionMode::Streaming,
            // 1s and 5s of 48kHz mono s16le
            interim_bytes: 96_000,
            window_bytes: 480_000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub api_key: String,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        let generation = GenerationConfig::default();
        Self {
            api_key: String::new(),
            base_url: None,
            model: "gemini-1.5-flash".to_string(),
            temperature: generation.temperature,
            top_p: generation.top_p,
            top_k: generation.top_k,
        }
    }
}

impl LlmConfig {
    pub fn generation(&self) -> GenerationConfig {
        GenerationConfig {
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub history_dir: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_dir: "chat_histories".to_string(),
        }
    }
}

impl Config {
    /// Load from an optional config file, then `TUTOR__*` environment variables.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }
}
