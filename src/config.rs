//! Configuration management for valo-coach
//!
//! Stores settings in ~/.config/valo-coach/config.json. Environment
//! variables (`GOOGLE_API_KEY`, `MODEL_NAME`) override the file, and CLI
//! flags override both.

use crate::llm::models::{
    GenerationOptions, DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_MODEL, DEFAULT_TEMPERATURE, FLASH_MODEL,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const API_KEY_ENV: &str = "GOOGLE_API_KEY";
pub const MODEL_ENV: &str = "MODEL_NAME";

/// Where the last raw response goes when recovery fails
pub const DEFAULT_DIAGNOSTIC_PATH: &str = "gemini_raw_response.txt";
pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub google_api_key: Option<String>,
    /// Initial model for every call
    pub model_name: String,
    /// Lower tier used after failures on a pro model
    pub fallback_model: String,
    /// Upper bound on events sent to the model
    pub max_events: usize,
    /// Retries per model call, on top of the first attempt
    pub max_retries: u32,
    pub max_output_tokens: u32,
    pub temperature: f32,
    /// Language the report is written in
    pub language: String,
    pub diagnostic_path: PathBuf,
    pub api_base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            google_api_key: None,
            model_name: DEFAULT_MODEL.to_string(),
            fallback_model: FLASH_MODEL.to_string(),
            max_events: 160,
            max_retries: 2,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            language: "Korean".to_string(),
            diagnostic_path: PathBuf::from(DEFAULT_DIAGNOSTIC_PATH),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: 60,
        }
    }
}

impl Config {
    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("valo-coach"))
    }

    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.json"))
    }

    /// Load config from disk (or defaults), then apply environment overrides
    pub fn load() -> Self {
        let mut config = match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        };
        config.apply_env_with(|key| std::env::var(key).ok());
        config
    }

    /// Load a config file. A missing file gives defaults; a corrupt one is
    /// moved aside and defaults are used.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(err) => {
                preserve_corrupt_config(path, &content);
                tracing::warn!(path = %path.display(), error = %err, "config file was corrupted, using defaults");
                eprintln!(
                    "  Warning: Config file was corrupted ({}). A backup was saved and defaults were loaded.",
                    err
                );
                Self::default()
            }
        }
    }

    /// Environment variables take precedence over the config file
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(API_KEY_ENV).filter(|k| !k.trim().is_empty()) {
            self.google_api_key = Some(key);
        }
        if let Some(model) = lookup(MODEL_ENV).filter(|m| !m.trim().is_empty()) {
            self.model_name = model;
        }
    }

    /// The configured Google AI Studio key, if any
    pub fn api_key(&self) -> Option<&str> {
        self.google_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            max_output_tokens: self.max_output_tokens,
            temperature: self.temperature,
        }
    }

    /// Get the config file location for display
    pub fn config_location() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "~/.config/valo-coach/config.json".to_string())
    }
}

fn preserve_corrupt_config(path: &Path, content: &str) {
    let corrupt_path = path.with_extension("json.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}
