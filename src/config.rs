//! Configuration loading and well-known file paths.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to find config directory")]
    NoConfigDir,

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub transcription: TranscriptionConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranscriptionConfig {
    /// Whisper model name (tiny, base, small, medium, large-v3)
    #[serde(default = "default_model")]
    pub model: String,

    /// Transcription language ("auto" for detection)
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            language: default_language(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OutputConfig {
    /// External command that types its final argument into the focused
    /// window. The transcript is appended as one argument.
    #[serde(default = "default_inject_command")]
    pub inject_command: Vec<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            inject_command: default_inject_command(),
        }
    }
}

fn default_model() -> String {
    "base".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_inject_command() -> Vec<String> {
    vec!["wtype".to_string(), "--".to_string()]
}

impl Config {
    /// Load the config file, falling back to defaults if it doesn't exist
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_file()?;
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Write the config file, creating parent directories as needed
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = config_file()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs::write(&path, contents)?;
        Ok(())
    }

    /// Path to the Whisper model file for the configured model name
    pub fn model_path(&self) -> Result<PathBuf, ConfigError> {
        let model_file = format!("ggml-{}.bin", self.transcription.model);
        Ok(data_dir()?.join("models").join(model_file))
    }
}

/// Config file path (`<config dir>/sotto/config.toml`)
pub fn config_file() -> Result<PathBuf, ConfigError> {
    let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
    Ok(dir.join("sotto").join("config.toml"))
}

/// Data directory for models and logs (`<data dir>/sotto`)
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = dirs::data_dir().ok_or(ConfigError::NoConfigDir)?;
    Ok(dir.join("sotto"))
}

/// Runtime directory for the PID record and the status indicator
pub fn runtime_dir() -> Result<PathBuf, ConfigError> {
    dirs::runtime_dir()
        .or_else(dirs::cache_dir)
        .ok_or(ConfigError::NoConfigDir)
}

/// Print the current configuration
pub fn show() -> Result<(), ConfigError> {
    let config = Config::load()?;
    let contents = toml::to_string_pretty(&config)?;
    println!("{}", contents);
    println!("Config file: {}", config_file()?.display());
    Ok(())
}

/// Update configuration fields and save
pub fn update(
    model: Option<String>,
    language: Option<String>,
    inject_cmd: Option<String>,
) -> Result<(), ConfigError> {
    let mut config = Config::load()?;

    if let Some(model) = model {
        info!("Setting model: {}", model);
        config.transcription.model = model;
    }

    if let Some(language) = language {
        info!("Setting language: {}", language);
        config.transcription.language = language;
    }

    if let Some(cmd) = inject_cmd {
        config.output.inject_command = parse_inject_command(&cmd)?;
    }

    config.save()?;
    println!("Configuration updated");
    Ok(())
}

/// Parse an injection command from a whitespace-separated string
pub(crate) fn parse_inject_command(s: &str) -> Result<Vec<String>, ConfigError> {
    let parts: Vec<String> = s.split_whitespace().map(str::to_string).collect();
    if parts.is_empty() {
        return Err(ConfigError::ValidationError(
            "Injection command must not be empty".to_string(),
        ));
    }
    Ok(parts)
}
