//! TOML configuration file loading
//!
//! Supports `~/.config/keyvoice/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults
//! and environment variables override it.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;
use crate::keywords::KeywordEntry;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct KeyvoiceConfigFile {
    /// Artifact storage
    #[serde(default)]
    pub storage: StorageFileConfig,

    /// Transcription and synthesis
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,

    /// HTTP server
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Ordered trigger/response entries replacing the built-in dictionary
    #[serde(default)]
    pub keywords: Vec<KeywordEntry>,
}

/// Object storage configuration
#[derive(Debug, Default, Deserialize)]
pub struct StorageFileConfig {
    /// "s3" or "memory"
    pub backend: Option<String>,
    pub endpoint: Option<String>,
    pub bucket: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Base URL stored keys are publicly served under
    pub public_url: Option<String>,
    pub region: Option<String>,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// "openai" or "deepgram"
    pub stt_provider: Option<String>,

    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// "openai" or "elevenlabs"
    pub tts_provider: Option<String>,

    /// TTS model (e.g. "tts-1")
    pub tts_model: Option<String>,

    /// TTS voice identifier (e.g. "alloy")
    pub tts_voice: Option<String>,

    /// TTS speed multiplier
    pub tts_speed: Option<f64>,

    /// Spoken language hint
    pub language: Option<String>,

    /// Per-call provider timeout
    pub timeout_secs: Option<u64>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub deepgram: Option<String>,
    pub elevenlabs: Option<String>,
}

/// Server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// API server port
    pub port: Option<u16>,

    /// Static web UI directory
    pub static_dir: Option<String>,
}

/// Parse config file contents
///
/// # Errors
///
/// Returns error if the contents are not valid TOML for this schema
pub fn parse_config_file(content: &str) -> Result<KeyvoiceConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Load the TOML config file from the standard path
///
/// Returns `KeyvoiceConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> KeyvoiceConfigFile {
    config_file_path().map_or_else(KeyvoiceConfigFile::default, |path| load_config_file_from(&path))
}

/// Load a TOML config file from an explicit path
///
/// Returns `KeyvoiceConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file_from(path: &Path) -> KeyvoiceConfigFile {
    if !path.exists() {
        return KeyvoiceConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match parse_config_file(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                KeyvoiceConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            KeyvoiceConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/keyvoice/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("keyvoice").join("config.toml"))
}
