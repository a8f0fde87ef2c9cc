//! Configuration management for keyvoice

pub mod file;

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use self::file::KeyvoiceConfigFile;
use crate::keywords::{KeywordDictionary, KeywordEntry};
use crate::pipeline::{DEFAULT_PROVIDER_TIMEOUT, PipelineOptions};
use crate::storage::S3Settings;
use crate::voice::{SttProvider, TtsProvider};
use crate::{Error, Result};

/// Default API server port
pub const DEFAULT_PORT: u16 = 18790;

/// keyvoice configuration
#[derive(Debug)]
pub struct Config {
    /// Artifact storage
    pub storage: StorageConfig,

    /// Voice configuration
    pub voice: VoiceConfig,

    /// API keys
    pub api_keys: ApiKeys,

    /// HTTP API server configuration
    pub server: ServerConfig,

    /// Keyword dictionary entries; empty means the built-in set
    pub keywords: Vec<KeywordEntry>,
}

/// Which object store backs the gateway
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StorageBackend {
    #[default]
    S3,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "s3" | "r2" => Ok(Self::S3),
            "memory" => Ok(Self::Memory),
            other => Err(Error::Config(format!("unknown storage backend: {other}"))),
        }
    }
}

/// Object storage configuration
#[derive(Debug)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    /// S3 endpoint URL (`R2_ENDPOINT`)
    pub endpoint: Option<String>,

    /// Bucket name (`R2_BUCKET_NAME`)
    pub bucket: Option<String>,

    /// Access key (`R2_ACCESS_KEY_ID`)
    pub access_key_id: Option<SecretString>,

    /// Secret key (`R2_SECRET_ACCESS_KEY`)
    pub secret_access_key: Option<SecretString>,

    /// Public base URL for playback (`PUBLIC_R2_BUCKET_URL`)
    pub public_url: Option<String>,

    /// Signing region
    pub region: String,
}

impl StorageConfig {
    /// Connection settings for the S3 backend
    ///
    /// # Errors
    ///
    /// Returns error if a required value is missing or the endpoint is not a URL
    pub fn s3_settings(&self) -> Result<S3Settings> {
        let endpoint = require(self.endpoint.as_deref(), "R2_ENDPOINT")?;
        validate_url(endpoint, "R2_ENDPOINT")?;

        let bucket = require(self.bucket.as_deref(), "R2_BUCKET_NAME")?;
        let access_key_id = secret(self.access_key_id.as_ref(), "R2_ACCESS_KEY_ID")?;
        let secret_access_key = secret(self.secret_access_key.as_ref(), "R2_SECRET_ACCESS_KEY")?;

        Ok(S3Settings {
            endpoint: endpoint.to_string(),
            region: self.region.clone(),
            bucket: bucket.to_string(),
            access_key_id,
            secret_access_key,
        })
    }

    /// Public base URL stored keys are played from
    ///
    /// # Errors
    ///
    /// Returns error if the S3 backend is selected and the URL is missing or invalid
    pub fn playback_base_url(&self) -> Result<String> {
        match (self.backend, self.public_url.as_deref()) {
            (_, Some(url)) => {
                validate_url(url, "PUBLIC_R2_BUCKET_URL")?;
                Ok(url.to_string())
            }
            (StorageBackend::Memory, None) => Ok("memory://keyvoice".to_string()),
            (StorageBackend::S3, None) => Err(missing("PUBLIC_R2_BUCKET_URL")),
        }
    }
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    pub stt_provider: SttProvider,

    /// STT model (e.g. "whisper-1", "nova-2")
    pub stt_model: String,

    pub tts_provider: TtsProvider,

    /// TTS model (e.g. "tts-1", "`eleven_monolingual_v1`")
    pub tts_model: String,

    /// TTS voice identifier
    pub tts_voice: String,

    /// TTS speed multiplier (0.25 to 4.0)
    pub tts_speed: f64,

    /// Spoken language hint (ISO 639-1)
    pub language: String,

    /// Upper bound on each provider call
    pub timeout: Duration,
}

impl VoiceConfig {
    /// Fixed per-run pipeline parameters
    #[must_use]
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            language: self.language.clone(),
            voice: self.tts_voice.clone(),
            timeout: self.timeout,
        }
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            stt_provider: SttProvider::Whisper,
            stt_model: "whisper-1".to_string(),
            tts_provider: TtsProvider::OpenAI,
            tts_model: "tts-1".to_string(),
            tts_voice: "alloy".to_string(),
            tts_speed: 1.0,
            language: "en".to_string(),
            timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }
}

/// API keys for external services
#[derive(Debug, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (for Whisper and TTS)
    pub openai: Option<SecretString>,

    /// `Deepgram` API key (optional STT)
    pub deepgram: Option<SecretString>,

    /// `ElevenLabs` API key (optional TTS)
    pub elevenlabs: Option<SecretString>,
}

/// HTTP API server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,

    /// Path to static files directory (web UI)
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            static_dir: None,
        }
    }
}

impl Config {
    /// Load configuration from the config file and process environment
    ///
    /// # Errors
    ///
    /// Returns error if a value fails to parse
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration from an explicit config file (or the standard path)
    /// and the process environment
    ///
    /// # Errors
    ///
    /// Returns error if a value fails to parse
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let fc = path.map_or_else(file::load_config_file, file::load_config_file_from);
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Load configuration from environment lookups only
    ///
    /// # Errors
    ///
    /// Returns error if a value fails to parse
    pub fn from_lookup(env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Self::from_sources(KeyvoiceConfigFile::default(), env)
    }

    /// Merge a parsed config file with environment lookups (env wins)
    ///
    /// # Errors
    ///
    /// Returns error if a value fails to parse
    pub fn from_sources(
        fc: KeyvoiceConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        // Blank variables count as unset
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let storage = StorageConfig {
            backend: env("KEYVOICE_STORAGE_BACKEND")
                .or(fc.storage.backend)
                .map(|s| s.parse::<StorageBackend>())
                .transpose()?
                .unwrap_or_default(),
            endpoint: env("R2_ENDPOINT").or(fc.storage.endpoint),
            bucket: env("R2_BUCKET_NAME").or(fc.storage.bucket),
            access_key_id: env("R2_ACCESS_KEY_ID")
                .or(fc.storage.access_key_id)
                .map(SecretString::from),
            secret_access_key: env("R2_SECRET_ACCESS_KEY")
                .or(fc.storage.secret_access_key)
                .map(SecretString::from),
            public_url: env("PUBLIC_R2_BUCKET_URL").or(fc.storage.public_url),
            region: env("R2_REGION")
                .or(fc.storage.region)
                .unwrap_or_else(|| "auto".to_string()),
        };

        let defaults = VoiceConfig::default();
        let voice = VoiceConfig {
            stt_provider: env("KEYVOICE_STT_PROVIDER")
                .or(fc.voice.stt_provider)
                .map(|s| s.parse::<SttProvider>())
                .transpose()?
                .unwrap_or(defaults.stt_provider),
            stt_model: env("KEYVOICE_STT_MODEL")
                .or(fc.voice.stt_model)
                .unwrap_or(defaults.stt_model),
            tts_provider: env("KEYVOICE_TTS_PROVIDER")
                .or(fc.voice.tts_provider)
                .map(|s| s.parse::<TtsProvider>())
                .transpose()?
                .unwrap_or(defaults.tts_provider),
            tts_model: env("KEYVOICE_TTS_MODEL")
                .or(fc.voice.tts_model)
                .unwrap_or(defaults.tts_model),
            tts_voice: env("KEYVOICE_TTS_VOICE")
                .or(fc.voice.tts_voice)
                .unwrap_or(defaults.tts_voice),
            tts_speed: parse_env(&env, "KEYVOICE_TTS_SPEED")?
                .or(fc.voice.tts_speed)
                .unwrap_or(defaults.tts_speed),
            language: env("KEYVOICE_LANGUAGE")
                .or(fc.voice.language)
                .unwrap_or(defaults.language),
            timeout: parse_env(&env, "KEYVOICE_TIMEOUT_SECS")?
                .or(fc.voice.timeout_secs)
                .map_or(defaults.timeout, Duration::from_secs),
        };

        if !(0.25..=4.0).contains(&voice.tts_speed) {
            return Err(Error::Config(format!(
                "tts_speed must be between 0.25 and 4.0, got {}",
                voice.tts_speed
            )));
        }

        let api_keys = ApiKeys {
            openai: env("OPENAI_API_KEY")
                .or(fc.api_keys.openai)
                .map(SecretString::from),
            deepgram: env("DEEPGRAM_API_KEY")
                .or(fc.api_keys.deepgram)
                .map(SecretString::from),
            elevenlabs: env("ELEVENLABS_API_KEY")
                .or(fc.api_keys.elevenlabs)
                .map(SecretString::from),
        };

        let server = ServerConfig {
            port: match parse_env::<u16>(&env, "KEYVOICE_PORT")? {
                Some(port) => Some(port),
                None => parse_env::<u16>(&env, "PORT")?,
            }
            .or(fc.server.port)
            .unwrap_or(DEFAULT_PORT),
            static_dir: env("KEYVOICE_STATIC_DIR")
                .or(fc.server.static_dir)
                .map(PathBuf::from),
        };

        Ok(Self {
            storage,
            voice,
            api_keys,
            server,
            keywords: fc.keywords,
        })
    }

    /// Build the keyword dictionary (configured entries or the built-in set)
    ///
    /// # Errors
    ///
    /// Returns error if configured entries are invalid
    pub fn dictionary(&self) -> Result<KeywordDictionary> {
        if self.keywords.is_empty() {
            Ok(KeywordDictionary::default())
        } else {
            KeywordDictionary::new(self.keywords.clone())
        }
    }
}

fn parse_env<T: FromStr>(env: impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    env(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| Error::Config(format!("invalid {key} '{raw}': {e}")))
        })
        .transpose()
}

fn missing(key: &str) -> Error {
    Error::Config(format!("{key} is required for the s3 storage backend"))
}

fn require<'a>(value: Option<&'a str>, key: &str) -> Result<&'a str> {
    value.ok_or_else(|| missing(key))
}

fn secret(value: Option<&SecretString>, key: &str) -> Result<SecretString> {
    use secrecy::ExposeSecret;

    value
        .map(|s| SecretString::from(s.expose_secret().to_string()))
        .ok_or_else(|| missing(key))
}

fn validate_url(value: &str, key: &str) -> Result<()> {
    url::Url::parse(value)
        .map(|_| ())
        .map_err(|e| Error::Config(format!("{key} is not a valid URL: {e}")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::file::parse_config_file;
    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn r2_env() -> Vec<(&'static str, &'static str)> {
        vec![
            ("R2_ENDPOINT", "https://acct.r2.cloudflarestorage.com"),
            ("R2_ACCESS_KEY_ID", "AKID"),
            ("R2_SECRET_ACCESS_KEY", "SECRET"),
            ("R2_BUCKET_NAME", "voices"),
            ("PUBLIC_R2_BUCKET_URL", "https://pub.example.dev"),
        ]
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::S3);
        assert_eq!(config.storage.region, "auto");
        assert_eq!(config.voice.stt_model, "whisper-1");
        assert_eq!(config.voice.tts_voice, "alloy");
        assert_eq!(config.voice.timeout, DEFAULT_PROVIDER_TIMEOUT);
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.dictionary().unwrap().entries().len(), 5);
    }

    #[test]
    fn test_s3_settings_from_env() {
        let config = Config::from_lookup(lookup(&r2_env())).unwrap();
        let settings = config.storage.s3_settings().unwrap();
        assert_eq!(settings.bucket, "voices");
        assert_eq!(settings.access_key_id.expose_secret(), "AKID");
        assert_eq!(
            config.storage.playback_base_url().unwrap(),
            "https://pub.example.dev"
        );
    }

    #[test]
    fn test_s3_settings_missing_values() {
        let config = Config::from_lookup(lookup(&[("R2_ENDPOINT", "https://r2.example")])).unwrap();
        let err = config.storage.s3_settings().unwrap_err();
        assert!(err.to_string().contains("R2_BUCKET_NAME"));
        assert!(config.storage.playback_base_url().is_err());
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let mut env = r2_env();
        env[0] = ("R2_ENDPOINT", "not a url");
        let config = Config::from_lookup(lookup(&env)).unwrap();
        assert!(config.storage.s3_settings().is_err());
    }

    #[test]
    fn test_memory_backend_needs_no_bucket() {
        let config = Config::from_lookup(lookup(&[("KEYVOICE_STORAGE_BACKEND", "memory")])).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert!(config.storage.playback_base_url().is_ok());
    }

    #[test]
    fn test_env_overrides_file() {
        let fc = parse_config_file(
            r#"
[voice]
tts_voice = "nova"
language = "de"

[server]
port = 9000
"#,
        )
        .unwrap();

        let config = Config::from_sources(
            fc,
            lookup(&[("KEYVOICE_TTS_VOICE", "echo"), ("PORT", "8080")]),
        )
        .unwrap();

        assert_eq!(config.voice.tts_voice, "echo");
        assert_eq!(config.voice.language, "de");
        assert_eq!(config.server.port, 8080);

        let options = config.voice.pipeline_options();
        assert_eq!(options.voice, "echo");
        assert_eq!(options.language, "de");
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(Config::from_lookup(lookup(&[("KEYVOICE_PORT", "abc")])).is_err());
        assert!(Config::from_lookup(lookup(&[("KEYVOICE_TTS_SPEED", "9")])).is_err());
        assert!(Config::from_lookup(lookup(&[("KEYVOICE_STT_PROVIDER", "siri")])).is_err());
    }

    #[test]
    fn test_blank_env_ignored() {
        let config = Config::from_lookup(lookup(&[("KEYVOICE_TTS_VOICE", "  ")])).unwrap();
        assert_eq!(config.voice.tts_voice, "alloy");
    }

    #[test]
    fn test_configured_keywords_replace_defaults() {
        let fc = parse_config_file(
            r#"
[[keywords]]
trigger = "rust"
response = "Rust is a systems programming language."
"#,
        )
        .unwrap();

        let config = Config::from_sources(fc, |_| None).unwrap();
        let dictionary = config.dictionary().unwrap();
        assert_eq!(dictionary.entries().len(), 1);
        assert!(dictionary.find_match("I love Rust").is_some());
    }
}
