use crate::defaults;
use crate::error::{AudiobookError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub voice: VoiceConfig,
    pub output: OutputConfig,
}

/// TTS backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    /// Gradio app URL (e.g. `https://user-space.hf.space`)
    pub endpoint: Option<String>,
    /// HuggingFace access token, sent to both the app and the Hub API
    pub token: Option<String>,
    /// Space id (`user/space`) enabling restart/pause control
    pub space_id: Option<String>,
    /// Hub base URL for Space control calls
    pub hub_url: String,
    /// Local TTS server used when the voice is a reference audio file
    pub local_endpoint: String,
    pub poll_interval_secs: u64,
    pub ready_timeout_secs: u64,
    /// Leave the Space running after the last book
    pub keep_warm: bool,
}

/// Voice selection and synthesis parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VoiceConfig {
    /// Preset tag, free-form label, or path to a reference audio file
    pub voice: String,
    pub diffusion_steps: u32,
    pub alpha: f32,
    pub beta: f32,
    pub embedding_scale: f32,
    pub seed: Option<u64>,
}

/// Output location and audiobook metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    /// Parent of the per-book working directories
    pub directory: PathBuf,
    /// Publication date tag; today's date when unset
    pub publication_date: Option<String>,
    pub bitrate: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            token: None,
            space_id: None,
            hub_url: defaults::HUB_API_URL.to_string(),
            local_endpoint: defaults::LOCAL_ENDPOINT.to_string(),
            poll_interval_secs: defaults::POLL_INTERVAL_SECS,
            ready_timeout_secs: defaults::READY_TIMEOUT_SECS,
            keep_warm: false,
        }
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            voice: defaults::DEFAULT_VOICE.to_string(),
            diffusion_steps: defaults::DIFFUSION_STEPS,
            alpha: defaults::ALPHA,
            beta: defaults::BETA,
            embedding_scale: defaults::EMBEDDING_SCALE,
            seed: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            publication_date: None,
            bitrate: defaults::AUDIOBOOK_BITRATE.to_string(),
        }
    }
}

impl BackendConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }
}

impl VoiceConfig {
    /// The voice as a reference audio file, if it names an existing file.
    pub fn reference_file(&self) -> Option<&Path> {
        let path = Path::new(&self.voice);
        path.is_file().then_some(path)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing fields use default values; invalid TOML is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AudiobookError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                AudiobookError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only a missing file falls back to defaults; invalid TOML is returned
    /// as an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(AudiobookError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - AUDIOBOOKER_ENDPOINT → backend.endpoint
    /// - HF_TOKEN → backend.token
    /// - AUDIOBOOKER_SPACE → backend.space_id
    /// - AUDIOBOOKER_VOICE → voice.voice
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(endpoint) = std::env::var("AUDIOBOOKER_ENDPOINT")
            && !endpoint.is_empty()
        {
            self.backend.endpoint = Some(endpoint);
        }

        if let Ok(token) = std::env::var("HF_TOKEN")
            && !token.is_empty()
        {
            self.backend.token = Some(token);
        }

        if let Ok(space) = std::env::var("AUDIOBOOKER_SPACE")
            && !space.is_empty()
        {
            self.backend.space_id = Some(space);
        }

        if let Ok(voice) = std::env::var("AUDIOBOOKER_VOICE")
            && !voice.is_empty()
        {
            self.voice.voice = voice;
        }

        self
    }

    /// Check values that would otherwise fail deep inside a run.
    pub fn validate(&self) -> Result<()> {
        if self.backend.poll_interval_secs == 0 {
            return Err(AudiobookError::ConfigInvalidValue {
                key: "backend.poll_interval_secs".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.backend.ready_timeout_secs < self.backend.poll_interval_secs {
            return Err(AudiobookError::ConfigInvalidValue {
                key: "backend.ready_timeout_secs".to_string(),
                message: format!(
                    "must be at least the poll interval ({}s)",
                    self.backend.poll_interval_secs
                ),
            });
        }
        if !(3..=15).contains(&self.voice.diffusion_steps) {
            return Err(AudiobookError::ConfigInvalidValue {
                key: "voice.diffusion_steps".to_string(),
                message: format!("{} is outside 3..=15", self.voice.diffusion_steps),
            });
        }
        if self.voice.voice.trim().is_empty() {
            return Err(AudiobookError::ConfigInvalidValue {
                key: "voice.voice".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/audiobooker/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("audiobooker")
            .join("config.toml")
    }
}
