//! TTS backends and their lifecycle.
//!
//! Every backend follows the same contract:
//! `ensure_ready` → `synthesize`* → `release`.
//! The pipeline only talks to the [`Backend`] trait, so the remote Space,
//! the local reference-voice server and the test mock are interchangeable.

pub mod gradio;
#[cfg(feature = "local-server")]
pub mod local;
pub mod mock;
pub mod space;

use crate::config::VoiceConfig;
use crate::defaults;
use crate::error::Result;
use crate::output::Reporter;
use std::path::PathBuf;

/// A reachable TTS endpoint, valid for the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendHandle {
    pub endpoint: String,
    /// URL of the reference voice file, for voice-cloning backends
    pub voice_reference_url: Option<String>,
}

/// Audio produced by a synthesis call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioArtifact {
    /// Temporary audio file owned by the caller from now on
    File(PathBuf),
    /// Base64-encoded audio that still has to be written to disk
    Encoded(String),
}

/// What `release` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Released {
    /// Remote compute was asked to pause
    Paused,
    /// Remote compute left running on request
    KeptWarm,
    /// Local resources were shut down
    Shutdown,
    /// Nothing was acquired, or already released
    Nothing,
}

/// Which synthesis entry point a voice selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPoint {
    /// Preset multi-voice synthesis; the voice tag is sent to the model
    MultiVoice,
    /// Default long-form single voice; the voice string is only a label
    LongForm,
}

impl EntryPoint {
    pub fn for_voice(voice: &str) -> Self {
        if defaults::is_voice_preset(voice) {
            EntryPoint::MultiVoice
        } else {
            EntryPoint::LongForm
        }
    }

    /// Gradio API name of the entry point
    pub fn api_name(&self) -> &'static str {
        match self {
            EntryPoint::MultiVoice => defaults::MULTI_VOICE_API,
            EntryPoint::LongForm => defaults::LONG_FORM_API,
        }
    }
}

/// Trait for text-to-speech backends.
///
/// Allows swapping implementations (remote Space, local server, mock).
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Make the backend reachable and return a handle for this run.
    ///
    /// Calling it again returns the existing handle.
    async fn ensure_ready(&mut self, reporter: &dyn Reporter) -> Result<BackendHandle>;

    /// Turn `text` into audio using `voice`.
    async fn synthesize(
        &self,
        handle: &BackendHandle,
        text: &str,
        voice: &VoiceConfig,
    ) -> Result<AudioArtifact>;

    /// Release what `ensure_ready` acquired.
    ///
    /// Safe after partial failure and when called twice. `keep_alive`
    /// leaves remote compute running for a later run.
    async fn release(&mut self, keep_alive: bool) -> Result<Released>;
}

#[async_trait::async_trait]
impl<B: Backend + ?Sized> Backend for Box<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn ensure_ready(&mut self, reporter: &dyn Reporter) -> Result<BackendHandle> {
        (**self).ensure_ready(reporter).await
    }

    async fn synthesize(
        &self,
        handle: &BackendHandle,
        text: &str,
        voice: &VoiceConfig,
    ) -> Result<AudioArtifact> {
        (**self).synthesize(handle, text, voice).await
    }

    async fn release(&mut self, keep_alive: bool) -> Result<Released> {
        (**self).release(keep_alive).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_use_multi_voice_entry_point() {
        for preset in defaults::VOICE_PRESETS {
            assert_eq!(EntryPoint::for_voice(preset), EntryPoint::MultiVoice);
        }
        assert_eq!(EntryPoint::MultiVoice.api_name(), "/synthesize");
    }

    #[test]
    fn other_voices_use_long_form_entry_point() {
        assert_eq!(EntryPoint::for_voice("Narrator"), EntryPoint::LongForm);
        assert_eq!(EntryPoint::for_voice("F-US-1"), EntryPoint::LongForm);
        assert_eq!(EntryPoint::LongForm.api_name(), "/ljsynthesize");
    }
}
