//! Mock backend for tests and dry runs of the pipeline.
//!
//! Produces short silent WAV files (0.1 s per text line) so the assembler
//! sees real headers.

use crate::backend::{AudioArtifact, Backend, BackendHandle, Released};
use crate::config::VoiceConfig;
use crate::error::{AudiobookError, Result};
use crate::output::{PipelineEvent, Reporter};
use base64::Engine;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Sample rate of generated audio.
pub const MOCK_SAMPLE_RATE: u32 = 16000;

#[derive(Debug, Default)]
struct MockState {
    ready_calls: usize,
    synthesized: Vec<String>,
    releases: Vec<bool>,
}

/// Read-only view of what a [`MockBackend`] was asked to do.
///
/// Stays valid after the backend moved into a pipeline.
#[derive(Debug, Clone, Default)]
pub struct MockProbe {
    state: Arc<Mutex<MockState>>,
}

impl MockProbe {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn ready_calls(&self) -> usize {
        self.lock().ready_calls
    }

    /// Texts submitted for synthesis, in call order.
    pub fn synthesized(&self) -> Vec<String> {
        self.lock().synthesized.clone()
    }

    /// `keep_alive` argument of every release call.
    pub fn releases(&self) -> Vec<bool> {
        self.lock().releases.clone()
    }
}

pub struct MockBackend {
    scratch_dir: PathBuf,
    probe: MockProbe,
    fail_ready: bool,
    fail_on_call: Option<usize>,
    encoded: bool,
    handle: Option<BackendHandle>,
}

impl MockBackend {
    /// Create a mock that writes its audio into `scratch_dir`
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            probe: MockProbe::default(),
            fail_ready: false,
            fail_on_call: None,
            encoded: false,
            handle: None,
        }
    }

    /// Configure the mock to never become ready
    pub fn with_ready_failure(mut self) -> Self {
        self.fail_ready = true;
        self
    }

    /// Configure the mock to fail the n-th synthesis call (1-based)
    pub fn with_failure_on_call(mut self, call: usize) -> Self {
        self.fail_on_call = Some(call);
        self
    }

    /// Return base64 payloads instead of files
    pub fn with_encoded_output(mut self) -> Self {
        self.encoded = true;
        self
    }

    pub fn probe(&self) -> MockProbe {
        self.probe.clone()
    }
}

/// Silent 16-bit mono WAV, 0.1 s per line of `text`.
pub fn silent_wav(text: &str) -> Result<Vec<u8>> {
    let lines = text.lines().count().max(1) as u32;
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: MOCK_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut buffer = Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut buffer, spec)
        .map_err(|e| AudiobookError::Other(format!("Failed to create WAV: {e}")))?;
    for _ in 0..lines * MOCK_SAMPLE_RATE / 10 {
        writer
            .write_sample(0i16)
            .map_err(|e| AudiobookError::Other(format!("Failed to write WAV: {e}")))?;
    }
    writer
        .finalize()
        .map_err(|e| AudiobookError::Other(format!("Failed to finalize WAV: {e}")))?;
    Ok(buffer.into_inner())
}

#[async_trait::async_trait]
impl Backend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn ensure_ready(&mut self, reporter: &dyn Reporter) -> Result<BackendHandle> {
        self.probe.lock().ready_calls += 1;
        if let Some(handle) = &self.handle {
            return Ok(handle.clone());
        }
        if self.fail_ready {
            return Err(AudiobookError::BackendFailed {
                stage: "RUNTIME_ERROR".to_string(),
            });
        }

        let handle = BackendHandle {
            endpoint: "mock://tts".to_string(),
            voice_reference_url: None,
        };
        reporter.report(&PipelineEvent::BackendReady {
            endpoint: handle.endpoint.clone(),
            waited: Duration::ZERO,
        });
        self.handle = Some(handle.clone());
        Ok(handle)
    }

    async fn synthesize(
        &self,
        _handle: &BackendHandle,
        text: &str,
        _voice: &VoiceConfig,
    ) -> Result<AudioArtifact> {
        let call = {
            let mut state = self.probe.lock();
            state.synthesized.push(text.to_string());
            state.synthesized.len()
        };
        if self.fail_on_call == Some(call) {
            return Err(AudiobookError::BackendRequest {
                message: format!("mock synthesis failure on call {call}"),
            });
        }

        let audio = silent_wav(text)?;
        if self.encoded {
            return Ok(AudioArtifact::Encoded(
                base64::engine::general_purpose::STANDARD.encode(audio),
            ));
        }

        std::fs::create_dir_all(&self.scratch_dir)?;
        let path = self.scratch_dir.join(format!("mock-{call}.wav"));
        std::fs::write(&path, audio)?;
        Ok(AudioArtifact::File(path))
    }

    async fn release(&mut self, keep_alive: bool) -> Result<Released> {
        self.probe.lock().releases.push(keep_alive);
        match self.handle.take() {
            Some(_) if keep_alive => Ok(Released::KeptWarm),
            Some(_) => Ok(Released::Paused),
            None => Ok(Released::Nothing),
        }
    }
}
