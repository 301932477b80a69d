//! Per-chapter synthesis with skip-if-present resumability.
//!
//! A chapter artifact only ever appears under its final name once it is
//! complete: audio is staged as `<path>.part` and renamed into place.

use crate::backend::{AudioArtifact, Backend, BackendHandle};
use crate::book::Chapter;
use crate::config::VoiceConfig;
use crate::defaults;
use crate::error::{AudiobookError, Result};
use base64::Engine;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Where a chapter's audio lives. Its existence marks the chapter done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterArtifact {
    pub path: PathBuf,
    pub chapter_index: usize,
    pub format: &'static str,
}

impl ChapterArtifact {
    pub fn for_chapter(chapter: &Chapter, working_dir: &Path) -> Self {
        Self {
            path: chapter.artifact_path(working_dir),
            chapter_index: chapter.index,
            format: defaults::ARTIFACT_EXTENSION,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.path.exists()
    }
}

/// Result of one chapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthOutcome {
    /// The artifact was already there; the backend was not called
    Skipped,
    Synthesized { elapsed: Duration },
}

/// Synthesize one chapter into `path` unless it already exists.
///
/// `label` names the chapter in errors.
pub async fn synthesize_chapter(
    backend: &dyn Backend,
    handle: &BackendHandle,
    label: &str,
    paragraphs: &[String],
    voice: &VoiceConfig,
    path: &Path,
) -> Result<SynthOutcome> {
    if path.exists() {
        return Ok(SynthOutcome::Skipped);
    }

    let start = Instant::now();
    let text = paragraphs.join("\n");
    let artifact = backend
        .synthesize(handle, &text, voice)
        .await
        .map_err(|e| synthesis_error(label, e.to_string()))?;

    place_artifact(artifact, path).map_err(|e| synthesis_error(label, e.to_string()))?;
    Ok(SynthOutcome::Synthesized {
        elapsed: start.elapsed(),
    })
}

fn synthesis_error(label: &str, message: String) -> AudiobookError {
    AudiobookError::Synthesis {
        chapter: label.to_string(),
        message,
    }
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

/// Move backend output to `path`.
///
/// Empty or missing output is an error and leaves `path` untouched.
pub fn place_artifact(artifact: AudioArtifact, path: &Path) -> Result<()> {
    let part = part_path(path);
    match artifact {
        AudioArtifact::File(source) => {
            if source.as_os_str().is_empty() {
                return Err(AudiobookError::Other(
                    "backend returned no audio file".to_string(),
                ));
            }
            let size = fs::metadata(&source)
                .map_err(|e| {
                    AudiobookError::Other(format!(
                        "backend audio {} unavailable: {e}",
                        source.display()
                    ))
                })?
                .len();
            if size == 0 {
                return Err(AudiobookError::Other(format!(
                    "backend audio {} is empty",
                    source.display()
                )));
            }

            if fs::rename(&source, path).is_err() {
                // Different filesystem: copy next to the target first
                fs::copy(&source, &part)?;
                fs::rename(&part, path)?;
                if let Err(e) = fs::remove_file(&source) {
                    eprintln!(
                        "audiobooker: failed to remove {}: {e}",
                        source.display()
                    );
                }
            }
        }
        AudioArtifact::Encoded(payload) => {
            let audio = base64::engine::general_purpose::STANDARD
                .decode(payload.trim())
                .map_err(|e| AudiobookError::Other(format!("invalid base64 audio: {e}")))?;
            if audio.is_empty() {
                return Err(AudiobookError::Other(
                    "backend returned empty audio".to_string(),
                ));
            }
            fs::write(&part, audio)?;
            fs::rename(&part, path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::output::SilentReporter;

    fn paragraphs(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|l| l.to_string()).collect()
    }

    #[tokio::test]
    async fn existing_artifact_is_skipped_without_backend_call() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1 - Ch1.wav");
        fs::write(&path, b"already here").unwrap();

        let mut backend = MockBackend::new(dir.path().join("scratch"));
        let probe = backend.probe();
        let handle = backend.ensure_ready(&SilentReporter).await.unwrap();

        let outcome = synthesize_chapter(
            &backend,
            &handle,
            "Ch1",
            &paragraphs(&["a , "]),
            &VoiceConfig::default(),
            &path,
        )
        .await
        .unwrap();

        assert_eq!(outcome, SynthOutcome::Skipped);
        assert!(probe.synthesized().is_empty());
        assert_eq!(fs::read(&path).unwrap(), b"already here");
    }

    #[tokio::test]
    async fn paragraphs_are_joined_with_newlines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1 - Ch1.wav");

        let mut backend = MockBackend::new(dir.path().join("scratch"));
        let probe = backend.probe();
        let handle = backend.ensure_ready(&SilentReporter).await.unwrap();

        let outcome = synthesize_chapter(
            &backend,
            &handle,
            "Ch1",
            &paragraphs(&["First , ", "Second , "]),
            &VoiceConfig::default(),
            &path,
        )
        .await
        .unwrap();

        assert!(matches!(outcome, SynthOutcome::Synthesized { .. }));
        assert_eq!(probe.synthesized(), vec!["First , \nSecond , "]);
        assert!(path.exists());
        assert!(!part_path(&path).exists());
    }

    #[tokio::test]
    async fn encoded_output_is_decoded_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1 - Ch1.wav");

        let mut backend = MockBackend::new(dir.path().join("scratch")).with_encoded_output();
        let handle = backend.ensure_ready(&SilentReporter).await.unwrap();

        synthesize_chapter(
            &backend,
            &handle,
            "Ch1",
            &paragraphs(&["x"]),
            &VoiceConfig::default(),
            &path,
        )
        .await
        .unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert!(reader.duration() > 0);
    }

    #[tokio::test]
    async fn backend_failure_leaves_no_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1 - Ch1.wav");

        let mut backend = MockBackend::new(dir.path().join("scratch")).with_failure_on_call(1);
        let handle = backend.ensure_ready(&SilentReporter).await.unwrap();

        let err = synthesize_chapter(
            &backend,
            &handle,
            "Ch1",
            &paragraphs(&["x"]),
            &VoiceConfig::default(),
            &path,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AudiobookError::Synthesis { ref chapter, .. } if chapter == "Ch1"));
        assert!(!path.exists());
    }

    #[test]
    fn empty_outputs_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1 - Ch1.wav");

        assert!(place_artifact(AudioArtifact::File(PathBuf::new()), &path).is_err());
        assert!(place_artifact(AudioArtifact::Encoded(String::new()), &path).is_err());
        assert!(place_artifact(AudioArtifact::Encoded("not base64!".into()), &path).is_err());

        let empty = dir.path().join("empty.wav");
        fs::write(&empty, b"").unwrap();
        assert!(place_artifact(AudioArtifact::File(empty), &path).is_err());

        assert!(!path.exists());
    }

    #[test]
    fn file_output_is_moved() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("download.wav");
        fs::write(&source, b"RIFF").unwrap();
        let path = dir.path().join("1 - Ch1.wav");

        place_artifact(AudioArtifact::File(source.clone()), &path).unwrap();
        assert!(!source.exists());
        assert_eq!(fs::read(&path).unwrap(), b"RIFF");
    }
}
