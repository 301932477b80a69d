//! Audiobook assembly: chapter WAVs in, one chaptered M4B out.
//!
//! Every `*.wav` directly in the working directory is an artifact. They are
//! bound in natural filename order, one chapter marker each, and moved to
//! `temp_backup/` once the container is written.

pub mod ffmpeg;
pub mod natural;

use crate::book::sanitize::SEPARATOR;
use crate::book::sanitize_or;
use crate::defaults;
use crate::error::{AudiobookError, Result};
use crate::output::{PipelineEvent, Reporter};
use ffmpeg::{ChapterMark, CommandExecutor};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Container file name: `<title> - <author>.m4b`, both sanitized.
pub fn audiobook_name(title: &str, author: &str) -> String {
    format!(
        "{} - {}.{}",
        sanitize_or(title, defaults::UNKNOWN_TITLE),
        sanitize_or(author, defaults::UNKNOWN_AUTHOR),
        defaults::AUDIOBOOK_EXTENSION
    )
}

/// Chapter artifacts in `dir`, natural-sorted by file name.
///
/// Subdirectories (including the backup directory) are not searched.
pub fn list_artifacts(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut artifacts: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext == defaults::ARTIFACT_EXTENSION)
        })
        .collect();

    artifacts.sort_by(|a, b| {
        let a = a.file_name().unwrap_or_default().to_string_lossy();
        let b = b.file_name().unwrap_or_default().to_string_lossy();
        natural::natural_cmp(&a, &b)
    });
    Ok(artifacts)
}

/// Chapter display name from an artifact path.
///
/// `"3 - The_Storm.wav"` becomes `"The Storm"`.
pub fn chapter_title_from_file(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let title = match stem.split_once(" - ") {
        Some((number, rest)) if number.chars().all(|c| c.is_ascii_digit()) => rest,
        _ => stem.as_str(),
    };
    title.replace(SEPARATOR, " ")
}

/// Duration of a WAV file from its header.
pub fn wav_duration(path: &Path) -> Result<Duration> {
    let reader = hound::WavReader::open(path).map_err(|e| AudiobookError::Assembly {
        message: format!("Cannot read {}: {e}", path.display()),
    })?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Err(AudiobookError::Assembly {
            message: format!("{} has a zero sample rate", path.display()),
        });
    }
    let frames = u64::from(reader.duration());
    Ok(Duration::from_micros(
        frames * 1_000_000 / u64::from(spec.sample_rate),
    ))
}

/// Consecutive chapter markers for `artifacts`.
pub fn chapter_marks(artifacts: &[PathBuf]) -> Result<Vec<ChapterMark>> {
    let mut start = Duration::ZERO;
    artifacts
        .iter()
        .map(|path| {
            let end = start + wav_duration(path)?;
            let mark = ChapterMark {
                title: chapter_title_from_file(path),
                start,
                end,
            };
            start = end;
            Ok(mark)
        })
        .collect()
}

/// What an assembly produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Audiobook {
    pub path: PathBuf,
    pub title: String,
    pub author: String,
    pub chapters: Vec<ChapterMark>,
    /// Artifacts successfully moved to the backup directory
    pub backed_up: Vec<PathBuf>,
}

/// Binds chapter artifacts into an M4B using ffmpeg.
pub struct Assembler<E: CommandExecutor> {
    executor: E,
    bitrate: String,
    publication_date: String,
}

impl<E: CommandExecutor> Assembler<E> {
    pub fn new(executor: E, bitrate: &str, publication_date: &str) -> Self {
        Self {
            executor,
            bitrate: bitrate.to_string(),
            publication_date: publication_date.to_string(),
        }
    }

    /// Assemble every artifact in `working_dir` into the audiobook.
    ///
    /// # Errors
    ///
    /// Fails when there are no artifacts, a WAV header is unreadable, or
    /// ffmpeg fails. Backup moves only report their failures.
    pub fn assemble(
        &self,
        working_dir: &Path,
        title: &str,
        author: &str,
        reporter: &dyn Reporter,
    ) -> Result<Audiobook> {
        let artifacts = list_artifacts(working_dir)?;
        if artifacts.is_empty() {
            return Err(AudiobookError::Assembly {
                message: format!("no chapter audio in {}", working_dir.display()),
            });
        }
        reporter.report(&PipelineEvent::AssemblyStarted {
            artifacts: artifacts.len(),
        });

        let chapters = chapter_marks(&artifacts)?;
        let output = working_dir.join(audiobook_name(title, author));
        let mut partial = output.clone().into_os_string();
        partial.push(".part");
        let partial = PathBuf::from(partial);

        let scratch = tempfile::Builder::new()
            .prefix("audiobooker-mux-")
            .tempdir()?;
        let list_path = scratch.path().join("chapters.txt");
        let metadata_path = scratch.path().join("metadata.txt");

        let files: Vec<&Path> = artifacts.iter().map(PathBuf::as_path).collect();
        fs::write(&list_path, ffmpeg::concat_list(&files))?;
        fs::write(
            &metadata_path,
            ffmpeg::ffmetadata(title, author, &self.publication_date, &chapters),
        )?;

        let args = ffmpeg::mux_args(&list_path, &metadata_path, &self.bitrate, &partial);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        if let Err(e) = self.executor.execute("ffmpeg", &args) {
            if let Err(cleanup) = fs::remove_file(&partial)
                && cleanup.kind() != std::io::ErrorKind::NotFound
            {
                eprintln!(
                    "audiobooker: failed to remove {}: {cleanup}",
                    partial.display()
                );
            }
            return Err(e);
        }
        fs::rename(&partial, &output).map_err(|e| AudiobookError::Assembly {
            message: format!("ffmpeg produced no output at {}: {e}", partial.display()),
        })?;
        reporter.report(&PipelineEvent::AudiobookWritten {
            path: output.clone(),
        });

        let backed_up = backup_artifacts(working_dir, &artifacts, reporter);
        Ok(Audiobook {
            path: output,
            title: title.to_string(),
            author: author.to_string(),
            chapters,
            backed_up,
        })
    }
}

/// Move `artifacts` into `<working_dir>/temp_backup/`.
///
/// Each failure is reported and skipped. Returns the new locations.
pub fn backup_artifacts(
    working_dir: &Path,
    artifacts: &[PathBuf],
    reporter: &dyn Reporter,
) -> Vec<PathBuf> {
    let backup_dir = working_dir.join(defaults::BACKUP_DIR);
    if let Err(e) = fs::create_dir_all(&backup_dir) {
        for path in artifacts {
            reporter.report(&PipelineEvent::BackupFailed {
                path: path.clone(),
                message: e.to_string(),
            });
        }
        return Vec::new();
    }

    let mut moved = Vec::new();
    for path in artifacts {
        let Some(name) = path.file_name() else {
            continue;
        };
        let target = backup_dir.join(name);
        match fs::rename(path, &target) {
            Ok(()) => {
                reporter.report(&PipelineEvent::ArtifactBackedUp {
                    path: target.clone(),
                });
                moved.push(target);
            }
            Err(e) => reporter.report(&PipelineEvent::BackupFailed {
                path: path.clone(),
                message: e.to_string(),
            }),
        }
    }
    moved
}
