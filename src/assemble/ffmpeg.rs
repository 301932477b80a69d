//! ffmpeg invocation for muxing chapter WAVs into one M4B.
//!
//! The `CommandExecutor` trait keeps the muxing step testable without
//! ffmpeg installed.

use crate::error::{AudiobookError, Result};
use std::path::Path;
use std::process::Command;
use std::time::Duration;

/// Trait for executing system commands.
///
/// Object-safe, Send + Sync for use in concurrent contexts.
/// Enables testability by allowing mock implementations.
pub trait CommandExecutor: Send + Sync {
    /// Execute a command with arguments.
    ///
    /// Returns the stdout of the command on success.
    /// Returns an error if the command fails or is not found.
    fn execute(&self, command: &str, args: &[&str]) -> Result<String>;
}

/// Production command executor using std::process::Command.
#[derive(Debug, Clone, Default)]
pub struct SystemCommandExecutor;

impl SystemCommandExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl CommandExecutor for SystemCommandExecutor {
    fn execute(&self, command: &str, args: &[&str]) -> Result<String> {
        let output = Command::new(command).args(args).output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AudiobookError::AssemblyToolNotFound {
                    tool: command.to_string(),
                }
            } else {
                AudiobookError::Assembly {
                    message: format!("Failed to execute {command}: {e}"),
                }
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AudiobookError::Assembly {
                message: format!(
                    "{command} failed with status {:?}: {}",
                    output.status.code(),
                    stderr.trim()
                ),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// One chapter marker in the output container.
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterMark {
    pub title: String,
    pub start: Duration,
    pub end: Duration,
}

/// Escape a value for an FFMETADATA file.
fn escape_metadata(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '=' | ';' | '#' | '\\' | '\n') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// FFMETADATA1 document with global tags and one `[CHAPTER]` per mark.
pub fn ffmetadata(title: &str, author: &str, date: &str, chapters: &[ChapterMark]) -> String {
    let mut out = String::from(";FFMETADATA1\n");
    out.push_str(&format!("title={}\n", escape_metadata(title)));
    out.push_str(&format!("album={}\n", escape_metadata(title)));
    out.push_str(&format!("artist={}\n", escape_metadata(author)));
    out.push_str(&format!("album_artist={}\n", escape_metadata(author)));
    out.push_str(&format!("date={}\n", escape_metadata(date)));
    out.push_str("genre=Audiobook\n");

    for chapter in chapters {
        out.push_str("\n[CHAPTER]\nTIMEBASE=1/1000\n");
        out.push_str(&format!("START={}\n", chapter.start.as_millis()));
        out.push_str(&format!("END={}\n", chapter.end.as_millis()));
        out.push_str(&format!("title={}\n", escape_metadata(&chapter.title)));
    }
    out
}

/// Input list for ffmpeg's concat demuxer.
pub fn concat_list(files: &[&Path]) -> String {
    files
        .iter()
        .map(|path| {
            let quoted = path.display().to_string().replace('\'', r"'\''");
            format!("file '{quoted}'\n")
        })
        .collect()
}

/// Arguments muxing `list` + `metadata` into an AAC M4B at `output`.
pub fn mux_args(list: &Path, metadata: &Path, bitrate: &str, output: &Path) -> Vec<String> {
    [
        "-hide_banner",
        "-loglevel",
        "error",
        "-y",
        "-f",
        "concat",
        "-safe",
        "0",
        "-i",
    ]
    .iter()
    .map(|s| s.to_string())
    .chain([list.display().to_string()])
    .chain(["-i".to_string(), metadata.display().to_string()])
    .chain(
        [
            "-map",
            "0:a",
            "-map_metadata",
            "1",
            "-map_chapters",
            "1",
            "-c:a",
            "aac",
            "-b:a",
        ]
        .iter()
        .map(|s| s.to_string()),
    )
    .chain([bitrate.to_string()])
    .chain(["-f".to_string(), "ipod".to_string()])
    .chain([output.display().to_string()])
    .collect()
}
