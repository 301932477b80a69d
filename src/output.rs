//! Pipeline progress events and their terminal rendering.

use crate::backend::Released;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

/// Steps of the conversion state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Init,
    Extracted,
    BackendReady,
    SynthesizingChapters,
    BackendReleased,
    Assembled,
    Done,
}

/// Something worth telling the user about.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    StageChanged(PipelineStage),
    BookOpened {
        title: String,
        author: String,
        chapters: usize,
        working_dir: PathBuf,
    },
    BackendRestarting {
        stage: String,
    },
    BackendWaiting {
        stage: String,
        waited: Duration,
    },
    BackendReady {
        endpoint: String,
        waited: Duration,
    },
    ChapterSkipped {
        index: usize,
        total: usize,
        path: PathBuf,
    },
    ChapterStarted {
        index: usize,
        total: usize,
        title: String,
    },
    ChapterFinished {
        index: usize,
        total: usize,
        path: PathBuf,
        elapsed: Duration,
        voice: String,
    },
    BackendReleased(Released),
    BackendReleaseFailed {
        message: String,
    },
    AssemblyStarted {
        artifacts: usize,
    },
    AudiobookWritten {
        path: PathBuf,
    },
    ArtifactBackedUp {
        path: PathBuf,
    },
    BackupFailed {
        path: PathBuf,
        message: String,
    },
    BookFinished {
        title: String,
        elapsed: Duration,
    },
}

impl PipelineEvent {
    /// Warnings are shown even in quiet mode.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            PipelineEvent::BackendReleaseFailed { .. } | PipelineEvent::BackupFailed { .. }
        )
    }

    /// Minimum verbosity at which the event is rendered.
    fn min_verbosity(&self) -> u8 {
        match self {
            PipelineEvent::StageChanged(_) => 2,
            PipelineEvent::BackendWaiting { .. }
            | PipelineEvent::ChapterSkipped { .. }
            | PipelineEvent::ArtifactBackedUp { .. } => 1,
            _ => 0,
        }
    }
}

/// Trait for receiving pipeline events.
pub trait Reporter: Send + Sync {
    fn report(&self, event: &PipelineEvent);
}

/// Render an event as one terminal line, or None if it is filtered out.
pub fn render_event(event: &PipelineEvent, verbosity: u8) -> Option<String> {
    if verbosity < event.min_verbosity() {
        return None;
    }

    let line = match event {
        PipelineEvent::StageChanged(stage) => format!("{DIM}[stage] {stage:?}{RESET}"),
        PipelineEvent::BookOpened {
            title,
            author,
            chapters,
            working_dir,
        } => format!(
            "Book: {title}\nAuthor: {author}\n{chapters} chapter(s) → {}",
            working_dir.display()
        ),
        PipelineEvent::BackendRestarting { stage } => {
            format!("TTS backend is {stage}, requesting restart...")
        }
        PipelineEvent::BackendWaiting { stage, waited } => {
            format!(
                "{DIM}Waiting for TTS backend ({stage}, {}s elapsed){RESET}",
                waited.as_secs()
            )
        }
        PipelineEvent::BackendReady { endpoint, waited } => {
            if waited.is_zero() {
                format!("TTS backend ready: {endpoint}")
            } else {
                format!(
                    "TTS backend ready after {}s: {endpoint}",
                    waited.as_secs()
                )
            }
        }
        PipelineEvent::ChapterSkipped { index, total, path } => format!(
            "{DIM}[{index}/{total}] already done: {}{RESET}",
            file_name(path)
        ),
        PipelineEvent::ChapterStarted { index, total, title } => {
            format!("[{index}/{total}] Narrating {title}...")
        }
        PipelineEvent::ChapterFinished {
            index,
            total,
            path,
            elapsed,
            voice,
        } => format!(
            "{GREEN}[{index}/{total}] Chapter finished in {:.1}s{RESET} ({}, voice {voice})",
            elapsed.as_secs_f64(),
            file_name(path)
        ),
        PipelineEvent::BackendReleased(released) => match released {
            Released::Paused => "TTS backend paused.".to_string(),
            Released::KeptWarm => "TTS backend left running (--keep-warm).".to_string(),
            Released::Shutdown => "Reference voice server stopped.".to_string(),
            Released::Nothing => return None,
        },
        PipelineEvent::BackendReleaseFailed { message } => {
            format!("{YELLOW}Warning: could not release TTS backend: {message}{RESET}")
        }
        PipelineEvent::AssemblyStarted { artifacts } => {
            format!("Chapters done, binding {artifacts} file(s) into an audiobook...")
        }
        PipelineEvent::AudiobookWritten { path } => {
            format!("{GREEN}Audiobook written: {}{RESET}", path.display())
        }
        PipelineEvent::ArtifactBackedUp { path } => {
            format!("{DIM}Moved {} to backup{RESET}", file_name(path))
        }
        PipelineEvent::BackupFailed { path, message } => {
            format!(
                "{RED}Error: could not back up {}: {message}{RESET}",
                path.display()
            )
        }
        PipelineEvent::BookFinished { title, elapsed } => {
            format!(
                "Book '{title}' generated in {}",
                humanize(*elapsed)
            )
        }
    };
    Some(line)
}

fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Format a duration as `1h02m03s`, `2m03s` or `3.4s`.
pub fn humanize(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h{:02}m{:02}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}

/// Reporter that prints to stderr, with a progress bar over chapters.
pub struct TerminalReporter {
    quiet: bool,
    verbosity: u8,
    progress: Mutex<Option<ProgressBar>>,
}

impl TerminalReporter {
    pub fn new(quiet: bool, verbosity: u8) -> Self {
        Self {
            quiet,
            verbosity,
            progress: Mutex::new(None),
        }
    }

    fn with_bar(&self, f: impl FnOnce(&mut Option<ProgressBar>)) {
        match self.progress.lock() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    fn print(&self, line: &str) {
        self.with_bar(|bar| match bar {
            Some(pb) => pb.println(line),
            None => eprintln!("{line}"),
        });
    }
}

impl Reporter for TerminalReporter {
    fn report(&self, event: &PipelineEvent) {
        if self.quiet && !event.is_warning() {
            return;
        }

        if let Some(line) = render_event(event, self.verbosity) {
            self.print(&line);
        }

        match event {
            PipelineEvent::BookOpened { chapters, .. } => self.with_bar(|bar| {
                let pb = ProgressBar::new(*chapters as u64);
                pb.set_style(
                    ProgressStyle::default_bar()
                        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chapters")
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("#>-"),
                );
                *bar = Some(pb);
            }),
            PipelineEvent::ChapterSkipped { .. } | PipelineEvent::ChapterFinished { .. } => {
                self.with_bar(|bar| {
                    if let Some(pb) = bar {
                        pb.inc(1);
                    }
                })
            }
            PipelineEvent::BackendReleased(_)
            | PipelineEvent::BackendReleaseFailed { .. }
            | PipelineEvent::AssemblyStarted { .. } => self.with_bar(|bar| {
                if let Some(pb) = bar.take() {
                    pb.finish_and_clear();
                }
            }),
            _ => {}
        }
    }
}

/// Reporter that records every event, for tests.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<PipelineEvent>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Reporter for CollectingReporter {
    fn report(&self, event: &PipelineEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}

/// Reporter that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentReporter;

impl Reporter for SilentReporter {
    fn report(&self, _event: &PipelineEvent) {}
}
