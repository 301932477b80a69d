//! Audiobooker application entry points.
//!
//! Wires configuration, backend, assembler and reporter together for each
//! CLI command.

use crate::assemble::Assembler;
use crate::assemble::ffmpeg::SystemCommandExecutor;
use crate::backend::Backend;
use crate::backend::gradio::GradioClient;
use crate::backend::space::{HubSpaceControl, SpaceBackend, SpaceControl};
use crate::book::BookSource;
use crate::book::epub::EpubBook;
use crate::config::Config;
use crate::error::{AudiobookError, Result};
use crate::output::{Reporter, TerminalReporter};
use crate::pipeline::{BookPlan, BookReport, Pipeline, PipelineConfig, plan_book};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Command-line values that take precedence over file and environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub voice: Option<String>,
    pub endpoint: Option<String>,
    pub space_id: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub keep_warm: bool,
    pub poll_interval: Option<Duration>,
    pub ready_timeout: Option<Duration>,
    pub publication_date: Option<String>,
}

impl Overrides {
    pub fn apply(self, config: &mut Config) {
        if let Some(voice) = self.voice {
            config.voice.voice = voice;
        }
        if let Some(endpoint) = self.endpoint {
            config.backend.endpoint = Some(endpoint);
        }
        if let Some(space_id) = self.space_id {
            config.backend.space_id = Some(space_id);
        }
        if let Some(dir) = self.output_dir {
            config.output.directory = dir;
        }
        if self.keep_warm {
            config.backend.keep_warm = true;
        }
        if let Some(interval) = self.poll_interval {
            config.backend.poll_interval_secs = interval.as_secs();
        }
        if let Some(timeout) = self.ready_timeout {
            config.backend.ready_timeout_secs = timeout.as_secs();
        }
        if let Some(date) = self.publication_date {
            config.output.publication_date = Some(date);
        }
    }
}

/// Select the backend the configuration describes.
///
/// A voice naming an existing audio file selects the local server;
/// otherwise a Gradio endpoint is required, with Space control when a
/// space id is configured.
pub fn build_backend(config: &Config) -> Result<Box<dyn Backend>> {
    if let Some(reference) = config.voice.reference_file() {
        return local_backend(config, reference);
    }

    let endpoint =
        config
            .backend
            .endpoint
            .as_deref()
            .ok_or_else(|| AudiobookError::ConfigInvalidValue {
                key: "backend.endpoint".to_string(),
                message: "no TTS endpoint configured (set AUDIOBOOKER_ENDPOINT or --endpoint)"
                    .to_string(),
            })?;

    let gradio = GradioClient::new(
        endpoint,
        config.backend.token.clone(),
        std::env::temp_dir().join("audiobooker"),
    );
    let control = config.backend.space_id.as_deref().map(|space_id| {
        Box::new(HubSpaceControl::new(
            &config.backend.hub_url,
            space_id,
            config.backend.token.clone(),
        )) as Box<dyn SpaceControl>
    });

    Ok(Box::new(SpaceBackend::new(
        gradio,
        control,
        config.backend.poll_interval(),
        config.backend.ready_timeout(),
    )))
}

#[cfg(feature = "local-server")]
fn local_backend(config: &Config, reference: &Path) -> Result<Box<dyn Backend>> {
    Ok(Box::new(crate::backend::local::LocalBackend::new(
        &config.backend.local_endpoint,
        reference,
    )))
}

#[cfg(not(feature = "local-server"))]
fn local_backend(_config: &Config, reference: &Path) -> Result<Box<dyn Backend>> {
    Err(AudiobookError::ConfigInvalidValue {
        key: "voice".to_string(),
        message: format!(
            "{} is a reference voice file, but this build lacks the local-server feature",
            reference.display()
        ),
    })
}

/// Publication date tag: configured value or today's date (`YYYY-MM-DD`).
pub fn publication_date(config: &Config) -> String {
    match &config.output.publication_date {
        Some(date) => date.clone(),
        None => humantime::format_rfc3339(SystemTime::now())
            .to_string()
            .chars()
            .take(10)
            .collect(),
    }
}

fn open_books(paths: &[PathBuf]) -> Result<Vec<Box<dyn BookSource>>> {
    paths
        .iter()
        .map(|path| EpubBook::open(path).map(|book| Box::new(book) as Box<dyn BookSource>))
        .collect()
}

/// Completes on Ctrl+C. Never completes if the handler cannot be installed.
pub async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        eprintln!("audiobooker: cannot listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
}

/// Run the convert command: every book in order, one shared backend.
///
/// When `shutdown` completes first the backend is released; finished
/// chapters stay on disk and are skipped next time. Returns `None` when
/// interrupted.
pub async fn run_convert<F>(
    config: Config,
    books: &[PathBuf],
    quiet: bool,
    verbosity: u8,
    shutdown: F,
) -> Result<Option<Vec<BookReport>>>
where
    F: Future<Output = ()>,
{
    config.validate()?;
    // Open everything first so a bad path fails before the backend starts
    let mut sources = open_books(books)?;

    let reporter: Arc<dyn Reporter> = Arc::new(TerminalReporter::new(quiet, verbosity));
    let backend = build_backend(&config)?;
    let assembler = Assembler::new(
        SystemCommandExecutor::new(),
        &config.output.bitrate,
        &publication_date(&config),
    );
    let mut pipeline = Pipeline::new(
        PipelineConfig {
            output_root: config.output.directory.clone(),
            voice: config.voice.clone(),
            keep_warm: config.backend.keep_warm,
        },
        backend,
        assembler,
        reporter,
    );

    let outcome = pipeline.convert_all_until(&mut sources, shutdown).await?;
    if outcome.is_none() && !quiet {
        eprintln!("\nInterrupted; finished chapters are kept for the next run.");
    }
    Ok(outcome)
}

/// Run the chapters command: what a conversion would produce.
pub fn run_chapters(config: &Config, book: &Path) -> Result<BookPlan> {
    let mut source = EpubBook::open(book)?;
    plan_book(&mut source, &config.output.directory)
}

/// Run the assemble command on a book's existing working directory.
pub fn run_assemble(
    config: &Config,
    book: &Path,
    quiet: bool,
    verbosity: u8,
) -> Result<PathBuf> {
    let plan = run_chapters(config, book)?;
    if !plan.working_dir.is_dir() {
        return Err(AudiobookError::Assembly {
            message: format!(
                "working directory {} does not exist; convert the book first",
                plan.working_dir.display()
            ),
        });
    }

    let reporter = TerminalReporter::new(quiet, verbosity);
    let assembler = Assembler::new(
        SystemCommandExecutor::new(),
        &config.output.bitrate,
        &publication_date(config),
    );
    assembler
        .assemble(&plan.working_dir, &plan.title, &plan.author, &reporter)
        .map(|audiobook| audiobook.path)
}
