//! Resumable conversion driver.
//!
//! One book goes through
//! `Init → Extracted → BackendReady → SynthesizingChapters → BackendReleased
//! → Assembled → Done`. Chapter artifacts already on disk are never
//! synthesized again, so an interrupted run resumes where it stopped.

use crate::assemble::ffmpeg::CommandExecutor;
use crate::assemble::{Assembler, Audiobook};
use crate::backend::{Backend, Released};
use crate::book::{Book, BookSource};
use crate::config::VoiceConfig;
use crate::error::{AudiobookError, Result};
use crate::output::{PipelineEvent, PipelineStage, Reporter};
use crate::synth::{ChapterArtifact, SynthOutcome, synthesize_chapter};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Settings the driver needs from the configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Parent of the per-book working directories
    pub output_root: PathBuf,
    pub voice: VoiceConfig,
    /// Leave remote compute running when releasing
    pub keep_warm: bool,
}

/// What to do with the backend once a book's chapters are done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterBook {
    /// Release it; this is the last book of the run
    Release,
    /// Keep it for the next book
    KeepReady,
}

/// Summary of one converted book.
#[derive(Debug, Clone, PartialEq)]
pub struct BookReport {
    pub working_dir: PathBuf,
    pub artifacts: Vec<ChapterArtifact>,
    pub synthesized: usize,
    pub skipped: usize,
    pub audiobook: Audiobook,
    pub elapsed: Duration,
}

/// A chapter as a dry run sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedChapter {
    pub index: usize,
    pub title: String,
    pub path: PathBuf,
    /// The artifact already exists and will be skipped
    pub done: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BookPlan {
    pub title: String,
    pub author: String,
    pub working_dir: PathBuf,
    pub chapters: Vec<PlannedChapter>,
}

/// Extract `source` and list what a conversion would do, without a backend.
pub fn plan_book(source: &mut dyn BookSource, output_root: &Path) -> Result<BookPlan> {
    let book = Book::extract(source)?;
    let working_dir = book.working_dir(output_root);
    let chapters = book
        .chapters
        .iter()
        .map(|chapter| {
            let path = chapter.artifact_path(&working_dir);
            PlannedChapter {
                index: chapter.index,
                title: chapter.title.clone(),
                done: path.exists(),
                path,
            }
        })
        .collect();

    Ok(BookPlan {
        title: book.title,
        author: book.author,
        working_dir,
        chapters,
    })
}

pub struct Pipeline<B: Backend, E: CommandExecutor> {
    config: PipelineConfig,
    backend: B,
    assembler: Arc<Assembler<E>>,
    reporter: Arc<dyn Reporter>,
    stage: PipelineStage,
}

impl<B: Backend, E: CommandExecutor + 'static> Pipeline<B, E> {
    pub fn new(
        config: PipelineConfig,
        backend: B,
        assembler: Assembler<E>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            config,
            backend,
            assembler: Arc::new(assembler),
            reporter,
            stage: PipelineStage::Init,
        }
    }

    /// Current step of the book being converted.
    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    fn enter(&mut self, stage: PipelineStage) {
        self.stage = stage;
        self.reporter.report(&PipelineEvent::StageChanged(stage));
    }

    /// Convert one book end to end.
    ///
    /// On any error the backend is released (best effort) before the error
    /// is returned. No step is retried.
    pub async fn convert(
        &mut self,
        source: &mut dyn BookSource,
        after: AfterBook,
    ) -> Result<BookReport> {
        let result = self.run_book(source, after).await;
        if result.is_err() {
            self.release().await;
        }
        result
    }

    /// Convert books one after another on the same backend.
    ///
    /// The backend stays ready between books and is released after the
    /// last one. The first failure stops the run.
    pub async fn convert_all(
        &mut self,
        sources: &mut [Box<dyn BookSource>],
    ) -> Result<Vec<BookReport>> {
        let count = sources.len();
        let mut reports = Vec::with_capacity(count);
        for (i, source) in sources.iter_mut().enumerate() {
            let after = if i + 1 == count {
                AfterBook::Release
            } else {
                AfterBook::KeepReady
            };
            reports.push(self.convert(source.as_mut(), after).await?);
        }
        Ok(reports)
    }

    /// [`convert_all`](Self::convert_all) that gives up when `shutdown`
    /// completes first.
    ///
    /// On shutdown the book in progress is abandoned, the backend is
    /// released and `Ok(None)` is returned. Finished chapters stay on disk.
    pub async fn convert_all_until<F>(
        &mut self,
        sources: &mut [Box<dyn BookSource>],
        shutdown: F,
    ) -> Result<Option<Vec<BookReport>>>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            () = shutdown => {
                self.release().await;
                Ok(None)
            }
            result = self.convert_all(sources) => result.map(Some),
        }
    }

    async fn run_book(
        &mut self,
        source: &mut dyn BookSource,
        after: AfterBook,
    ) -> Result<BookReport> {
        let start = Instant::now();
        self.enter(PipelineStage::Init);

        let book = Book::extract(source)?;
        let working_dir = book.working_dir(&self.config.output_root);
        std::fs::create_dir_all(&working_dir)?;
        self.reporter.report(&PipelineEvent::BookOpened {
            title: book.title.clone(),
            author: book.author.clone(),
            chapters: book.chapters.len(),
            working_dir: working_dir.clone(),
        });
        self.enter(PipelineStage::Extracted);

        let handle = self.backend.ensure_ready(self.reporter.as_ref()).await?;
        self.enter(PipelineStage::BackendReady);

        self.enter(PipelineStage::SynthesizingChapters);
        let total = book.chapters.len();
        let mut artifacts = Vec::with_capacity(total);
        let (mut synthesized, mut skipped) = (0, 0);

        for chapter in &book.chapters {
            let artifact = ChapterArtifact::for_chapter(chapter, &working_dir);
            if !artifact.is_complete() {
                self.reporter.report(&PipelineEvent::ChapterStarted {
                    index: chapter.index,
                    total,
                    title: chapter.title.clone(),
                });
            }

            let outcome = synthesize_chapter(
                &self.backend,
                &handle,
                &chapter.artifact_name(),
                &chapter.paragraphs,
                &self.config.voice,
                &artifact.path,
            )
            .await?;

            match outcome {
                SynthOutcome::Skipped => {
                    skipped += 1;
                    self.reporter.report(&PipelineEvent::ChapterSkipped {
                        index: chapter.index,
                        total,
                        path: artifact.path.clone(),
                    });
                }
                SynthOutcome::Synthesized { elapsed } => {
                    synthesized += 1;
                    self.reporter.report(&PipelineEvent::ChapterFinished {
                        index: chapter.index,
                        total,
                        path: artifact.path.clone(),
                        elapsed,
                        voice: self.config.voice.voice.clone(),
                    });
                }
            }
            artifacts.push(artifact);
        }

        if after == AfterBook::Release {
            self.release().await;
            self.enter(PipelineStage::BackendReleased);
        }

        let audiobook = self.assemble(&working_dir, &book).await?;
        self.enter(PipelineStage::Assembled);

        let elapsed = start.elapsed();
        self.reporter.report(&PipelineEvent::BookFinished {
            title: book.title.clone(),
            elapsed,
        });
        self.enter(PipelineStage::Done);

        Ok(BookReport {
            working_dir,
            artifacts,
            synthesized,
            skipped,
            audiobook,
            elapsed,
        })
    }

    /// Release the backend honoring `keep_warm`. Failures are reported only.
    pub async fn release(&mut self) -> Option<Released> {
        match self.backend.release(self.config.keep_warm).await {
            Ok(released) => {
                self.reporter
                    .report(&PipelineEvent::BackendReleased(released));
                Some(released)
            }
            Err(e) => {
                self.reporter.report(&PipelineEvent::BackendReleaseFailed {
                    message: e.to_string(),
                });
                None
            }
        }
    }

    /// Run the assembler off the async driver; muxing blocks for minutes.
    async fn assemble(&self, working_dir: &Path, book: &Book) -> Result<Audiobook> {
        let assembler = Arc::clone(&self.assembler);
        let reporter = Arc::clone(&self.reporter);
        let working_dir = working_dir.to_path_buf();
        let (title, author) = (book.title.clone(), book.author.clone());

        tokio::task::spawn_blocking(move || {
            assembler.assemble(&working_dir, &title, &author, reporter.as_ref())
        })
        .await
        .map_err(|e| AudiobookError::Assembly {
            message: format!("assembly task failed: {e}"),
        })?
    }
}
