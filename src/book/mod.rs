//! Book model: metadata, content documents and numbered chapters.

pub mod epub;
pub mod extract;
pub mod sanitize;

use crate::defaults;
use crate::error::{AudiobookError, Result};
use extract::ContentUnit;
use sanitize::sanitize;
use std::path::{Path, PathBuf};

/// A parsed e-book container.
///
/// Allows swapping implementations (real EPUB vs in-memory documents).
pub trait BookSource {
    /// Dublin Core title, if present
    fn title(&self) -> Option<String>;

    /// Dublin Core creator, if present
    fn author(&self) -> Option<String>;

    /// XHTML content documents in reading order
    fn documents(&mut self) -> Result<Vec<String>>;
}

/// In-memory book for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryBook {
    title: Option<String>,
    author: Option<String>,
    documents: Vec<String>,
}

impl MemoryBook {
    pub fn new(title: &str, author: &str) -> Self {
        Self {
            title: Some(title.to_string()),
            author: Some(author.to_string()),
            documents: Vec::new(),
        }
    }

    /// Book without any Dublin Core metadata
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, xhtml: impl Into<String>) -> Self {
        self.documents.push(xhtml.into());
        self
    }
}

impl BookSource for MemoryBook {
    fn title(&self) -> Option<String> {
        self.title.clone()
    }

    fn author(&self) -> Option<String> {
        self.author.clone()
    }

    fn documents(&mut self) -> Result<Vec<String>> {
        Ok(self.documents.clone())
    }
}

/// A numbered, synthesizable chapter.
#[derive(Debug, Clone, PartialEq)]
pub struct Chapter {
    /// 1-based position among synthesizable chapters
    pub index: usize,
    pub title: String,
    pub sanitized_title: String,
    pub paragraphs: Vec<String>,
}

impl Chapter {
    /// Artifact file name, e.g. `3 - The_Storm.wav`.
    pub fn artifact_name(&self) -> String {
        format!(
            "{} - {}.{}",
            self.index,
            self.sanitized_title,
            defaults::ARTIFACT_EXTENSION
        )
    }

    pub fn artifact_path(&self, working_dir: &Path) -> PathBuf {
        working_dir.join(self.artifact_name())
    }
}

/// Number the units that carry a real title.
///
/// Numbering follows reading order and ignores any numbering in the source.
/// Titled units without paragraph text keep their number.
pub fn synthesizable_chapters(units: Vec<ContentUnit>) -> Vec<Chapter> {
    units
        .into_iter()
        .filter(ContentUnit::has_title)
        .enumerate()
        .map(|(i, unit)| Chapter {
            index: i + 1,
            title: unit.title,
            sanitized_title: unit.sanitized_title,
            paragraphs: unit.paragraphs,
        })
        .collect()
}

/// An extracted book. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    pub title: String,
    pub author: String,
    pub chapters: Vec<Chapter>,
}

impl Book {
    /// Extract metadata and chapters from `source`.
    ///
    /// # Errors
    ///
    /// Returns [`AudiobookError::NoChapters`] when no titled unit has any
    /// paragraph text.
    pub fn extract(source: &mut dyn BookSource) -> Result<Self> {
        let title = source
            .title()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| defaults::UNKNOWN_TITLE.to_string());
        let author = source
            .author()
            .filter(|a| !a.trim().is_empty())
            .unwrap_or_else(|| defaults::UNKNOWN_AUTHOR.to_string());

        let chapters = synthesizable_chapters(extract::extract(source)?);
        if chapters.iter().all(|c| c.paragraphs.is_empty()) {
            return Err(AudiobookError::NoChapters {
                title: sanitize(&title),
            });
        }

        Ok(Self {
            title,
            author,
            chapters,
        })
    }

    /// Filesystem-safe title, never empty.
    pub fn sanitized_title(&self) -> String {
        sanitize_or(&self.title, defaults::UNKNOWN_TITLE)
    }

    pub fn sanitized_author(&self) -> String {
        sanitize_or(&self.author, defaults::UNKNOWN_AUTHOR)
    }

    /// Per-book working directory under `output_root`.
    pub fn working_dir(&self, output_root: &Path) -> PathBuf {
        output_root.join(self.sanitized_title())
    }
}

/// Sanitize `raw`, falling back to `fallback` when nothing survives.
pub fn sanitize_or(raw: &str, fallback: &str) -> String {
    let value = sanitize(raw);
    if value.is_empty() {
        fallback.to_string()
    } else {
        value
    }
}
