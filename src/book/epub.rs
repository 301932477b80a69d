//! EPUB container access via the `epub` crate.

use crate::book::BookSource;
use crate::error::{AudiobookError, Result};
use ::epub::doc::EpubDoc;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// An opened EPUB file.
pub struct EpubBook {
    doc: EpubDoc<BufReader<File>>,
}

impl EpubBook {
    /// Open and index an EPUB container.
    ///
    /// # Errors
    ///
    /// Returns [`AudiobookError::BookOpen`] if the file is missing or is not
    /// a readable EPUB.
    pub fn open(path: &Path) -> Result<Self> {
        let doc = EpubDoc::new(path).map_err(|e| AudiobookError::BookOpen {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { doc })
    }
}

impl BookSource for EpubBook {
    fn title(&self) -> Option<String> {
        self.doc.mdata("title")
    }

    fn author(&self) -> Option<String> {
        self.doc.mdata("creator")
    }

    /// Spine documents in reading order. Non-XHTML spine items are skipped.
    fn documents(&mut self) -> Result<Vec<String>> {
        let mut documents = Vec::new();
        for i in 0..self.doc.get_num_pages() {
            if !self.doc.set_current_page(i) {
                continue;
            }
            if let Some((content, mime)) = self.doc.get_current_str()
                && mime.contains("html")
            {
                documents.push(content);
            }
        }
        Ok(documents)
    }
}
