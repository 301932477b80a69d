//! Chapter text extraction from XHTML content documents.

use crate::book::BookSource;
use crate::book::sanitize::sanitize;
use crate::defaults;
use crate::error::{AudiobookError, Result};
use scraper::{Html, Selector};

/// One content document of a book, before chapter numbering.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentUnit {
    /// Human-readable title, or the placeholder when none was found
    pub title: String,
    /// Filesystem-safe form of `title`
    pub sanitized_title: String,
    /// Paragraph texts, each ending with the pause token
    pub paragraphs: Vec<String>,
}

impl ContentUnit {
    /// True when the unit carries a real title.
    ///
    /// Placeholder and empty titles are excluded from chapter numbering.
    pub fn has_title(&self) -> bool {
        !self.sanitized_title.is_empty() && self.sanitized_title != defaults::UNTITLED
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| AudiobookError::Other(format!("bad selector {css}: {e}")))
}

/// Extract title and paragraphs from one XHTML document.
///
/// Title comes from `<title>`, then the first `<h1>`, then the placeholder.
/// Every `<p>` becomes a paragraph, text kept as written.
pub fn extract_document(xhtml: &str) -> Result<ContentUnit> {
    let title_sel = selector("title")?;
    let h1_sel = selector("h1")?;
    let p_sel = selector("p")?;

    // The parsed tree lives only inside this scope.
    let (title, paragraphs) = {
        let document = Html::parse_document(xhtml);

        let text_of = |sel: &Selector| {
            document
                .select(sel)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
                .filter(|t| !t.is_empty())
        };

        let title = text_of(&title_sel)
            .or_else(|| text_of(&h1_sel))
            .unwrap_or_else(|| defaults::UNTITLED.to_string());

        let paragraphs: Vec<String> = document
            .select(&p_sel)
            .map(|p| format!("{}{}", p.text().collect::<String>(), defaults::PARAGRAPH_PAUSE))
            .collect();

        (title, paragraphs)
    };

    Ok(ContentUnit {
        sanitized_title: sanitize(&title),
        title,
        paragraphs,
    })
}

/// Extract every content document of `source`, in reading order.
///
/// Untitled units are kept; callers drop them before numbering chapters.
pub fn extract(source: &mut dyn BookSource) -> Result<Vec<ContentUnit>> {
    source
        .documents()?
        .iter()
        .map(|doc| extract_document(doc))
        .collect()
}
