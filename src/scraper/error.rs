//! Shared error type for source resolution, transport and extraction.

use thiserror::Error;

/// Errors raised while resolving a source URL, fetching pages, or extracting content from them.
#[derive(Debug, Error)]
pub enum ScraperError {
    // Source resolution
    #[error("Invalid URL: {input}: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("Unsupported source: no parser accepts {url}. Run `novel-archiver sites` for the supported sites.")]
    UnsupportedUrl { url: String },

    // Transport
    #[error("Network error: could not reach {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} when fetching: {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Failed to read response body from {url}: {source}")]
    BodyRead {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    // Extraction
    #[error("Could not extract {what} from {page}: {reason}")]
    Extraction {
        page: &'static str,
        what: &'static str,
        reason: String,
    },

    #[error("Work page has no chapters (possibly removed or access restricted).")]
    EmptyChapterList,
}

impl ScraperError {
    pub(crate) fn work_page(what: &'static str, reason: impl Into<String>) -> Self {
        ScraperError::Extraction {
            page: "work page",
            what,
            reason: reason.into(),
        }
    }

    pub(crate) fn chapter_page(what: &'static str, reason: impl Into<String>) -> Self {
        ScraperError::Extraction {
            page: "chapter page",
            what,
            reason: reason.into(),
        }
    }

    /// True for errors caused by the page content rather than the transport.
    pub fn is_extraction(&self) -> bool {
        matches!(
            self,
            ScraperError::Extraction { .. } | ScraperError::EmptyChapterList
        )
    }
}
