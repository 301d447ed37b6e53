//! novel-archiver: archive serialized web novels chapter by chapter into a local library and
//! repackage archived works as EPUB.

pub mod archive;
pub mod cli;
pub mod config;
pub mod epub;
pub mod model;
pub mod path;
pub mod repository;
pub mod scraper;

// Re-exports for CLI and consumers.
pub use archive::{archive_work, convert_work, ArchiveError, ArchiveOptions, ConvertOptions};
pub use epub::{build_package, write_package, PackageError, PackageSpec};
pub use repository::{Repository, RepositoryError};
pub use crate::scraper::{Fetch, HttpClient, Parser, ParserRegistry, ScraperError, Site};
