//! Archival and conversion workflows: scrape a work chapter by chapter into the repository, and
//! turn an archived work into an EPUB.

use crate::epub::{
    build_package, cover_page, table_of_contents_page, write_package, Cover, Image, ImageFormat,
    PackageContent, PackageError, PackageSpec, Section,
};
use crate::path::sanitize_filename;
use crate::repository::{Repository, RepositoryError};
use crate::scraper::{Fetch, ParserRegistry, ScraperError};
use chrono::Utc;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_CHAPTER_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_AUTHOR: &str = "Unknown";

/// Errors from the archival and conversion workflows. Each names the step and the work.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("{source}")]
    Resolve {
        #[source]
        source: ScraperError,
    },

    #[error("Failed to read work page {url}: {source}")]
    WorkPage {
        url: String,
        #[source]
        source: ScraperError,
    },

    #[error("Failed to archive chapter {index}/{total} of \"{work}\" ({url}): {source}")]
    Chapter {
        work: String,
        index: usize,
        total: usize,
        url: String,
        #[source]
        source: ScraperError,
    },

    #[error("Storage error for \"{work}\": {source}")]
    Storage {
        work: String,
        #[source]
        source: RepositoryError,
    },

    #[error("Failed to package \"{work}\": {source}")]
    Package {
        work: String,
        #[source]
        source: PackageError,
    },
}

impl ArchiveError {
    fn storage(work: &str) -> impl FnOnce(RepositoryError) -> ArchiveError + '_ {
        move |source| ArchiveError::Storage {
            work: work.to_string(),
            source,
        }
    }

    fn package(work: &str) -> impl FnOnce(PackageError) -> ArchiveError + '_ {
        move |source| ArchiveError::Package {
            work: work.to_string(),
            source,
        }
    }
}

/// Options for an archival run.
pub struct ArchiveOptions<'a> {
    /// Pause after each chapter.
    pub delay: Duration,
    /// Indent chapter pages.
    pub pretty: bool,
    /// Continue an existing archive instead of starting over.
    pub resume: bool,
    /// Called after each persisted chapter with (1-based index, total, chapter title).
    pub progress: Option<&'a dyn Fn(usize, usize, &str)>,
}

impl Default for ArchiveOptions<'_> {
    fn default() -> Self {
        Self {
            delay: DEFAULT_CHAPTER_DELAY,
            pretty: true,
            resume: false,
            progress: None,
        }
    }
}

impl std::fmt::Debug for ArchiveOptions<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveOptions")
            .field("delay", &self.delay)
            .field("pretty", &self.pretty)
            .field("resume", &self.resume)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// Archive the work at `url` and return its title.
///
/// Resolution and the work page are handled before any storage exists, so those failures leave
/// nothing behind. The chapter loop is not transactional: a failure stops it, and chapters
/// already saved stay on disk.
///
/// Without `resume` any existing archive of the same title is replaced. With `resume` and an
/// existing archive, its stored chapter list is used and chapters already saved in order are
/// skipped.
pub fn archive_work(
    url: &str,
    registry: &ParserRegistry,
    fetch: &mut dyn Fetch,
    repo: &Repository,
    options: &ArchiveOptions<'_>,
) -> Result<String, ArchiveError> {
    let site = registry
        .resolve_site(url)
        .map_err(|source| ArchiveError::Resolve { source })?;
    let parser = site.parser();
    info!(url, site = site.name(), "archiving");

    let work_page = |source| ArchiveError::WorkPage {
        url: url.to_string(),
        source,
    };
    let html = fetch.fetch_text(url).map_err(work_page)?;
    let online = parser.parse_work_metadata(&html, fetch).map_err(work_page)?;
    let title = online.title.clone();

    let (links, skip) = if options.resume && repo.is_archived(&title) {
        let stored = repo
            .load_metadata(&title)
            .map_err(ArchiveError::storage(&title))?;
        let skip = repo.archived_prefix_len(&title, &stored);
        info!(work = %title, done = skip, total = stored.chapter_links.len(), "resuming");
        (stored.chapter_links, skip)
    } else {
        repo.create_work(&online, true)
            .map_err(ArchiveError::storage(&title))?;
        (online.chapter_links, 0)
    };

    let total = links.len();
    for (i, link) in links.iter().enumerate().skip(skip) {
        let index = i + 1;
        let chapter_error = |source| ArchiveError::Chapter {
            work: title.clone(),
            index,
            total,
            url: link.clone(),
            source,
        };
        let page = fetch.fetch_text(link).map_err(chapter_error)?;
        let chapter = parser
            .parse_chapter(&page, options.pretty)
            .map_err(chapter_error)?;
        let chapter_title = chapter.title.clone();
        repo.save_chapter(&title, chapter)
            .map_err(ArchiveError::storage(&title))?;
        info!(work = %title, index, total, chapter = %chapter_title, "archived chapter");
        if let Some(progress) = options.progress {
            progress(index, total, &chapter_title);
        }
        if !options.delay.is_zero() {
            thread::sleep(options.delay);
        }
    }
    Ok(title)
}

/// Options for converting an archived work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertOptions {
    pub author: String,
    /// Write here instead of `<work dir>/<title>.epub`.
    pub output: Option<PathBuf>,
    /// Package date; the current UTC time when absent.
    pub date: Option<String>,
    pub language: Option<String>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            author: DEFAULT_AUTHOR.to_string(),
            output: None,
            date: None,
            language: None,
        }
    }
}

/// Package an archived work as EPUB and return the path written.
///
/// Chapters are streamed from their files into the package in archival order, preceded by a cover
/// page built from the archived cover and a generated table of contents.
pub fn convert_work(
    repo: &Repository,
    title: &str,
    options: &ConvertOptions,
) -> Result<PathBuf, ArchiveError> {
    let work = repo.load_work(title).map_err(ArchiveError::storage(title))?;
    if work.chapters.is_empty() {
        warn!(work = title, "no archived chapters; the package will only hold the cover and contents");
    }

    let cover_filename = work.metadata.cover_image_filename.clone();
    let format = Path::new(&cover_filename)
        .extension()
        .and_then(|e| e.to_str())
        .and_then(ImageFormat::from_extension)
        .or_else(|| ImageFormat::sniff(&work.cover))
        .unwrap_or(ImageFormat::Png);
    let cover = Cover {
        page: cover_page(&cover_filename),
        image: Image::new(cover_filename.as_str(), work.cover, format.media_type()),
    };

    let toc = table_of_contents_page(
        work.chapters
            .iter()
            .map(|c| (c.title.as_str(), c.filename.as_str())),
    );
    let sections: Vec<Section> = work
        .chapters
        .into_iter()
        .map(|c| Section::new(c.filename, c.title, c.data))
        .collect();
    let chapter_count = sections.len();

    let mut spec = PackageSpec::new(
        title,
        options.author.as_str(),
        toc,
        PackageContent {
            sections,
            ..Default::default()
        },
    );
    spec.cover = Some(cover);
    spec.language = options.language.clone();
    spec.date = Some(
        options
            .date
            .clone()
            .unwrap_or_else(|| Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()),
    );

    let path = match &options.output {
        Some(path) => {
            write_package(spec, path).map_err(ArchiveError::package(title))?;
            path.clone()
        }
        None => {
            let filename = format!("{}.epub", sanitize_filename(title));
            let (path, file) = repo
                .create_raw_file(title, &filename)
                .map_err(ArchiveError::storage(title))?;
            let mut out =
                build_package(spec, BufWriter::new(file)).map_err(ArchiveError::package(title))?;
            out.flush().map_err(|source| ArchiveError::Storage {
                work: title.to_string(),
                source: RepositoryError::Io {
                    path: path.clone(),
                    source,
                },
            })?;
            path
        }
    };
    debug!(work = title, chapters = chapter_count, path = %path.display(), "wrote package");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::readlightnovel::tests::{chapter_page, index_page, COVER_URL, INDEX_URL};
    use crate::scraper::MockFetch;
    use std::cell::RefCell;
    use std::error::Error;
    use std::io::{Cursor, Read};
    use zip::read::ZipArchive;

    const CHAPTER_1_URL: &str = "https://www.readlightnovel.me/tale-of-t/chapter-1";
    const CHAPTER_2_URL: &str = "https://www.readlightnovel.me/tale-of-t/chapter-2";

    fn site(with_chapter_2: bool) -> MockFetch {
        let mut fetch = MockFetch::default()
            .with(INDEX_URL, index_page(&["/tale-of-t/chapter-1", "/tale-of-t/chapter-2"]))
            .with(COVER_URL, b"\x89PNG\r\n\x1a\ncover".to_vec())
            .with(CHAPTER_1_URL, chapter_page("Chapter 1", "<p>one</p>"));
        if with_chapter_2 {
            fetch = fetch.with(CHAPTER_2_URL, chapter_page("Chapter 2", "<p>two</p>"));
        }
        fetch
    }

    fn fast<'a>() -> ArchiveOptions<'a> {
        ArchiveOptions {
            delay: Duration::ZERO,
            ..Default::default()
        }
    }

    fn library() -> Result<(tempfile::TempDir, Repository), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let repo = Repository::open(dir.path())?;
        Ok((dir, repo))
    }

    fn read_entry(path: &Path, name: &str) -> Result<String, Box<dyn Error>> {
        let bytes = std::fs::read(path)?;
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut file = archive.by_name(name)?;
        let mut out = String::new();
        file.read_to_string(&mut out)?;
        Ok(out)
    }

    #[test]
    fn archive_then_convert() -> Result<(), Box<dyn Error>> {
        let (_dir, repo) = library()?;
        let mut fetch = site(true);
        let seen = RefCell::new(Vec::new());
        let progress = |i: usize, n: usize, t: &str| seen.borrow_mut().push((i, n, t.to_string()));
        let options = ArchiveOptions {
            progress: Some(&progress),
            ..fast()
        };

        let title = archive_work(INDEX_URL, &ParserRegistry::default(), &mut fetch, &repo, &options)?;
        assert_eq!(title, "T");
        assert_eq!(
            seen.into_inner(),
            vec![(1, 2, "Chapter 1".to_string()), (2, 2, "Chapter 2".to_string())]
        );

        let path = convert_work(&repo, "T", &ConvertOptions::default())?;
        assert_eq!(path, repo.work_dir("T").join("T.epub"));

        let opf = read_entry(&path, "OEBPS/package.opf")?;
        assert!(opf.contains(r#"<item id="sect-1" href="text/Chapter_1.xhtml""#));
        assert!(opf.contains(r#"<item id="sect-2" href="text/Chapter_2.xhtml""#));
        assert!(opf.contains(r#"href="images/cover.png" media-type="image/png" properties="cover-image""#));
        assert!(opf.contains("<dc:creator>Unknown</dc:creator>"));
        assert!(opf.contains("dcterms:modified"));

        let ncx = read_entry(&path, "OEBPS/toc.ncx")?;
        let first = ncx.find("<text>Chapter 1</text>").ok_or("missing Chapter 1")?;
        let second = ncx.find("<text>Chapter 2</text>").ok_or("missing Chapter 2")?;
        assert!(first < second);

        let chapter = read_entry(&path, "OEBPS/text/Chapter_2.xhtml")?;
        assert!(chapter.contains("<p>two</p>"));
        let toc = read_entry(&path, "OEBPS/text/toc.xhtml")?;
        assert!(toc.contains(r#"<a href="Chapter_1.xhtml">Chapter 1</a>"#));
        Ok(())
    }

    #[test]
    fn chapter_failure_keeps_earlier_chapters() -> Result<(), Box<dyn Error>> {
        let (_dir, repo) = library()?;
        let mut fetch = site(false);
        let err = archive_work(INDEX_URL, &ParserRegistry::default(), &mut fetch, &repo, &fast())
            .unwrap_err();
        match err {
            ArchiveError::Chapter {
                work, index, total, ..
            } => {
                assert_eq!(work, "T");
                assert_eq!((index, total), (2, 2));
            }
            other => return Err(format!("unexpected error {}", other).into()),
        }
        let work = repo.load_work("T")?;
        assert_eq!(work.chapters.len(), 1);
        assert_eq!(work.chapters[0].title, "Chapter 1");
        Ok(())
    }

    #[test]
    fn unsupported_url_touches_nothing() -> Result<(), Box<dyn Error>> {
        let (_dir, repo) = library()?;
        let mut fetch = site(true);
        let err = archive_work(
            "https://example.com/novel/t",
            &ParserRegistry::default(),
            &mut fetch,
            &repo,
            &fast(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::Resolve {
                source: ScraperError::UnsupportedUrl { .. }
            }
        ));
        assert!(fetch.requests.is_empty());
        assert!(repo.list_works()?.is_empty());
        Ok(())
    }

    #[test]
    fn work_page_failure_creates_no_storage() -> Result<(), Box<dyn Error>> {
        let (_dir, repo) = library()?;
        let mut fetch = MockFetch::default();
        let err = archive_work(INDEX_URL, &ParserRegistry::default(), &mut fetch, &repo, &fast())
            .unwrap_err();
        assert!(matches!(err, ArchiveError::WorkPage { .. }));
        assert!(repo.list_works()?.is_empty());
        Ok(())
    }

    #[test]
    fn resume_skips_archived_chapters() -> Result<(), Box<dyn Error>> {
        let (_dir, repo) = library()?;
        let registry = ParserRegistry::default();
        assert!(archive_work(INDEX_URL, &registry, &mut site(false), &repo, &fast()).is_err());

        let mut fetch = site(true);
        let options = ArchiveOptions {
            resume: true,
            ..fast()
        };
        archive_work(INDEX_URL, &registry, &mut fetch, &repo, &options)?;
        assert!(!fetch.requests.iter().any(|u| u == CHAPTER_1_URL));
        assert!(fetch.requests.iter().any(|u| u == CHAPTER_2_URL));
        let titles: Vec<String> = repo
            .load_work("T")?
            .chapters
            .into_iter()
            .map(|c| c.title)
            .collect();
        assert_eq!(titles, vec!["Chapter 1", "Chapter 2"]);
        Ok(())
    }

    #[test]
    fn rearchive_without_resume_starts_over() -> Result<(), Box<dyn Error>> {
        let (_dir, repo) = library()?;
        let registry = ParserRegistry::default();
        archive_work(INDEX_URL, &registry, &mut site(true), &repo, &fast())?;
        let mut fetch = site(true);
        archive_work(INDEX_URL, &registry, &mut fetch, &repo, &fast())?;
        assert!(fetch.requests.iter().any(|u| u == CHAPTER_1_URL));
        assert_eq!(repo.load_metadata("T")?.archived_chapters.len(), 2);
        Ok(())
    }

    #[test]
    fn convert_to_explicit_output() -> Result<(), Box<dyn Error>> {
        let (dir, repo) = library()?;
        archive_work(INDEX_URL, &ParserRegistry::default(), &mut site(true), &repo, &fast())?;
        let out = dir.path().join("out.epub");
        let options = ConvertOptions {
            author: "A. Writer".to_string(),
            output: Some(out.clone()),
            date: Some("2024-05-06T07:08:09Z".to_string()),
            language: None,
        };
        assert_eq!(convert_work(&repo, "T", &options)?, out);
        let opf = read_entry(&out, "OEBPS/package.opf")?;
        assert!(opf.contains("<dc:creator>A. Writer</dc:creator>"));
        assert!(opf.contains("<dc:date>2024-05-06T07:08:09Z</dc:date>"));
        assert!(!repo.work_dir("T").join("T.epub").exists());
        Ok(())
    }

    #[test]
    fn convert_unknown_work_is_not_archived() -> Result<(), Box<dyn Error>> {
        let (_dir, repo) = library()?;
        let err = convert_work(&repo, "Nope", &ConvertOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::Storage {
                source: RepositoryError::NotArchived { .. },
                ..
            }
        ));
        Ok(())
    }

    #[test]
    fn chapters_with_colliding_filenames_both_convert() -> Result<(), Box<dyn Error>> {
        let (_dir, repo) = library()?;
        let mut fetch = MockFetch::default()
            .with(INDEX_URL, index_page(&["/tale-of-t/chapter-1", "/tale-of-t/chapter-2"]))
            .with(COVER_URL, b"\x89PNG\r\n\x1a\ncover".to_vec())
            .with(CHAPTER_1_URL, chapter_page("Chapter 1: A", "<p>one</p>"))
            .with(CHAPTER_2_URL, chapter_page("Chapter 1 A", "<p>two</p>"));
        archive_work(INDEX_URL, &ParserRegistry::default(), &mut fetch, &repo, &fast())?;

        let path = convert_work(&repo, "T", &ConvertOptions::default())?;
        assert!(read_entry(&path, "OEBPS/text/Chapter_1_A.xhtml")?.contains("<p>one</p>"));
        assert!(read_entry(&path, "OEBPS/text/Chapter_1_A-2.xhtml")?.contains("<p>two</p>"));
        let ncx = read_entry(&path, "OEBPS/toc.ncx")?;
        assert!(ncx.contains("<text>Chapter 1: A</text>"));
        assert!(ncx.contains("<text>Chapter 1 A</text>"));
        Ok(())
    }
}
