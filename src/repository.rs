//! Filesystem store for archived works.
//!
//! Layout: `<root>/<sanitized title>/` holding `meta.json`, the cover image and one XHTML file per
//! archived chapter. A work directory is created complete (cover and metadata) or not at all.

use crate::epub::{ImageFormat, COVER_PAGE_FILENAME, TOC_PAGE_FILENAME};
use crate::model::{ArchivedChapters, Chapter, Content, LazyFile, OnlineMetadata, Work, WorkMetadata};
use crate::path::{sanitize_filename, MAX_FILENAME_BYTES};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const METADATA_FILENAME: &str = "meta.json";
const COVER_BASENAME: &str = "cover";
const METADATA_TMP_FILENAME: &str = "meta.json.tmp";
const STAGING_SUFFIX: &str = ".partial";
/// Names a chapter file may not take: the work's metadata and the pages the packager generates.
const RESERVED_FILENAMES: &[&str] = &[
    METADATA_FILENAME,
    METADATA_TMP_FILENAME,
    COVER_PAGE_FILENAME,
    TOC_PAGE_FILENAME,
];

/// Errors from the work repository.
///
/// Maps to CLI exit code 3, except `NotArchived` and `AlreadyArchived` which are input errors (1).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("\"{work}\" is already archived (use --resume to continue it).")]
    AlreadyArchived { work: String },

    #[error("\"{work}\" is not archived. Run `novel-archiver list` to see archived works.")]
    NotArchived { work: String },

    #[error("\"{work}\" has no meta.json; the work directory is incomplete.")]
    MissingMetadata { work: String },

    #[error("\"{work}\" has no cover image.")]
    MissingCover { work: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid metadata in {path}: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl RepositoryError {
    /// True when the error is about which work was asked for rather than the storage itself.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            RepositoryError::AlreadyArchived { .. } | RepositoryError::NotArchived { .. }
        )
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> RepositoryError + '_ {
    move |source| RepositoryError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Archived works under one library directory, keyed by sanitized title.
#[derive(Debug, Clone)]
pub struct Repository {
    root: PathBuf,
}

impl Repository {
    /// Open (creating if needed) the library at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, RepositoryError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(io_error(&root))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn work_dir(&self, title: &str) -> PathBuf {
        self.root.join(sanitize_filename(title))
    }

    fn work_file(&self, title: &str, filename: &str) -> PathBuf {
        self.work_dir(title).join(sanitize_filename(filename))
    }

    pub fn is_archived(&self, title: &str) -> bool {
        self.work_dir(title).is_dir()
    }

    fn ensure_archived(&self, title: &str) -> Result<PathBuf, RepositoryError> {
        let dir = self.work_dir(title);
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(RepositoryError::NotArchived {
                work: title.to_string(),
            })
        }
    }

    /// Directory names of archived works (those holding metadata), sorted.
    pub fn list_works(&self) -> Result<Vec<String>, RepositoryError> {
        let mut works = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(io_error(&self.root))? {
            let entry = entry.map_err(io_error(&self.root))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let path = entry.path();
            if path.is_dir() && path.join(METADATA_FILENAME).is_file() {
                works.push(name);
            }
        }
        works.sort();
        Ok(works)
    }

    /// Initialize storage for a freshly scraped work: cover image plus metadata with every
    /// chapter link and nothing archived yet.
    ///
    /// Fails with `AlreadyArchived` (leaving the directory untouched) unless `overwrite`, in which
    /// case the existing work is deleted first.
    pub fn create_work(
        &self,
        meta: &OnlineMetadata,
        overwrite: bool,
    ) -> Result<WorkMetadata, RepositoryError> {
        let name = sanitize_filename(&meta.title);
        let dir = self.root.join(&name);
        if dir.exists() {
            if !overwrite {
                return Err(RepositoryError::AlreadyArchived {
                    work: meta.title.clone(),
                });
            }
            info!(work = %meta.title, "replacing existing archive");
            fs::remove_dir_all(&dir).map_err(io_error(&dir))?;
        }

        let format = ImageFormat::sniff(&meta.cover).unwrap_or(ImageFormat::Png);
        let metadata = WorkMetadata {
            cover_image_filename: format!("{}.{}", COVER_BASENAME, format.extension()),
            archived_chapters: ArchivedChapters::new(),
            chapter_links: meta.chapter_links.clone(),
        };

        let staging = self.root.join(format!(".{}{}", name, STAGING_SUFFIX));
        if staging.exists() {
            fs::remove_dir_all(&staging).map_err(io_error(&staging))?;
        }
        fs::create_dir(&staging).map_err(io_error(&staging))?;
        let staged = write_initial_files(&staging, &meta.cover, &metadata)
            .and_then(|()| fs::rename(&staging, &dir).map_err(io_error(&dir)));
        if let Err(e) = staged {
            if let Err(cleanup) = fs::remove_dir_all(&staging) {
                warn!(path = %staging.display(), error = %cleanup, "could not remove staging directory");
            }
            return Err(e);
        }
        info!(work = %meta.title, chapters = meta.chapter_links.len(), "created work");
        Ok(metadata)
    }

    /// Write `content` to `filename` inside the work directory, streaming readers.
    pub fn save_raw_file(
        &self,
        title: &str,
        filename: &str,
        content: impl Into<Content>,
    ) -> Result<PathBuf, RepositoryError> {
        self.ensure_archived(title)?;
        let path = self.work_file(title, filename);
        write_content(&path, content.into())?;
        Ok(path)
    }

    /// Create (truncating) `filename` inside the work directory and hand out the file, for
    /// producers that need `Write + Seek`.
    pub fn create_raw_file(
        &self,
        title: &str,
        filename: &str,
    ) -> Result<(PathBuf, File), RepositoryError> {
        self.ensure_archived(title)?;
        let path = self.work_file(title, filename);
        let file = File::create(&path).map_err(io_error(&path))?;
        Ok((path, file))
    }

    pub fn save_metadata(&self, title: &str, metadata: &WorkMetadata) -> Result<(), RepositoryError> {
        let dir = self.ensure_archived(title)?;
        write_metadata(&dir, metadata)
    }

    /// Persist a chapter, then record it in the work's metadata.
    ///
    /// When the requested filename is taken by another chapter or by one of the work's own files,
    /// a numeric suffix is added (`Chapter_1-2.xhtml`).
    ///
    /// The two writes are not atomic together: a crash in between leaves a chapter file that
    /// loading ignores because the metadata does not list it.
    pub fn save_chapter<T: Into<Content>>(
        &self,
        title: &str,
        chapter: Chapter<T>,
    ) -> Result<PathBuf, RepositoryError> {
        let mut metadata = self.load_metadata(title)?;
        let filename = unique_chapter_filename(&metadata, &chapter.title, &chapter.filename);
        if filename != chapter.filename {
            debug!(work = title, chapter = %chapter.title, requested = %chapter.filename, %filename, "chapter filename taken, renamed");
        }
        let path = self.save_raw_file(title, &filename, chapter.data)?;
        metadata.archived_chapters.insert(chapter.title.as_str(), filename);
        self.save_metadata(title, &metadata)?;
        debug!(work = title, chapter = %chapter.title, path = %path.display(), "saved chapter");
        Ok(path)
    }

    pub fn load_metadata(&self, title: &str) -> Result<WorkMetadata, RepositoryError> {
        let dir = self.ensure_archived(title)?;
        let path = dir.join(METADATA_FILENAME);
        if !path.is_file() {
            return Err(RepositoryError::MissingMetadata {
                work: title.to_string(),
            });
        }
        let json = fs::read_to_string(&path).map_err(io_error(&path))?;
        serde_json::from_str(&json).map_err(|source| RepositoryError::Metadata { path, source })
    }

    /// Chapters listed in `archived`, in archival order, each bound to its file without opening
    /// it. Entries whose file is gone are skipped.
    pub fn load_chapters(
        &self,
        title: &str,
        archived: &ArchivedChapters,
    ) -> Result<Vec<Chapter<LazyFile>>, RepositoryError> {
        self.ensure_archived(title)?;
        let mut chapters = Vec::with_capacity(archived.len());
        for (chapter_title, filename) in archived.iter() {
            // names come from meta.json; resolve them inside the work directory
            let filename = sanitize_filename(filename);
            let path = self.work_file(title, &filename);
            if !path.is_file() {
                debug!(work = title, chapter = chapter_title, "chapter file missing, skipped");
                continue;
            }
            chapters.push(Chapter::new(filename, chapter_title, LazyFile::new(path)));
        }
        Ok(chapters)
    }

    pub fn load_cover(&self, title: &str) -> Result<Vec<u8>, RepositoryError> {
        let metadata = self.load_metadata(title)?;
        let path = self.work_file(title, &metadata.cover_image_filename);
        if !path.is_file() {
            return Err(RepositoryError::MissingCover {
                work: title.to_string(),
            });
        }
        fs::read(&path).map_err(io_error(&path))
    }

    pub fn load_work(&self, title: &str) -> Result<Work, RepositoryError> {
        let metadata = self.load_metadata(title)?;
        let chapters = self.load_chapters(title, &metadata.archived_chapters)?;
        let cover = self.load_cover(title)?;
        Ok(Work {
            metadata,
            chapters,
            cover,
        })
    }

    /// Remove every file of the work, then its directory.
    pub fn delete_work(&self, title: &str) -> Result<(), RepositoryError> {
        let dir = self.ensure_archived(title)?;
        for entry in fs::read_dir(&dir).map_err(io_error(&dir))? {
            let path = entry.map_err(io_error(&dir))?.path();
            if path.is_dir() {
                fs::remove_dir_all(&path).map_err(io_error(&path))?;
            } else {
                fs::remove_file(&path).map_err(io_error(&path))?;
            }
        }
        fs::remove_dir(&dir).map_err(io_error(&dir))?;
        info!(work = title, "deleted work");
        Ok(())
    }

    /// Number of leading archived chapters (in archival order) whose files still exist.
    pub fn archived_prefix_len(&self, title: &str, metadata: &WorkMetadata) -> usize {
        metadata
            .archived_chapters
            .iter()
            .take_while(|(_, filename)| self.work_file(title, filename).is_file())
            .count()
    }
}

/// Filename for `chapter_title` that no other entry of the work uses. The chapter's own previous
/// file does not count as taken. Comparison ignores case so
/// the result is also unique on case-insensitive filesystems.
fn unique_chapter_filename(metadata: &WorkMetadata, chapter_title: &str, requested: &str) -> String {
    let requested = sanitize_filename(requested);
    let taken = |candidate: &str| {
        let candidate = candidate.to_lowercase();
        RESERVED_FILENAMES
            .iter()
            .copied()
            .chain(std::iter::once(metadata.cover_image_filename.as_str()))
            .chain(
                metadata
                    .archived_chapters
                    .iter()
                    .filter(|(t, _)| *t != chapter_title)
                    .map(|(_, f)| f),
            )
            .any(|f| f.to_lowercase() == candidate)
    };
    if !taken(&requested) {
        return requested;
    }
    let (stem, ext) = match requested.rfind('.') {
        Some(dot) if dot > 0 => requested.split_at(dot),
        _ => (requested.as_str(), ""),
    };
    let mut n = 2usize;
    loop {
        let suffix = format!("-{}{}", n, ext);
        let mut cut = stem.len().min(MAX_FILENAME_BYTES.saturating_sub(suffix.len()));
        while !stem.is_char_boundary(cut) {
            cut -= 1;
        }
        let candidate = format!("{}{}", &stem[..cut], suffix);
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn write_initial_files(
    dir: &Path,
    cover: &[u8],
    metadata: &WorkMetadata,
) -> Result<(), RepositoryError> {
    let cover_path = dir.join(&metadata.cover_image_filename);
    fs::write(&cover_path, cover).map_err(io_error(&cover_path))?;
    write_metadata(dir, metadata)
}

fn write_metadata(dir: &Path, metadata: &WorkMetadata) -> Result<(), RepositoryError> {
    let path = dir.join(METADATA_FILENAME);
    let json = serde_json::to_string_pretty(metadata).map_err(|source| RepositoryError::Metadata {
        path: path.clone(),
        source,
    })?;
    // replace via rename so a crash never leaves half a metadata file
    let tmp = dir.join(METADATA_TMP_FILENAME);
    fs::write(&tmp, json).map_err(io_error(&tmp))?;
    fs::rename(&tmp, &path).map_err(io_error(&path))
}

fn write_content(path: &Path, content: Content) -> Result<(), RepositoryError> {
    let streamed = content.is_stream();
    let file = File::create(path).map_err(io_error(path))?;
    let mut out = BufWriter::new(file);
    let written = content.write_to(&mut out).map_err(io_error(path))?;
    out.flush().map_err(io_error(path))?;
    debug!(path = %path.display(), bytes = written, streamed, "wrote file");
    Ok(())
}
