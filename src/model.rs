//! Data model shared by adapters, the repository and the archival orchestrator.
//!
//! Chapter payloads come in two shapes: generated markup held in memory (fresh from an adapter)
//! and files already on disk that are only opened when read. [`Content`] is the single type the
//! repository and the EPUB writer accept for either.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// Work-level data extracted from a source site's index page. Consumed once by
/// [`Repository::create_work`](crate::repository::Repository::create_work).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnlineMetadata {
    pub title: String,
    pub cover: Vec<u8>,
    /// Chapter page URLs in reading order.
    pub chapter_links: Vec<String>,
}

/// One chapter. `title` is the logical key; `filename` is derived from it and safe to store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter<T> {
    pub filename: String,
    pub title: String,
    pub data: T,
}

impl<T> Chapter<T> {
    pub fn new(filename: impl Into<String>, title: impl Into<String>, data: T) -> Self {
        Self {
            filename: filename.into(),
            title: title.into(),
            data,
        }
    }
}

/// Persisted per-work metadata (`meta.json`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkMetadata {
    pub cover_image_filename: String,
    #[serde(default)]
    pub archived_chapters: ArchivedChapters,
    #[serde(default)]
    pub chapter_links: Vec<String>,
}

/// Chapter title to filename mapping, kept in archival order.
///
/// Serialized as a JSON object whose key order is the insertion order. Recording a title that is
/// already present replaces its filename in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchivedChapters {
    entries: Vec<(String, String)>,
}

impl ArchivedChapters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, title: impl Into<String>, filename: impl Into<String>) {
        let title = title.into();
        let filename = filename.into();
        match self.entries.iter_mut().find(|(t, _)| *t == title) {
            Some(entry) => entry.1 = filename,
            None => self.entries.push((title, filename)),
        }
    }

    pub fn get(&self, title: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(t, _)| t == title)
            .map(|(_, f)| f.as_str())
    }

    pub fn contains(&self, title: &str) -> bool {
        self.get(title).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(title, filename)` pairs in archival order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(t, f)| (t.as_str(), f.as_str()))
    }
}

impl Serialize for ArchivedChapters {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (title, filename) in &self.entries {
            map.serialize_entry(title, filename)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ArchivedChapters {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ArchivedChaptersVisitor;

        impl<'de> Visitor<'de> for ArchivedChaptersVisitor {
            type Value = ArchivedChapters;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object mapping chapter titles to filenames")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut chapters = ArchivedChapters::new();
                while let Some((title, filename)) = access.next_entry::<String, String>()? {
                    chapters.insert(title, filename);
                }
                Ok(chapters)
            }
        }

        deserializer.deserialize_map(ArchivedChaptersVisitor)
    }
}

/// An archived work assembled from `meta.json`, the chapter files that exist, and the cover.
#[derive(Debug)]
pub struct Work {
    pub metadata: WorkMetadata,
    pub chapters: Vec<Chapter<LazyFile>>,
    pub cover: Vec<u8>,
}

/// Read stream over a file that is opened on first read.
///
/// Loading a work binds one of these per chapter without holding any file handles open.
pub struct LazyFile {
    path: PathBuf,
    file: Option<File>,
}

impl LazyFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Read for LazyFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.file.is_none() {
            let file = File::open(&self.path).map_err(|e| {
                io::Error::new(e.kind(), format!("{}: {}", self.path.display(), e))
            })?;
            self.file = Some(file);
        }
        match self.file.as_mut() {
            Some(file) => file.read(buf),
            None => Ok(0),
        }
    }
}

impl fmt::Debug for LazyFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyFile")
            .field("path", &self.path)
            .field("open", &self.file.is_some())
            .finish()
    }
}

/// Payload accepted by every write path: in-memory text or bytes, or a byte stream.
pub enum Content {
    Text(String),
    Bytes(Vec<u8>),
    Reader(Box<dyn Read + Send>),
}

impl Content {
    /// Copy the payload into `out`, streaming readers. Returns the number of bytes written.
    pub fn write_to<W: Write + ?Sized>(self, out: &mut W) -> io::Result<u64> {
        match self {
            Content::Text(s) => {
                out.write_all(s.as_bytes())?;
                Ok(s.len() as u64)
            }
            Content::Bytes(b) => {
                out.write_all(&b)?;
                Ok(b.len() as u64)
            }
            Content::Reader(mut r) => io::copy(&mut r, out),
        }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Content::Reader(_))
    }
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Content::Text(s) => f.debug_tuple("Text").field(&s.len()).finish(),
            Content::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            Content::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

impl From<String> for Content {
    fn from(s: String) -> Self {
        Content::Text(s)
    }
}

impl From<&str> for Content {
    fn from(s: &str) -> Self {
        Content::Text(s.to_string())
    }
}

impl From<Vec<u8>> for Content {
    fn from(b: Vec<u8>) -> Self {
        Content::Bytes(b)
    }
}

impl From<&[u8]> for Content {
    fn from(b: &[u8]) -> Self {
        Content::Bytes(b.to_vec())
    }
}

impl From<LazyFile> for Content {
    fn from(f: LazyFile) -> Self {
        Content::Reader(Box::new(f))
    }
}
