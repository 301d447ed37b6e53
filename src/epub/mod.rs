//! EPUB packager. Assembles a fixed-layout EPUB 3 package (with an NCX for older readers) from a
//! [`PackageSpec`]: static container files, generated package document and navigation, then the
//! pages, stylesheet and images.
//!
//! Page bodies are [`Content`], so archived chapters stream from disk straight into the zip writer.

mod document;
mod page;

pub use document::{identifier, navigation_document, package_document, DEFAULT_LANGUAGE, DEFAULT_RIGHTS};
pub use page::{
    cover_page, default_cover, default_style_href, section_page, section_page_with_style,
    table_of_contents_page, COVER_PAGE_FILENAME, TOC_PAGE_FILENAME,
};

use crate::model::Content;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const MIMETYPE: &str = "application/epub+zip";
const DEFAULT_STYLESHEET: &str = include_str!("default/stylesheet.css");

const OEBPS_PREFIX: &str = "OEBPS/";
pub(crate) const TEXT_DIR: &str = "text/";
pub(crate) const STYLE_DIR: &str = "styles/";
pub(crate) const IMAGE_DIR: &str = "images/";
pub(crate) const PACKAGE_FILENAME: &str = "package.opf";
pub(crate) const NCX_FILENAME: &str = "toc.ncx";
pub(crate) const STYLESHEET_FILENAME: &str = "stylesheet.css";
pub(crate) const SECTION_MEDIA_TYPE: &str = "application/xhtml+xml";

/// Errors from the EPUB packager.
///
/// Maps to CLI exit code 3.
#[derive(Debug, Error)]
pub enum PackageError {
    #[error("Cannot write EPUB: title is empty.")]
    EmptyTitle,

    #[error("Cannot write EPUB: two entries would be stored as {name}.")]
    DuplicateEntry { name: String },

    #[error("Cannot write EPUB: section {section} links stylesheet {href}, which is not in the package.")]
    UnknownStylesheet { section: String, href: String },

    #[error("Cannot write EPUB entry {name}: {source}")]
    Entry {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create EPUB file: {path}: {source}")]
    CreateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write EPUB archive: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// One XHTML page of the package.
#[derive(Debug)]
pub struct Section {
    pub filename: String,
    pub title: String,
    /// The complete page document.
    pub body: Content,
    /// Stylesheet href the page links to, when it is not the package default.
    pub style_path: Option<String>,
}

impl Section {
    /// A section whose body is already a complete page.
    pub fn new(filename: impl Into<String>, title: impl Into<String>, body: impl Into<Content>) -> Self {
        Self {
            filename: filename.into(),
            title: title.into(),
            body: body.into(),
            style_path: None,
        }
    }

    /// Wrap `markup` in the shared page template.
    pub fn page(filename: impl Into<String>, title: impl Into<String>, markup: &str) -> Self {
        let title = title.into();
        let body = section_page(&title, markup);
        Self::new(filename, title, body)
    }

    /// Like [`page`](Self::page) but linking `style_path` instead of the package stylesheet.
    pub fn styled_page(
        filename: impl Into<String>,
        title: impl Into<String>,
        markup: &str,
        style_path: impl Into<String>,
    ) -> Self {
        let title = title.into();
        let style_path = style_path.into();
        let body = section_page_with_style(&title, markup, &style_path);
        Self {
            style_path: Some(style_path),
            ..Self::new(filename, title, body)
        }
    }
}

#[derive(Debug)]
pub struct Image {
    pub filename: String,
    pub data: Content,
    pub media_type: String,
}

impl Image {
    pub fn new(filename: impl Into<String>, data: impl Into<Content>, media_type: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
            media_type: media_type.into(),
        }
    }
}

#[derive(Debug)]
pub struct Cover {
    pub page: Section,
    pub image: Image,
}

/// A stylesheet stored next to the package stylesheet, for sections built with
/// [`Section::styled_page`]. Pages link it as `../styles/<filename>`.
#[derive(Debug)]
pub struct Stylesheet {
    pub filename: String,
    pub data: Content,
}

impl Stylesheet {
    pub fn new(filename: impl Into<String>, data: impl Into<Content>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
        }
    }

    /// Href of this stylesheet as seen from a page in `text/`.
    pub fn href(&self) -> String {
        format!("../{}{}", STYLE_DIR, self.filename)
    }
}

/// Content sections and images, in reading order.
#[derive(Debug, Default)]
pub struct PackageContent {
    pub sections: Vec<Section>,
    pub images: Vec<Image>,
    /// Replaces the built-in stylesheet.
    pub stylesheet: Option<String>,
    /// Additional stylesheets linked by individual sections.
    pub extra_stylesheets: Vec<Stylesheet>,
}

/// Everything needed to build one package.
#[derive(Debug)]
pub struct PackageSpec {
    pub title: String,
    pub author: String,
    /// Built-in placeholder when absent.
    pub cover: Option<Cover>,
    pub table_of_contents: Section,
    pub content: PackageContent,
    /// Explicit `(label, path)` navigation entries, paths relative to the package document.
    pub navigation: Option<Vec<(String, String)>>,
    pub identifier: Option<String>,
    pub rights: Option<String>,
    pub language: Option<String>,
    pub date: Option<String>,
    pub description: Option<String>,
    pub publisher: Option<String>,
    pub subject: Option<String>,
}

impl PackageSpec {
    pub fn new(
        title: impl Into<String>,
        author: impl Into<String>,
        table_of_contents: Section,
        content: PackageContent,
    ) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            cover: None,
            table_of_contents,
            content,
            navigation: None,
            identifier: None,
            rights: None,
            language: None,
            date: None,
            description: None,
            publisher: None,
            subject: None,
        }
    }

    /// Cover page filename, cover image filename and media type, falling back to the built-in cover.
    pub(crate) fn cover_refs(&self) -> (&str, &str, &str) {
        match &self.cover {
            Some(c) => (
                c.page.filename.as_str(),
                c.image.filename.as_str(),
                c.image.media_type.as_str(),
            ),
            None => (COVER_PAGE_FILENAME, "cover.svg", ImageFormat::Svg.media_type()),
        }
    }
}

/// Image formats recognised by their leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
    Svg,
}

impl ImageFormat {
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            return Some(ImageFormat::Png);
        }
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(ImageFormat::Jpeg);
        }
        if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            return Some(ImageFormat::Gif);
        }
        if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            return Some(ImageFormat::Webp);
        }
        let head = &bytes[..bytes.len().min(1024)];
        let head = String::from_utf8_lossy(head);
        let head = head.trim_start();
        if (head.starts_with("<svg") || head.starts_with("<?xml")) && head.contains("<svg") {
            return Some(ImageFormat::Svg);
        }
        None
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(ImageFormat::Png),
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            "gif" => Some(ImageFormat::Gif),
            "webp" => Some(ImageFormat::Webp),
            "svg" => Some(ImageFormat::Svg),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Gif => "gif",
            ImageFormat::Webp => "webp",
            ImageFormat::Svg => "svg",
        }
    }

    pub fn media_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Webp => "image/webp",
            ImageFormat::Svg => "image/svg+xml",
        }
    }
}

pub(crate) fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Build the package into `writer` and return the writer once the archive is finished.
///
/// Entries are written in a fixed order with a fixed timestamp, so the same `PackageSpec` always
/// produces the same bytes.
pub fn build_package<W: Write + Seek>(mut spec: PackageSpec, writer: W) -> Result<W, PackageError> {
    if spec.title.trim().is_empty() {
        return Err(PackageError::EmptyTitle);
    }
    let cover = spec.cover.take().unwrap_or_else(default_cover);
    spec.cover = Some(cover);
    check_unique_entries(&spec)?;
    check_stylesheet_links(&spec)?;

    let opf = package_document(&spec);
    let ncx = navigation_document(&spec);
    debug!(
        title = %spec.title,
        sections = spec.content.sections.len(),
        images = spec.content.images.len(),
        "building package"
    );

    let PackageSpec {
        cover,
        table_of_contents,
        content,
        ..
    } = spec;
    let cover = cover.unwrap_or_else(default_cover);

    let options_stored = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .last_modified_time(zip::DateTime::default())
        .unix_permissions(0o644);
    let options_deflate = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default())
        .unix_permissions(0o644);

    let mut zip = ZipWriter::new(writer);

    // mimetype must be the first entry and uncompressed
    write_entry(&mut zip, "mimetype".to_string(), MIMETYPE.into(), options_stored)?;
    write_entry(
        &mut zip,
        "META-INF/container.xml".to_string(),
        document::CONTAINER_XML.into(),
        options_deflate,
    )?;
    write_entry(&mut zip, oebps(PACKAGE_FILENAME), opf.into(), options_deflate)?;
    write_entry(&mut zip, oebps(NCX_FILENAME), ncx.into(), options_deflate)?;

    let sections = [cover.page, table_of_contents]
        .into_iter()
        .chain(content.sections);
    for section in sections {
        let name = oebps(&format!("{}{}", TEXT_DIR, section.filename));
        write_entry(&mut zip, name, section.body, options_deflate)?;
    }

    let stylesheet = content
        .stylesheet
        .unwrap_or_else(|| DEFAULT_STYLESHEET.to_string());
    write_entry(
        &mut zip,
        oebps(&format!("{}{}", STYLE_DIR, STYLESHEET_FILENAME)),
        stylesheet.into(),
        options_deflate,
    )?;
    for extra in content.extra_stylesheets {
        let name = oebps(&format!("{}{}", STYLE_DIR, extra.filename));
        write_entry(&mut zip, name, extra.data, options_deflate)?;
    }

    let images = std::iter::once(cover.image).chain(content.images);
    for image in images {
        let name = oebps(&format!("{}{}", IMAGE_DIR, image.filename));
        write_entry(&mut zip, name, image.data, options_deflate)?;
    }

    Ok(zip.finish()?)
}

/// Build the package into a new file at `path`.
pub fn write_package(spec: PackageSpec, path: &Path) -> Result<(), PackageError> {
    let file = File::create(path).map_err(|e| PackageError::CreateFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut out = build_package(spec, BufWriter::new(file))?;
    out.flush().map_err(|e| PackageError::Entry {
        name: path.display().to_string(),
        source: e,
    })
}

fn oebps(name: &str) -> String {
    format!("{}{}", OEBPS_PREFIX, name)
}

fn write_entry<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    name: String,
    content: Content,
    options: SimpleFileOptions,
) -> Result<(), PackageError> {
    zip.start_file(name.as_str(), options)?;
    content
        .write_to(zip)
        .map_err(|e| PackageError::Entry { name, source: e })?;
    Ok(())
}

fn check_unique_entries(spec: &PackageSpec) -> Result<(), PackageError> {
    let (cover_page, cover_image, _) = spec.cover_refs();
    let pages = [cover_page, spec.table_of_contents.filename.as_str()]
        .into_iter()
        .chain(spec.content.sections.iter().map(|s| s.filename.as_str()))
        .map(|f| format!("{}{}", TEXT_DIR, f));
    let images = std::iter::once(cover_image)
        .chain(spec.content.images.iter().map(|i| i.filename.as_str()))
        .map(|f| format!("{}{}", IMAGE_DIR, f));
    let styles = std::iter::once(STYLESHEET_FILENAME)
        .chain(spec.content.extra_stylesheets.iter().map(|s| s.filename.as_str()))
        .map(|f| format!("{}{}", STYLE_DIR, f));
    let mut seen = HashSet::new();
    for name in pages.chain(images).chain(styles) {
        if !seen.insert(name.clone()) {
            return Err(PackageError::DuplicateEntry { name });
        }
    }
    Ok(())
}

/// Every section's `style_path` must name the package stylesheet or one of the extra ones.
fn check_stylesheet_links(spec: &PackageSpec) -> Result<(), PackageError> {
    let mut known: HashSet<String> = spec
        .content
        .extra_stylesheets
        .iter()
        .map(Stylesheet::href)
        .collect();
    known.insert(default_style_href());
    let sections = spec
        .cover
        .iter()
        .map(|c| &c.page)
        .chain(std::iter::once(&spec.table_of_contents))
        .chain(spec.content.sections.iter());
    for section in sections {
        if let Some(href) = &section.style_path {
            if !known.contains(href) {
                return Err(PackageError::UnknownStylesheet {
                    section: section.filename.clone(),
                    href: href.clone(),
                });
            }
        }
    }
    Ok(())
}
