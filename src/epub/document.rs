//! Package document (`package.opf`) and navigation control file (`toc.ncx`).
//!
//! Both are plain `format!` templates. Output depends only on the [`PackageSpec`], so identical
//! input gives byte-identical documents.

use super::{
    xml_escape, PackageSpec, IMAGE_DIR, NCX_FILENAME, SECTION_MEDIA_TYPE, STYLESHEET_FILENAME,
    STYLE_DIR, TEXT_DIR,
};
use crate::path::{href_escape, sanitize_filename};

pub const DEFAULT_RIGHTS: &str = "All rights reserved";
pub const DEFAULT_LANGUAGE: &str = "en";
const IDENTIFIER_PREFIX: &str = "urn:novel-archiver:";

pub(crate) const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/package.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#;

pub fn identifier(spec: &PackageSpec) -> String {
    match &spec.identifier {
        Some(id) if !id.trim().is_empty() => id.clone(),
        _ => format!("{}{}", IDENTIFIER_PREFIX, sanitize_filename(&spec.title)),
    }
}

fn href(dir: &str, filename: &str) -> String {
    xml_escape(&href_escape(&format!("{}{}", dir, filename)))
}

fn optional_element(name: &str, value: Option<&str>) -> String {
    match value.filter(|v| !v.trim().is_empty()) {
        Some(v) => format!("    <{name}>{}</{name}>\n", xml_escape(v), name = name),
        None => String::new(),
    }
}

/// `package.opf`: metadata, manifest and spine.
pub fn package_document(spec: &PackageSpec) -> String {
    let (cover_page, cover_image, cover_media_type) = spec.cover_refs();
    let language = spec.language.as_deref().unwrap_or(DEFAULT_LANGUAGE);
    let rights = spec.rights.as_deref().unwrap_or(DEFAULT_RIGHTS);

    let mut metadata = format!(
        "    <dc:identifier id=\"book-id\">{}</dc:identifier>\n    <dc:title>{}</dc:title>\n    <dc:creator>{}</dc:creator>\n    <dc:rights>{}</dc:rights>\n    <dc:language>{}</dc:language>\n",
        xml_escape(&identifier(spec)),
        xml_escape(&spec.title),
        xml_escape(&spec.author),
        xml_escape(rights),
        xml_escape(language),
    );
    if let Some(date) = spec.date.as_deref().filter(|d| !d.trim().is_empty()) {
        metadata.push_str(&format!(
            "    <dc:date>{date}</dc:date>\n    <meta property=\"dcterms:modified\">{date}</meta>\n",
            date = xml_escape(date)
        ));
    }
    metadata.push_str(&optional_element("dc:description", spec.description.as_deref()));
    metadata.push_str(&optional_element("dc:publisher", spec.publisher.as_deref()));
    metadata.push_str(&optional_element("dc:subject", spec.subject.as_deref()));
    metadata.push_str("    <meta name=\"cover\" content=\"cover-image\"/>\n");

    let mut manifest = format!(
        r#"    <item id="stylesheet" href="{style}" media-type="text/css"/>
    <item id="ncx" href="{ncx}" media-type="application/x-dtbncx+xml"/>
    <item id="toc" href="{toc}" media-type="{xhtml}" properties="nav"/>
    <item id="cover-page" href="{cover_page}" media-type="{xhtml}"/>
    <item id="cover-image" href="{cover_image}" media-type="{cover_type}" properties="cover-image"/>
"#,
        style = href(STYLE_DIR, STYLESHEET_FILENAME),
        ncx = NCX_FILENAME,
        toc = href(TEXT_DIR, &spec.table_of_contents.filename),
        xhtml = SECTION_MEDIA_TYPE,
        cover_page = href(TEXT_DIR, cover_page),
        cover_image = href(IMAGE_DIR, cover_image),
        cover_type = xml_escape(cover_media_type),
    );
    for (i, style) in spec.content.extra_stylesheets.iter().enumerate() {
        manifest.push_str(&format!(
            "    <item id=\"style-{}\" href=\"{}\" media-type=\"text/css\"/>\n",
            i + 1,
            href(STYLE_DIR, &style.filename)
        ));
    }
    for (i, section) in spec.content.sections.iter().enumerate() {
        manifest.push_str(&format!(
            "    <item id=\"sect-{}\" href=\"{}\" media-type=\"{}\"/>\n",
            i + 1,
            href(TEXT_DIR, &section.filename),
            SECTION_MEDIA_TYPE
        ));
    }
    for (i, image) in spec.content.images.iter().enumerate() {
        manifest.push_str(&format!(
            "    <item id=\"image-{}\" href=\"{}\" media-type=\"{}\"/>\n",
            i + 1,
            href(IMAGE_DIR, &image.filename),
            xml_escape(&image.media_type)
        ));
    }

    // Reading order: cover, table of contents, then sections in source order.
    let mut spine = String::from(
        "    <itemref idref=\"cover-page\"/>\n    <itemref idref=\"toc\"/>\n",
    );
    for i in 0..spec.content.sections.len() {
        spine.push_str(&format!("    <itemref idref=\"sect-{}\"/>\n", i + 1));
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="book-id" xml:lang="{lang}">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
{metadata}  </metadata>
  <manifest>
{manifest}  </manifest>
  <spine toc="ncx">
{spine}  </spine>
</package>
"#,
        lang = xml_escape(language),
        metadata = metadata,
        manifest = manifest,
        spine = spine
    )
}

/// `toc.ncx`. Uses `spec.navigation` verbatim when given, otherwise one entry per content section.
pub fn navigation_document(spec: &PackageSpec) -> String {
    let entries: Vec<(String, String)> = match &spec.navigation {
        Some(nav) => nav.clone(),
        None => spec
            .content
            .sections
            .iter()
            .map(|s| (s.title.clone(), href_escape(&format!("{}{}", TEXT_DIR, s.filename))))
            .collect(),
    };

    let mut nav_points = String::new();
    for (i, (label, path)) in entries.iter().enumerate() {
        nav_points.push_str(&format!(
            r#"    <navPoint id="navpoint-{n}" playOrder="{n}">
      <navLabel><text>{label}</text></navLabel>
      <content src="{src}"/>
    </navPoint>
"#,
            n = i + 1,
            label = xml_escape(label),
            src = xml_escape(path)
        ));
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head>
    <meta name="dtb:uid" content="{uid}"/>
    <meta name="dtb:depth" content="1"/>
    <meta name="dtb:totalPageCount" content="0"/>
    <meta name="dtb:maxPageNumber" content="0"/>
  </head>
  <docTitle><text>{title}</text></docTitle>
  <docAuthor><text>{author}</text></docAuthor>
  <navMap>
{nav_points}  </navMap>
</ncx>
"#,
        uid = xml_escape(&identifier(spec)),
        title = xml_escape(&spec.title),
        author = xml_escape(&spec.author),
        nav_points = nav_points
    )
}
