//! XHTML page templates: content sections, the cover page and the table of contents.

use super::{xml_escape, Cover, Image, ImageFormat, Section, IMAGE_DIR, STYLE_DIR, STYLESHEET_FILENAME};
use crate::path::href_escape;

const DEFAULT_COVER_SVG: &str = include_str!("default/cover.svg");

pub const COVER_PAGE_FILENAME: &str = "cover.xhtml";
pub const TOC_PAGE_FILENAME: &str = "toc.xhtml";

/// Stylesheet href as seen from a page in `text/`.
pub fn default_style_href() -> String {
    format!("../{}{}", STYLE_DIR, STYLESHEET_FILENAME)
}

/// Wrap `body` (well-formed XHTML) into a complete page linking the package stylesheet.
pub fn section_page(title: &str, body: &str) -> String {
    section_page_with_style(title, body, &default_style_href())
}

pub fn section_page_with_style(title: &str, body: &str, style_href: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head>
<title>{title}</title>
<link href="{style}" rel="stylesheet" type="text/css"/>
</head>
<body>
{body}
</body>
</html>
"#,
        title = xml_escape(title),
        style = xml_escape(style_href),
        body = body
    )
}

/// Cover page showing `image_filename` from the package image folder.
pub fn cover_page(image_filename: &str) -> Section {
    let src = href_escape(&format!("../{}{}", IMAGE_DIR, image_filename));
    let body = format!(
        r#"<div class="cover"><img alt="Cover" src="{}"/></div>"#,
        xml_escape(&src)
    );
    Section::page(COVER_PAGE_FILENAME, "Cover", &body)
}

/// Built-in placeholder cover: an SVG image plus its cover page.
pub fn default_cover() -> Cover {
    let format = ImageFormat::Svg;
    let filename = format!("cover.{}", format.extension());
    Cover {
        page: cover_page(&filename),
        image: Image::new(filename, DEFAULT_COVER_SVG, format.media_type()),
    }
}

/// Table of contents page with an EPUB `nav` listing `(label, href)` entries. Hrefs are relative
/// to the package text folder.
pub fn table_of_contents_page<'a, I>(entries: I) -> Section
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut items = String::new();
    for (label, href) in entries {
        items.push_str(&format!(
            "<li><a href=\"{}\">{}</a></li>\n",
            xml_escape(&href_escape(href)),
            xml_escape(label)
        ));
    }
    let body = format!(
        "<nav epub:type=\"toc\" id=\"toc\">\n<h1>Table of Contents</h1>\n<ol>\n{}</ol>\n</nav>",
        items
    );
    Section::page(TOC_PAGE_FILENAME, "Table of Contents", &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_page_escapes_title_and_links_stylesheet() {
        let page = section_page("Tom & Jerry <1>", "<p>x</p>");
        assert!(page.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(page.contains("<title>Tom &amp; Jerry &lt;1&gt;</title>"));
        assert!(page.contains(r#"<link href="../styles/stylesheet.css" rel="stylesheet" type="text/css"/>"#));
        assert!(page.contains("<body>\n<p>x</p>\n</body>"));
    }

    #[test]
    fn custom_style_href_is_used() {
        let page = section_page_with_style("T", "", "../styles/night.css");
        assert!(page.contains(r#"href="../styles/night.css""#));
    }

    #[test]
    fn toc_page_lists_entries_in_order() {
        let toc = table_of_contents_page(vec![
            ("Chapter 1", "Chapter_1.xhtml"),
            ("Chapter 2 & more", "Chapter 2.xhtml"),
        ]);
        assert_eq!(toc.filename, TOC_PAGE_FILENAME);
        let html = match toc.body {
            crate::model::Content::Text(s) => s,
            other => panic!("unexpected body {:?}", other),
        };
        let first = html.find("Chapter_1.xhtml").expect("first entry");
        let second = html.find("Chapter%202.xhtml").expect("second entry");
        assert!(first < second);
        assert!(html.contains("<nav epub:type=\"toc\" id=\"toc\">"));
        assert!(html.contains("Chapter 2 &amp; more"));
    }

    #[test]
    fn default_cover_is_svg() {
        let cover = default_cover();
        assert_eq!(cover.image.filename, "cover.svg");
        assert_eq!(cover.image.media_type, "image/svg+xml");
        assert_eq!(cover.page.filename, COVER_PAGE_FILENAME);
    }
}
