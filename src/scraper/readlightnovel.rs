//! ReadLightNovel adapter. Index page carries title, cover and the full chapter list; chapter
//! pages carry the title in the breadcrumbs and the text in a hidden div.

use super::markup::{inner_xhtml, parse_selector, pretty, text_of};
use super::{absolute_url, Fetch, Parser, ScraperError};
use crate::epub::section_page;
use crate::model::{Chapter, OnlineMetadata};
use crate::path::chapter_filename;
use reqwest::Url;
use scraper::Html;
use tracing::debug;

const BASE_URL: &str = "https://www.readlightnovel.me/";

pub const ACCEPTED_HOSTS: &[&str] = &[
    "www.readlightnovel.me",
    "readlightnovel.me",
    "www.readlightnovel.com",
    "readlightnovel.com",
];

/// Listing pages on the accepted hosts that are not works.
const BLOCKED_PATHS: &[&str] = &[
    "/hub",
    "/novel-list",
    "/genre",
    "/latest-updates",
    "/top-novels",
    "/detailed-search",
];

const TITLE_SELECTOR: &str = "div.block-title h1";
const COVER_SELECTOR: &str = ".novel-cover a img";
const CHAPTER_LIST_SELECTOR: &str = ".tab-content div ul li a";
const CHAPTER_TITLE_SELECTOR: &str = ".breadcrumb-item.active";
const CONTENT_SELECTOR: &str = "div.desc #chapterhidden";

#[derive(Debug, Clone, Copy, Default)]
pub struct ReadLightNovel;

impl Parser for ReadLightNovel {
    fn owns_url(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let path = url.path().to_ascii_lowercase();
        ACCEPTED_HOSTS.contains(&host) && !BLOCKED_PATHS.iter().any(|p| path.starts_with(p))
    }

    fn parse_work_metadata(
        &self,
        html: &str,
        fetch: &mut dyn Fetch,
    ) -> Result<OnlineMetadata, ScraperError> {
        let (title, cover_url, chapter_links) = parse_index(html)?;
        debug!(%title, chapters = chapter_links.len(), "parsed index page");
        let cover = fetch.fetch_bytes(&cover_url)?;
        Ok(OnlineMetadata {
            title,
            cover,
            chapter_links,
        })
    }

    fn parse_chapter(&self, html: &str, pretty_print: bool) -> Result<Chapter<String>, ScraperError> {
        let doc = Html::parse_document(html);
        let title_sel = parse_selector(CHAPTER_TITLE_SELECTOR)?;
        let content_sel = parse_selector(CONTENT_SELECTOR)?;

        let title = doc
            .select(&title_sel)
            .next()
            .map(text_of)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ScraperError::chapter_page("title", format!("no match for {}", CHAPTER_TITLE_SELECTOR))
            })?;
        let body = doc
            .select(&content_sel)
            .next()
            .map(inner_xhtml)
            .ok_or_else(|| {
                ScraperError::chapter_page("content", format!("no match for {}", CONTENT_SELECTOR))
            })?;

        let page = section_page(&title, &body);
        let data = if pretty_print { pretty(&page) } else { page };
        Ok(Chapter::new(chapter_filename(&title), title, data))
    }
}

/// Title, absolute cover URL and absolute chapter links from the index page.
fn parse_index(html: &str) -> Result<(String, String, Vec<String>), ScraperError> {
    let doc = Html::parse_document(html);
    let title_sel = parse_selector(TITLE_SELECTOR)?;
    let cover_sel = parse_selector(COVER_SELECTOR)?;
    let list_sel = parse_selector(CHAPTER_LIST_SELECTOR)?;

    let title = doc
        .select(&title_sel)
        .next()
        .map(text_of)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ScraperError::work_page("title", format!("no match for {}", TITLE_SELECTOR)))?;

    let cover_src = doc
        .select(&cover_sel)
        .next()
        .and_then(|e| e.value().attr("src"))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ScraperError::work_page("cover", format!("no src on {}", COVER_SELECTOR)))?;
    let cover_url = absolute_url(BASE_URL, cover_src)?;

    let mut links = Vec::new();
    for a in doc.select(&list_sel) {
        let Some(href) = a.value().attr("href").map(str::trim) else {
            continue;
        };
        if href.is_empty() {
            continue;
        }
        links.push(absolute_url(BASE_URL, href)?);
    }
    if links.is_empty() {
        return Err(ScraperError::EmptyChapterList);
    }
    Ok((title, cover_url, links))
}
