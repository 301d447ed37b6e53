//! LightNovels adapter (lightnovels.me, chapters served from pandapama.com).
//!
//! Both page kinds are Next.js renders: everything needed sits in the `__NEXT_DATA__` JSON blob.
//! The chapter list is not on the page; it comes from a JSON API keyed by the novel id.

use super::markup::{fragment_to_xhtml, parse_selector, pretty};
use super::{Fetch, Parser, ScraperError};
use crate::epub::section_page;
use crate::model::{Chapter, OnlineMetadata};
use crate::path::chapter_filename;
use reqwest::Url;
use scraper::Html;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

pub const ACCEPTED_HOSTS: &[&str] = &["lightnovels.me", "www.lightnovels.me", "pandapama.com"];
const ACCEPTED_PATHS: &[&str] = &["/novel", "/read"];

const NEXT_DATA_SELECTOR: &str = "script#__NEXT_DATA__";
const IMAGE_HOST: &str = "https://lightnovels.me";
const CHAPTER_LIST_ENDPOINT: &str = "https://lightnovels.me/api/chapters";
const CHAPTER_HOST: &str = "https://pandapama.com/read";
const CHAPTER_LIST_LIMIT: u32 = 15000;

#[derive(Debug, Clone, Copy, Default)]
pub struct LightNovels;

#[derive(Debug, Deserialize)]
struct NextData<P> {
    props: NextProps<P>,
}

#[derive(Debug, Deserialize)]
struct NextProps<P> {
    #[serde(rename = "pageProps")]
    page_props: P,
}

#[derive(Debug, Deserialize)]
struct NovelPageProps {
    #[serde(rename = "novelInfo")]
    novel_info: NovelInfo,
}

#[derive(Debug, Deserialize)]
struct NovelInfo {
    novel_id: u64,
    novel_name: String,
    novel_image: String,
}

#[derive(Debug, Deserialize)]
struct ChapterPageProps {
    #[serde(rename = "cachedChapterInfo")]
    chapter_info: ChapterInfo,
}

#[derive(Debug, Deserialize)]
struct ChapterInfo {
    chapter_name: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChapterList {
    #[serde(default)]
    results: Vec<ChapterListEntry>,
}

#[derive(Debug, Deserialize)]
struct ChapterListEntry {
    slug: String,
}

fn chapter_list_url(novel_id: u64) -> String {
    format!(
        "{}?id={}&index=1&limit={}",
        CHAPTER_LIST_ENDPOINT, novel_id, CHAPTER_LIST_LIMIT
    )
}

/// Deserialize `props.pageProps` from the page's `__NEXT_DATA__` script.
fn page_props<P: DeserializeOwned>(
    html: &str,
    page: fn(&'static str, String) -> ScraperError,
) -> Result<P, ScraperError> {
    let doc = Html::parse_document(html);
    let sel = parse_selector(NEXT_DATA_SELECTOR)?;
    let json = doc
        .select(&sel)
        .next()
        .map(|e| e.text().collect::<String>())
        .ok_or_else(|| page("page data", format!("no match for {}", NEXT_DATA_SELECTOR)))?;
    let data: NextData<P> =
        serde_json::from_str(json.trim()).map_err(|e| page("page data", e.to_string()))?;
    Ok(data.props.page_props)
}

impl Parser for LightNovels {
    fn owns_url(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        ACCEPTED_HOSTS.contains(&host) && ACCEPTED_PATHS.iter().any(|p| url.path().starts_with(p))
    }

    fn parse_work_metadata(
        &self,
        html: &str,
        fetch: &mut dyn Fetch,
    ) -> Result<OnlineMetadata, ScraperError> {
        let props: NovelPageProps = page_props(html, |what, reason| {
            ScraperError::work_page(what, reason)
        })?;
        let info = props.novel_info;
        let title = info.novel_name.trim().to_string();
        if title.is_empty() {
            return Err(ScraperError::work_page("title", "novel_name is empty"));
        }

        let list_json = fetch.fetch_text(&chapter_list_url(info.novel_id))?;
        let list: ChapterList = serde_json::from_str(&list_json)
            .map_err(|e| ScraperError::work_page("chapter list", e.to_string()))?;
        let chapter_links: Vec<String> = list
            .results
            .into_iter()
            .filter(|c| !c.slug.is_empty())
            .map(|c| format!("{}{}", CHAPTER_HOST, c.slug))
            .collect();
        if chapter_links.is_empty() {
            return Err(ScraperError::EmptyChapterList);
        }
        debug!(%title, novel_id = info.novel_id, chapters = chapter_links.len(), "parsed novel info");

        let cover = fetch.fetch_bytes(&format!("{}{}", IMAGE_HOST, info.novel_image))?;
        Ok(OnlineMetadata {
            title,
            cover,
            chapter_links,
        })
    }

    fn parse_chapter(&self, html: &str, pretty_print: bool) -> Result<Chapter<String>, ScraperError> {
        let props: ChapterPageProps = page_props(html, |what, reason| {
            ScraperError::chapter_page(what, reason)
        })?;
        let info = props.chapter_info;
        let title = info.chapter_name.trim().to_string();
        if title.is_empty() {
            return Err(ScraperError::chapter_page("title", "chapter_name is empty"));
        }
        let body = fragment_to_xhtml(&info.content);
        let page = section_page(&title, &body);
        let data = if pretty_print { pretty(&page) } else { page };
        Ok(Chapter::new(chapter_filename(&title), title, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::MockFetch;

    fn next_data(page_props: serde_json::Value) -> String {
        let data = serde_json::json!({ "props": { "pageProps": page_props }, "page": "/novel/[slug]" });
        // Next.js escapes '<' inside the blob so markup in strings cannot close the script tag
        let data = data.to_string().replace('<', "\\u003c");
        format!(
            r#"<html><body><div id="__next"></div><script id="__NEXT_DATA__" type="application/json">{}</script></body></html>"#,
            data
        )
    }

    fn url(s: &str) -> Url {
        Url::parse(s).expect("test url")
    }

    #[test]
    fn owns_novel_and_read_paths_only() {
        let p = LightNovels;
        assert!(p.owns_url(&url("https://lightnovels.me/novel/tale-of-t")));
        assert!(p.owns_url(&url("https://pandapama.com/read/tale-of-t/chapter-1")));
        assert!(!p.owns_url(&url("https://lightnovels.me/genre/action")));
        assert!(!p.owns_url(&url("https://lightnovels.me/")));
        assert!(!p.owns_url(&url("https://example.com/novel/tale-of-t")));
    }

    #[test]
    fn metadata_from_next_data_and_chapter_api() -> Result<(), ScraperError> {
        let html = next_data(serde_json::json!({
            "novelInfo": { "novel_id": 42, "novel_name": "T", "novel_image": "/img/t.jpg", "novel_slug": "t" }
        }));
        let list = r#"{"results":[{"id":1,"slug":"/t/chapter-1"},{"id":2,"slug":"/t/chapter-2"}]}"#;
        let mut fetch = MockFetch::default()
            .with("https://lightnovels.me/api/chapters?id=42&index=1&limit=15000", list)
            .with("https://lightnovels.me/img/t.jpg", vec![0xFF, 0xD8, 0xFF, 0xE0]);
        let meta = LightNovels.parse_work_metadata(&html, &mut fetch)?;
        assert_eq!(meta.title, "T");
        assert_eq!(
            meta.chapter_links,
            vec![
                "https://pandapama.com/read/t/chapter-1",
                "https://pandapama.com/read/t/chapter-2",
            ]
        );
        assert_eq!(meta.cover, vec![0xFF, 0xD8, 0xFF, 0xE0]);
        Ok(())
    }

    #[test]
    fn empty_results_is_an_error() {
        let html = next_data(serde_json::json!({
            "novelInfo": { "novel_id": 7, "novel_name": "T", "novel_image": "/img/t.jpg" }
        }));
        let mut fetch = MockFetch::default()
            .with("https://lightnovels.me/api/chapters?id=7&index=1&limit=15000", r#"{"results":[]}"#);
        let err = LightNovels.parse_work_metadata(&html, &mut fetch).unwrap_err();
        assert!(matches!(err, ScraperError::EmptyChapterList));
    }

    #[test]
    fn missing_next_data_is_an_extraction_error() {
        let mut fetch = MockFetch::default();
        let err = LightNovels
            .parse_work_metadata("<html><body>Just a moment...</body></html>", &mut fetch)
            .unwrap_err();
        assert!(err.is_extraction());
    }

    #[test]
    fn chapter_content_is_converted_to_xhtml() -> Result<(), ScraperError> {
        let html = next_data(serde_json::json!({
            "cachedChapterInfo": {
                "chapter_name": "Chapter 1 - Start",
                "content": "<p>First line<br>second line</p><script>ads()</script>"
            }
        }));
        let ch = LightNovels.parse_chapter(&html, false)?;
        assert_eq!(ch.title, "Chapter 1 - Start");
        assert_eq!(ch.filename, "Chapter_1_-_Start.xhtml");
        assert!(ch.data.contains("<p>First line<br/>second line</p>"));
        assert!(!ch.data.contains("ads()"));
        Ok(())
    }
}
