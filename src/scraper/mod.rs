//! Site adapters and source resolution. Transport trait, parser trait, the closed site registry,
//! and the adapters themselves.

mod client;
mod error;
pub mod markup;

pub mod lightnovels;
pub mod readlightnovel;

pub use client::{HttpClient, HttpClientBuilder};
pub use error::ScraperError;

use crate::model::{Chapter, OnlineMetadata};
use reqwest::Url;

/// Transport capability the adapters and the orchestrator need.
pub trait Fetch {
    fn fetch_text(&mut self, url: &str) -> Result<String, ScraperError>;
    fn fetch_bytes(&mut self, url: &str) -> Result<Vec<u8>, ScraperError>;
}

impl<F: Fetch + ?Sized> Fetch for &mut F {
    fn fetch_text(&mut self, url: &str) -> Result<String, ScraperError> {
        (**self).fetch_text(url)
    }

    fn fetch_bytes(&mut self, url: &str) -> Result<Vec<u8>, ScraperError> {
        (**self).fetch_bytes(url)
    }
}

/// Contract every site adapter satisfies.
///
/// Adapters are stateless. Apart from the auxiliary fetches `parse_work_metadata` may make (cover
/// image, chapter list API), they perform no I/O.
pub trait Parser {
    /// Whether this adapter handles `url`. Pure predicate over host and path.
    fn owns_url(&self, url: &Url) -> bool;

    /// Extract title, cover bytes and ordered chapter links from a work's index page.
    fn parse_work_metadata(
        &self,
        html: &str,
        fetch: &mut dyn Fetch,
    ) -> Result<OnlineMetadata, ScraperError>;

    /// Extract one chapter as a complete XHTML page. `pretty` only affects whitespace.
    fn parse_chapter(&self, html: &str, pretty: bool) -> Result<Chapter<String>, ScraperError>;
}

/// Supported source site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Site {
    ReadLightNovel,
    LightNovels,
}

impl Site {
    pub const ALL: [Site; 2] = [Site::ReadLightNovel, Site::LightNovels];

    pub fn name(&self) -> &'static str {
        match self {
            Site::ReadLightNovel => "readlightnovel",
            Site::LightNovels => "lightnovels",
        }
    }

    /// Hosts the adapter accepts, for display.
    pub fn hosts(&self) -> &'static [&'static str] {
        match self {
            Site::ReadLightNovel => readlightnovel::ACCEPTED_HOSTS,
            Site::LightNovels => lightnovels::ACCEPTED_HOSTS,
        }
    }

    pub fn parser(&self) -> &'static dyn Parser {
        match self {
            Site::ReadLightNovel => &readlightnovel::ReadLightNovel,
            Site::LightNovels => &lightnovels::LightNovels,
        }
    }
}

/// Ordered set of adapters. The first adapter whose `owns_url` accepts a URL handles it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserRegistry {
    sites: Vec<Site>,
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_sites(Site::ALL.to_vec())
    }
}

impl ParserRegistry {
    pub fn with_sites(sites: Vec<Site>) -> Self {
        Self { sites }
    }

    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    /// Site for `url`, or None when the URL does not parse or no adapter owns it.
    pub fn resolve(&self, url: &str) -> Option<Site> {
        let parsed = Url::parse(url).ok()?;
        self.sites
            .iter()
            .copied()
            .find(|site| site.parser().owns_url(&parsed))
    }

    /// Like [`resolve`](Self::resolve) but reports why nothing matched.
    pub fn resolve_site(&self, url: &str) -> Result<Site, ScraperError> {
        let parsed = Url::parse(url).map_err(|e| ScraperError::InvalidUrl {
            input: url.to_string(),
            reason: e.to_string(),
        })?;
        self.sites
            .iter()
            .copied()
            .find(|site| site.parser().owns_url(&parsed))
            .ok_or_else(|| ScraperError::UnsupportedUrl {
                url: url.to_string(),
            })
    }
}

/// Resolve a URL against a base page, leaving absolute URLs untouched.
pub(crate) fn absolute_url(base: &str, href: &str) -> Result<String, ScraperError> {
    let base = Url::parse(base).map_err(|e| ScraperError::InvalidUrl {
        input: base.to_string(),
        reason: e.to_string(),
    })?;
    base.join(href)
        .map(|u| u.to_string())
        .map_err(|e| ScraperError::InvalidUrl {
            input: href.to_string(),
            reason: e.to_string(),
        })
}

/// In-memory [`Fetch`] serving canned responses, for adapter and orchestrator tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct MockFetch {
    pages: std::collections::HashMap<String, Vec<u8>>,
    pub requests: Vec<String>,
}

#[cfg(test)]
impl MockFetch {
    pub fn with(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.pages.insert(url.to_string(), body.into());
        self
    }

    fn lookup(&mut self, url: &str) -> Result<Vec<u8>, ScraperError> {
        self.requests.push(url.to_string());
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| ScraperError::HttpStatus {
                status: 404,
                url: url.to_string(),
            })
    }
}

#[cfg(test)]
impl Fetch for MockFetch {
    fn fetch_text(&mut self, url: &str) -> Result<String, ScraperError> {
        let bytes = self.lookup(url)?;
        String::from_utf8(bytes).map_err(|e| ScraperError::chapter_page("text", e.to_string()))
    }

    fn fetch_bytes(&mut self, url: &str) -> Result<Vec<u8>, ScraperError> {
        self.lookup(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_readlightnovel() {
        let registry = ParserRegistry::default();
        assert_eq!(
            registry.resolve("https://www.readlightnovel.me/the-last-villainess"),
            Some(Site::ReadLightNovel)
        );
    }

    #[test]
    fn resolves_lightnovels() {
        let registry = ParserRegistry::default();
        assert_eq!(
            registry.resolve("https://lightnovels.me/novel/the-last-villainess"),
            Some(Site::LightNovels)
        );
    }

    #[test]
    fn unknown_host_is_unsupported() -> Result<(), String> {
        let registry = ParserRegistry::default();
        assert_eq!(registry.resolve("https://example.com/novel/1"), None);
        match registry.resolve_site("https://example.com/novel/1") {
            Err(ScraperError::UnsupportedUrl { url }) if url == "https://example.com/novel/1" => {
                Ok(())
            }
            other => Err(format!("expected UnsupportedUrl, got {:?}", other)),
        }
    }

    #[test]
    fn malformed_url_is_unsupported() -> Result<(), String> {
        let registry = ParserRegistry::default();
        assert_eq!(registry.resolve("not-a-url"), None);
        match registry.resolve_site("not-a-url") {
            Err(ScraperError::InvalidUrl { input, .. }) if input == "not-a-url" => Ok(()),
            other => Err(format!("expected InvalidUrl, got {:?}", other)),
        }
    }

    #[test]
    fn disjoint_adapters_never_share_a_url() -> Result<(), Box<dyn std::error::Error>> {
        let registry = ParserRegistry::default();
        let rln = Url::parse("https://readlightnovel.com/some-novel")?;
        let ln = Url::parse("https://pandapama.com/read/some-novel/chapter-1")?;
        assert_eq!(registry.resolve(rln.as_str()), Some(Site::ReadLightNovel));
        assert!(!Site::LightNovels.parser().owns_url(&rln));
        assert_eq!(registry.resolve(ln.as_str()), Some(Site::LightNovels));
        assert!(!Site::ReadLightNovel.parser().owns_url(&ln));
        Ok(())
    }

    #[test]
    fn registration_order_and_membership_are_respected() {
        let only_lightnovels = ParserRegistry::with_sites(vec![Site::LightNovels]);
        assert_eq!(
            only_lightnovels.resolve("https://www.readlightnovel.me/the-last-villainess"),
            None
        );
        assert_eq!(only_lightnovels.sites(), &[Site::LightNovels]);
    }

    #[test]
    fn absolute_url_joins_relative_hrefs() -> Result<(), ScraperError> {
        assert_eq!(
            absolute_url("https://www.readlightnovel.me/", "/novel/chapter-1")?,
            "https://www.readlightnovel.me/novel/chapter-1"
        );
        assert_eq!(
            absolute_url("https://www.readlightnovel.me/", "https://cdn.example.com/c.jpg")?,
            "https://cdn.example.com/c.jpg"
        );
        Ok(())
    }
}
