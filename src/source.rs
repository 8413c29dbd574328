//! Archive sources.
//!
//! An [`ArchiveSource`] knows how to resolve a publication, page through its
//! archive listing, and fetch the full body of one post. The ingest pipeline
//! only talks to this trait, which keeps it testable with a fake source.
//!
//! [`SubstackSource`] is the production implementation. It reads the
//! platform's public JSON endpoints:
//!
//! | Request | Endpoint |
//! |---------|----------|
//! | archive page | `GET {base}/api/v1/archive?sort=new&offset={o}&limit={n}` |
//! | post body | `GET {base}/api/v1/posts/{slug}` |
//!
//! Only entries of type `newsletter` are kept; restacks, podcasts and other
//! post types are dropped from the listing.
//!
//! Outbound requests are spaced at least [`MIN_REQUEST_INTERVAL`] apart.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use url::Url;

use crate::models::{parse_ts, ArchiveEntry, ArticleContent, Audience, PublicationMeta};

/// Minimum spacing between two requests to the platform.
pub const MIN_REQUEST_INTERVAL: Duration = Duration::from_secs(1);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// One page of the archive listing.
#[derive(Debug, Clone, Default)]
pub struct ArchivePage {
    /// Entries kept after type filtering, newest first.
    pub entries: Vec<ArchiveEntry>,
    /// Number of raw items the platform returned. Zero marks the end of the
    /// archive. Pagination advances by this count, not by `entries.len()`.
    pub fetched: usize,
}

/// A publication's archive, as seen by the ingest pipeline.
#[async_trait]
pub trait ArchiveSource: Send + Sync {
    /// Human-readable location used in progress lines and errors.
    fn target(&self) -> String;

    /// Resolve publication metadata. Failing here means the source is
    /// unreachable or the publication does not exist.
    async fn resolve(&self) -> Result<PublicationMeta>;

    /// Fetch one listing page starting at `offset`.
    async fn list_archive(&self, offset: usize, limit: usize) -> Result<ArchivePage>;

    /// Fetch the full body of one entry.
    async fn fetch_article(&self, entry: &ArchiveEntry) -> Result<ArticleContent>;
}

/// Reads a Substack publication over its public JSON API.
pub struct SubstackSource {
    slug: String,
    base: Url,
    client: reqwest::Client,
    last_request: Mutex<Option<Instant>>,
}

impl SubstackSource {
    /// `base_url` defaults to `https://{slug}.substack.com`.
    pub fn new(slug: &str, base_url: Option<&str>) -> Result<Self> {
        let slug = slug.trim();
        if slug.is_empty() {
            bail!("publication slug must not be empty");
        }
        let base = match base_url {
            Some(u) => Url::parse(u).with_context(|| format!("Invalid base URL: {}", u))?,
            None => Url::parse(&format!("https://{}.substack.com", slug))
                .with_context(|| format!("Invalid publication slug: {}", slug))?,
        };

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("newsletter-archive/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            slug: slug.to_string(),
            base,
            client,
            last_request: Mutex::new(None),
        })
    }

    fn base_str(&self) -> &str {
        self.base.as_str().trim_end_matches('/')
    }

    /// Sleep until [`MIN_REQUEST_INTERVAL`] has passed since the last request.
    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < MIN_REQUEST_INTERVAL {
                tokio::time::sleep(MIN_REQUEST_INTERVAL - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.throttle().await;
        tracing::debug!(url, "GET");

        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            bail!("HTTP {} from {}", status.as_u16(), url);
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("unexpected response body from {}", url))
    }

    fn archive_url(&self, offset: usize, limit: usize) -> String {
        format!(
            "{}/api/v1/archive?sort=new&offset={}&limit={}",
            self.base_str(),
            offset,
            limit
        )
    }
}

#[async_trait]
impl ArchiveSource for SubstackSource {
    fn target(&self) -> String {
        self.base_str().to_string()
    }

    async fn resolve(&self) -> Result<PublicationMeta> {
        let posts: Vec<RawPost> = self.get_json(&self.archive_url(0, 1)).await?;
        Ok(publication_meta(&self.slug, self.base_str(), &posts))
    }

    async fn list_archive(&self, offset: usize, limit: usize) -> Result<ArchivePage> {
        let posts: Vec<RawPost> = self.get_json(&self.archive_url(offset, limit)).await?;
        tracing::debug!(offset, count = posts.len(), "archive page");
        Ok(archive_page(self.base_str(), posts))
    }

    async fn fetch_article(&self, entry: &ArchiveEntry) -> Result<ArticleContent> {
        let url = format!("{}/api/v1/posts/{}", self.base_str(), entry.slug);
        let post: RawPostDetail = self.get_json(&url).await?;
        let body_html = post
            .body_html
            .filter(|b| !b.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("post has no body (paywalled or empty)"))?;

        Ok(ArticleContent {
            body_html,
            reaction_count: post.reaction_count,
            comment_count: post.comment_count,
            reactions: post.reactions,
        })
    }
}

// ============ Wire format ============

#[derive(Debug, Deserialize)]
struct RawPost {
    #[serde(rename = "type")]
    kind: Option<String>,
    title: Option<String>,
    subtitle: Option<String>,
    canonical_url: Option<String>,
    slug: Option<String>,
    post_date: Option<String>,
    audience: Option<String>,
    reaction_count: Option<i64>,
    comment_count: Option<i64>,
    reactions: Option<BTreeMap<String, i64>>,
    #[serde(rename = "postTags")]
    post_tags: Option<Vec<RawTag>>,
    cover_image: Option<String>,
    publication: Option<RawPublication>,
    #[serde(rename = "publishedBylines")]
    published_bylines: Option<Vec<RawByline>>,
}

#[derive(Debug, Deserialize)]
struct RawTag {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPublication {
    name: Option<String>,
    hero_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawByline {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPostDetail {
    body_html: Option<String>,
    reaction_count: Option<i64>,
    comment_count: Option<i64>,
    reactions: Option<BTreeMap<String, i64>>,
}

/// Publication metadata derived from archive posts; the name falls back
/// to the slug.
fn publication_meta(slug: &str, base: &str, posts: &[RawPost]) -> PublicationMeta {
    let publication = posts.iter().filter_map(|p| p.publication.as_ref());

    let name = publication
        .clone()
        .filter_map(|p| non_empty(p.name.as_deref()))
        .next()
        .unwrap_or_else(|| slug.to_string());
    let description = publication
        .filter_map(|p| non_empty(p.hero_text.as_deref()))
        .next();
    let author = posts
        .iter()
        .filter_map(|p| p.published_bylines.as_ref()?.first())
        .filter_map(|b| non_empty(b.name.as_deref()))
        .next();

    PublicationMeta {
        name,
        slug: slug.to_string(),
        url: base.to_string(),
        description,
        author,
    }
}

fn archive_page(base: &str, posts: Vec<RawPost>) -> ArchivePage {
    let fetched = posts.len();
    let entries = posts
        .into_iter()
        .filter(|p| p.kind.as_deref() == Some("newsletter"))
        .filter_map(|p| archive_entry(base, p))
        .collect();
    ArchivePage { entries, fetched }
}

fn archive_entry(base: &str, post: RawPost) -> Option<ArchiveEntry> {
    let Some(slug) = non_empty(post.slug.as_deref()) else {
        tracing::warn!(title = ?post.title, "archive entry without slug, ignoring");
        return None;
    };
    let url = non_empty(post.canonical_url.as_deref())
        .unwrap_or_else(|| format!("{}/p/{}", base, slug));

    Some(ArchiveEntry {
        title: non_empty(post.title.as_deref()).unwrap_or_else(|| "Untitled".to_string()),
        subtitle: non_empty(post.subtitle.as_deref()),
        url,
        slug,
        published_at: post.post_date.as_deref().and_then(parse_ts),
        audience: post
            .audience
            .as_deref()
            .map(Audience::from_platform)
            .unwrap_or(Audience::Everyone),
        reaction_count: post.reaction_count.unwrap_or(0),
        comment_count: post.comment_count.unwrap_or(0),
        reactions: post.reactions.unwrap_or_default(),
        categories: post
            .post_tags
            .unwrap_or_default()
            .into_iter()
            .filter_map(|t| non_empty(t.name.as_deref()))
            .collect(),
        hero_image_url: non_empty(post.cover_image.as_deref()),
    })
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://fieldnotes.substack.com";

    fn parse(json: &str) -> Vec<RawPost> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn archive_page_keeps_only_newsletters() {
        let posts = parse(
            r#"[
                {"type": "newsletter", "title": "One", "slug": "one",
                 "canonical_url": "https://fieldnotes.substack.com/p/one",
                 "post_date": "2024-03-01T09:00:00.000Z", "audience": "only_paid",
                 "reaction_count": 12, "comment_count": 3,
                 "reactions": {"❤": 12},
                 "postTags": [{"name": "essays"}, {"name": ""}],
                 "cover_image": "https://img.test/1.png"},
                {"type": "podcast", "title": "Episode", "slug": "ep"},
                {"type": "newsletter", "title": "Two", "slug": "two", "postTags": null}
            ]"#,
        );
        let page = archive_page(BASE, posts);
        assert_eq!(page.fetched, 3);
        assert_eq!(page.entries.len(), 2);

        let one = &page.entries[0];
        assert_eq!(one.audience, Audience::OnlyPaid);
        assert_eq!(one.reaction_count, 12);
        assert_eq!(one.reactions.get("❤"), Some(&12));
        assert_eq!(one.categories, vec!["essays".to_string()]);
        assert!(one.published_at.is_some());

        let two = &page.entries[1];
        assert_eq!(two.url, "https://fieldnotes.substack.com/p/two");
        assert_eq!(two.audience, Audience::Everyone);
        assert_eq!(two.reaction_count, 0);
        assert!(two.categories.is_empty());
    }

    #[test]
    fn entries_without_slug_are_ignored() {
        let posts = parse(r#"[{"type": "newsletter", "title": "No slug"}]"#);
        let page = archive_page(BASE, posts);
        assert_eq!(page.fetched, 1);
        assert!(page.entries.is_empty());
    }

    #[test]
    fn publication_meta_falls_back_to_slug() {
        let meta = publication_meta("fieldnotes", BASE, &[]);
        assert_eq!(meta.name, "fieldnotes");
        assert!(meta.author.is_none());

        let posts = parse(
            r#"[{"type": "newsletter", "slug": "a",
                 "publication": {"name": "Field Notes", "hero_text": "Dispatches"},
                 "publishedBylines": [{"name": "R. Writer"}]}]"#,
        );
        let meta = publication_meta("fieldnotes", BASE, &posts);
        assert_eq!(meta.name, "Field Notes");
        assert_eq!(meta.description.as_deref(), Some("Dispatches"));
        assert_eq!(meta.author.as_deref(), Some("R. Writer"));
        assert_eq!(meta.url, BASE);
    }

    #[test]
    fn base_url_defaults_from_slug() {
        let source = SubstackSource::new("fieldnotes", None).unwrap();
        assert_eq!(source.target(), BASE);
        assert_eq!(
            source.archive_url(24, 12),
            "https://fieldnotes.substack.com/api/v1/archive?sort=new&offset=24&limit=12"
        );

        let custom = SubstackSource::new("x", Some("http://127.0.0.1:8080/")).unwrap();
        assert_eq!(custom.target(), "http://127.0.0.1:8080");
        assert!(SubstackSource::new("  ", None).is_err());
    }
}
