//! Core data models used throughout the archive.
//!
//! These types represent the publication, the archive listing entries that
//! come back from the source, the article rows stored in SQLite, and the
//! query results handed to tools.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Who may read an article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    Everyone,
    OnlyFree,
    OnlyPaid,
    Founding,
}

impl Audience {
    pub const ALL: [Audience; 4] = [
        Audience::Everyone,
        Audience::OnlyFree,
        Audience::OnlyPaid,
        Audience::Founding,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Audience::Everyone => "everyone",
            Audience::OnlyFree => "only_free",
            Audience::OnlyPaid => "only_paid",
            Audience::Founding => "founding",
        }
    }

    /// Restricted tiers are the paying-subscriber ones.
    pub fn is_restricted(&self) -> bool {
        matches!(self, Audience::OnlyPaid | Audience::Founding)
    }

    /// Map a platform value, falling back to [`Audience::Everyone`] for
    /// anything unrecognised.
    pub fn from_platform(value: &str) -> Self {
        value.parse().unwrap_or_else(|_| {
            tracing::warn!(audience = value, "unknown audience tier, storing as everyone");
            Audience::Everyone
        })
    }
}

impl FromStr for Audience {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Audience::ALL
            .into_iter()
            .find(|a| a.as_str() == s.trim())
            .ok_or_else(|| {
                format!(
                    "unknown audience '{}'. Must be one of everyone, only_free, only_paid, founding",
                    s
                )
            })
    }
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ranking metric for [`top_articles`](crate::store::ArchiveStore::top_articles).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Reactions,
    Comments,
    WordCount,
}

impl Metric {
    /// Column the metric sorts on. Only ever one of a fixed set of names.
    pub(crate) fn column(&self) -> &'static str {
        match self {
            Metric::Reactions => "reaction_count",
            Metric::Comments => "comment_count",
            Metric::WordCount => "word_count",
        }
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "reactions" | "reaction_count" => Ok(Metric::Reactions),
            "comments" | "comment_count" => Ok(Metric::Comments),
            "word_count" | "words" => Ok(Metric::WordCount),
            other => Err(format!(
                "unknown metric '{}'. Must be reactions, comments, or word_count",
                other
            )),
        }
    }
}

/// Publication metadata as resolved from the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicationMeta {
    pub name: String,
    pub slug: String,
    pub url: String,
    pub description: Option<String>,
    pub author: Option<String>,
}

/// The stored publication singleton.
#[derive(Debug, Clone, Serialize)]
pub struct Publication {
    pub name: String,
    pub slug: String,
    pub url: String,
    pub description: Option<String>,
    pub author: Option<String>,
    pub last_fetched: Option<DateTime<Utc>>,
}

/// One entry of the archive listing, before its body has been fetched.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub title: String,
    pub subtitle: Option<String>,
    pub url: String,
    /// Path segment used to fetch the full post.
    pub slug: String,
    pub published_at: Option<DateTime<Utc>>,
    pub audience: Audience,
    pub reaction_count: i64,
    pub comment_count: i64,
    pub reactions: BTreeMap<String, i64>,
    pub categories: Vec<String>,
    pub hero_image_url: Option<String>,
}

/// Full body and fresh engagement numbers for one post.
#[derive(Debug, Clone, Default)]
pub struct ArticleContent {
    pub body_html: String,
    pub reaction_count: Option<i64>,
    pub comment_count: Option<i64>,
    pub reactions: Option<BTreeMap<String, i64>>,
}

/// An article ready to be written to the store.
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub title: String,
    pub subtitle: Option<String>,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub content_html: String,
    pub content_text: String,
    pub word_count: i64,
    pub audience: Audience,
    pub reaction_count: i64,
    pub comment_count: i64,
    pub reactions: BTreeMap<String, i64>,
    pub categories: Vec<String>,
    pub hero_image_url: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

/// A stored article with every field.
#[derive(Debug, Clone, Serialize)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub subtitle: Option<String>,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub content_html: String,
    pub content_text: String,
    pub word_count: i64,
    pub audience: Audience,
    pub reaction_count: i64,
    pub comment_count: i64,
    pub reactions: BTreeMap<String, i64>,
    pub categories: Vec<String>,
    pub hero_image_url: Option<String>,
    pub fetched_at: Option<DateTime<Utc>>,
}

/// Metadata-only view of an article used by listings and rankings.
#[derive(Debug, Clone, Serialize)]
pub struct ArticleSummary {
    pub id: i64,
    pub title: String,
    pub subtitle: Option<String>,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub word_count: i64,
    pub audience: Audience,
    pub reaction_count: i64,
    pub comment_count: i64,
}

/// A ranked full-text match.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub snippet: String,
    pub score: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DateRange {
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
}

/// Aggregate statistics over every stored article.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ArchiveStats {
    pub total_articles: i64,
    pub total_reactions: i64,
    pub total_comments: i64,
    pub avg_word_count: i64,
    pub avg_reactions_per_article: f64,
    pub avg_comments_per_article: f64,
    pub date_range: DateRange,
    /// Articles in `everyone` and `only_free`.
    pub open_articles: i64,
    /// Articles in `only_paid` and `founding`.
    pub restricted_articles: i64,
    pub audience_breakdown: BTreeMap<String, i64>,
    pub articles_by_year: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Engagement {
    pub total_reactions: i64,
    pub total_comments: i64,
}

/// Response of the `get_newsletter_info` tool.
#[derive(Debug, Clone, Serialize)]
pub struct NewsletterInfo {
    #[serde(flatten)]
    pub publication: Publication,
    pub total_articles: i64,
    pub date_range: DateRange,
    pub engagement: Engagement,
    pub avg_word_count: i64,
}

/// Format a timestamp the way it is stored: RFC 3339, UTC, milliseconds.
///
/// The fixed width keeps lexical and chronological order identical.
pub fn format_ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored or platform timestamp.
pub fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // SQLite datetime('now') format
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}
