//! SQLite-backed archive store.
//!
//! [`ArchiveStore`] is the only component that writes to the database. An
//! article row and its FTS5 entry are written by a single statement (the
//! index is maintained by triggers, see [`migrate`](crate::migrate)), so each
//! article write either fully commits or fully fails.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`initialize`](ArchiveStore::initialize) | Create schema if absent |
//! | [`upsert_publication`](ArchiveStore::upsert_publication) | Create or update the publication singleton |
//! | [`exists`](ArchiveStore::exists) | URL dedupe check |
//! | [`insert_article`](ArchiveStore::insert_article) | Insert a new article |
//! | [`replace_article`](ArchiveStore::replace_article) | Overwrite an article by URL |
//! | [`search`](ArchiveStore::search) | Filtered metadata listing |
//! | [`full_text_search`](ArchiveStore::full_text_search) | Ranked keyword search with snippets |
//! | [`get_by_id`](ArchiveStore::get_by_id) / [`get_by_ids`](ArchiveStore::get_by_ids) | Full records |
//! | [`aggregate_stats`](ArchiveStore::aggregate_stats) | Totals, ranges, breakdowns |
//! | [`top_articles`](ArchiveStore::top_articles) | Rank by an engagement metric |

use chrono::{DateTime, Days, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use std::path::Path;

use crate::db;
use crate::error::{ArchiveError, Result};
use crate::migrate;
use crate::models::{
    format_ts, parse_ts, ArchiveStats, Article, ArticleSummary, Audience, DateRange, Metric,
    NewArticle, Publication, PublicationMeta, SearchHit,
};

/// Maximum number of ids accepted by [`ArchiveStore::get_by_ids`].
pub const MAX_BATCH: usize = 5;

const ARTICLE_COLUMNS: &str = "id, title, subtitle, url, published_at, content_html, content_text, \
     word_count, audience, reaction_count, comment_count, reactions_json, categories_json, \
     hero_image_url, fetched_at";

const SUMMARY_COLUMNS: &str =
    "id, title, subtitle, url, published_at, word_count, audience, reaction_count, comment_count";

/// Filters for [`ArchiveStore::search`]. All filters are optional and combine with AND.
#[derive(Debug, Clone)]
pub struct SearchFilter {
    /// Case-insensitive substring of the title or subtitle.
    pub keyword: Option<String>,
    /// Inclusive lower bound on the publish date.
    pub date_from: Option<NaiveDate>,
    /// Inclusive upper bound on the publish date.
    pub date_to: Option<NaiveDate>,
    pub audience: Option<Audience>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for SearchFilter {
    fn default() -> Self {
        Self {
            keyword: None,
            date_from: None,
            date_to: None,
            audience: None,
            limit: 20,
            offset: 0,
        }
    }
}

pub struct ArchiveStore {
    pool: SqlitePool,
}

impl ArchiveStore {
    /// Open (creating if needed) the archive file and ensure the schema exists.
    pub async fn open(db_path: &Path) -> Result<Self> {
        let store = Self::new(db::connect(db_path).await?);
        store.initialize().await?;
        Ok(store)
    }

    /// Open an existing archive for reading only.
    ///
    /// Never creates the file and never runs migrations. A missing file is
    /// [`ArchiveError::NotFound`].
    pub async fn open_read_only(db_path: &Path) -> Result<Self> {
        if !db_path.is_file() {
            return Err(ArchiveError::NotFound(format!(
                "archive database {} (run `newsletter init` and `newsletter ingest` first)",
                db_path.display()
            )));
        }
        Ok(Self::new(db::connect_read_only(db_path).await?))
    }

    /// Open a fresh in-memory archive with the schema in place.
    pub async fn open_in_memory() -> Result<Self> {
        let store = Self::new(db::connect_in_memory().await?);
        store.initialize().await?;
        Ok(store)
    }

    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Create tables, index and triggers if absent. Safe to call repeatedly.
    pub async fn initialize(&self) -> Result<()> {
        migrate::run_migrations(&self.pool).await
    }

    // ============ Publication ============

    /// Insert the publication singleton, or update its descriptive fields.
    ///
    /// Never touches `last_fetched`; see [`mark_fetched`](Self::mark_fetched).
    pub async fn upsert_publication(&self, meta: &PublicationMeta) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO publication (id, name, slug, url, description, author, last_fetched)
            VALUES (1, ?, ?, ?, ?, ?, NULL)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                slug = excluded.slug,
                url = excluded.url,
                description = excluded.description,
                author = excluded.author
            "#,
        )
        .bind(&meta.name)
        .bind(&meta.slug)
        .bind(&meta.url)
        .bind(&meta.description)
        .bind(&meta.author)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn publication(&self) -> Result<Option<Publication>> {
        let row = sqlx::query(
            "SELECT name, slug, url, description, author, last_fetched FROM publication WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let last_fetched: Option<String> = row.try_get("last_fetched")?;
            Ok(Publication {
                name: row.try_get("name")?,
                slug: row.try_get("slug")?,
                url: row.try_get("url")?,
                description: row.try_get("description")?,
                author: row.try_get("author")?,
                last_fetched: last_fetched.as_deref().and_then(parse_ts),
            })
        })
        .transpose()
    }

    /// Record the watermark of a completed ingest run.
    pub async fn mark_fetched(&self, at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query("UPDATE publication SET last_fetched = ? WHERE id = 1")
            .bind(format_ts(&at))
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ArchiveError::NotFound(
                "publication (run an ingest first)".to_string(),
            ));
        }
        Ok(())
    }

    // ============ Articles: writes ============

    pub async fn exists(&self, url: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM articles WHERE url = ?)")
            .bind(url)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    /// Insert a new article, returning its id.
    ///
    /// Fails with [`ArchiveError::Constraint`] when the URL is already stored.
    pub async fn insert_article(&self, article: &NewArticle) -> Result<i64> {
        let reactions_json = serde_json::to_string(&article.reactions).unwrap_or_default();
        let categories_json = serde_json::to_string(&article.categories).unwrap_or_default();

        let result = sqlx::query(
            r#"
            INSERT INTO articles (title, subtitle, url, published_at, content_html, content_text,
                                  word_count, audience, reaction_count, comment_count,
                                  reactions_json, categories_json, hero_image_url, fetched_at,
                                  search_key)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&article.title)
        .bind(&article.subtitle)
        .bind(&article.url)
        .bind(article.published_at.as_ref().map(format_ts))
        .bind(&article.content_html)
        .bind(&article.content_text)
        .bind(article.word_count)
        .bind(article.audience.as_str())
        .bind(article.reaction_count)
        .bind(article.comment_count)
        .bind(reactions_json)
        .bind(categories_json)
        .bind(&article.hero_image_url)
        .bind(format_ts(&article.fetched_at))
        .bind(search_key(article))
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => ArchiveError::Constraint {
                url: article.url.clone(),
            },
            other => ArchiveError::Storage(other),
        })?;

        Ok(result.last_insert_rowid())
    }

    /// Overwrite every field of the article stored under `article.url`.
    ///
    /// The id is kept. Fails with [`ArchiveError::NotFound`] if no such URL.
    pub async fn replace_article(&self, article: &NewArticle) -> Result<i64> {
        let reactions_json = serde_json::to_string(&article.reactions).unwrap_or_default();
        let categories_json = serde_json::to_string(&article.categories).unwrap_or_default();

        let id: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE articles SET
                title = ?,
                subtitle = ?,
                published_at = ?,
                content_html = ?,
                content_text = ?,
                word_count = ?,
                audience = ?,
                reaction_count = ?,
                comment_count = ?,
                reactions_json = ?,
                categories_json = ?,
                hero_image_url = ?,
                fetched_at = ?,
                search_key = ?
            WHERE url = ?
            RETURNING id
            "#,
        )
        .bind(&article.title)
        .bind(&article.subtitle)
        .bind(article.published_at.as_ref().map(format_ts))
        .bind(&article.content_html)
        .bind(&article.content_text)
        .bind(article.word_count)
        .bind(article.audience.as_str())
        .bind(article.reaction_count)
        .bind(article.comment_count)
        .bind(reactions_json)
        .bind(categories_json)
        .bind(&article.hero_image_url)
        .bind(format_ts(&article.fetched_at))
        .bind(search_key(article))
        .bind(&article.url)
        .fetch_optional(&self.pool)
        .await?;

        id.ok_or_else(|| ArchiveError::NotFound(format!("article {}", article.url)))
    }

    // ============ Articles: reads ============

    pub async fn count(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    /// Number of rows held by the full-text index.
    pub async fn index_entry_count(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles_fts_docsize")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    /// Metadata-only listing, newest first.
    pub async fn search(&self, filter: &SearchFilter) -> Result<Vec<ArticleSummary>> {
        let keyword = filter
            .keyword
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(|k| format!("%{}%", escape_like(&k.to_lowercase())));
        let from = filter.date_from.map(|d| d.format("%Y-%m-%d").to_string());
        // Exclusive bound on the following day makes date_to inclusive.
        let until = filter
            .date_to
            .and_then(|d| d.checked_add_days(Days::new(1)))
            .map(|d| d.format("%Y-%m-%d").to_string());
        let audience = filter.audience.map(|a| a.as_str());

        let sql = format!(
            r#"
            SELECT {SUMMARY_COLUMNS}
            FROM articles
            WHERE (?1 IS NULL OR search_key LIKE ?1 ESCAPE '\')
              AND (?2 IS NULL OR published_at >= ?2)
              AND (?3 IS NULL OR published_at < ?3)
              AND (?4 IS NULL OR audience = ?4)
            ORDER BY published_at DESC, id DESC
            LIMIT ?5 OFFSET ?6
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(keyword)
            .bind(from)
            .bind(until)
            .bind(audience)
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(summary_from_row).collect()
    }

    /// Ranked keyword search over title, subtitle and body.
    ///
    /// The query is reduced to its word tokens, each quoted, so FTS5 syntax
    /// characters in user input cannot produce a parse error. All tokens must
    /// match.
    pub async fn full_text_search(
        &self,
        query: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SearchHit>> {
        let expr = fts_match_expression(query).ok_or_else(|| {
            ArchiveError::InvalidInput("query must contain at least one word".to_string())
        })?;

        let rows = sqlx::query(
            r#"
            SELECT a.id, a.title, a.url, a.published_at,
                   snippet(articles_fts, -1, '<b>', '</b>', '...', 32) AS snippet,
                   bm25(articles_fts) AS rank
            FROM articles_fts
            JOIN articles a ON a.id = articles_fts.rowid
            WHERE articles_fts MATCH ?
            ORDER BY rank, a.id
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(expr)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let published_at: Option<String> = row.try_get("published_at")?;
                let rank: f64 = row.try_get("rank")?;
                Ok(SearchHit {
                    id: row.try_get("id")?,
                    title: row.try_get("title")?,
                    url: row.try_get("url")?,
                    published_at: published_at.as_deref().and_then(parse_ts),
                    snippet: row.try_get("snippet")?,
                    // bm25 is negative; negate so higher = better
                    score: -rank,
                })
            })
            .collect()
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Article>> {
        let sql = format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(article_from_row).transpose()
    }

    /// Full records for up to [`MAX_BATCH`] ids, in request order.
    ///
    /// Any missing id fails the whole call; results are never partial.
    pub async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<Article>> {
        if ids.is_empty() {
            return Err(ArchiveError::InvalidInput(
                "ids must not be empty".to_string(),
            ));
        }
        if ids.len() > MAX_BATCH {
            return Err(ArchiveError::TooManyRequested {
                requested: ids.len(),
                max: MAX_BATCH,
            });
        }

        let mut articles = Vec::with_capacity(ids.len());
        for &id in ids {
            let article = self
                .get_by_id(id)
                .await?
                .ok_or_else(|| ArchiveError::NotFound(format!("article {}", id)))?;
            articles.push(article);
        }
        Ok(articles)
    }

    pub async fn aggregate_stats(&self) -> Result<ArchiveStats> {
        let totals = sqlx::query(
            r#"
            SELECT COUNT(*) AS total_articles,
                   COALESCE(SUM(reaction_count), 0) AS total_reactions,
                   COALESCE(SUM(comment_count), 0) AS total_comments,
                   COALESCE(AVG(word_count), 0.0) AS avg_word_count,
                   COALESCE(AVG(reaction_count), 0.0) AS avg_reactions,
                   COALESCE(AVG(comment_count), 0.0) AS avg_comments,
                   MIN(published_at) AS earliest,
                   MAX(published_at) AS latest
            FROM articles
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let audience_rows = sqlx::query(
            "SELECT audience, COUNT(*) AS n FROM articles GROUP BY audience ORDER BY audience",
        )
        .fetch_all(&self.pool)
        .await?;

        let year_rows = sqlx::query(
            r#"
            SELECT substr(published_at, 1, 4) AS year, COUNT(*) AS n
            FROM articles
            WHERE published_at IS NOT NULL
            GROUP BY year
            ORDER BY year
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut audience_breakdown = BTreeMap::new();
        let (mut open_articles, mut restricted_articles) = (0, 0);
        for row in &audience_rows {
            let tier: String = row.try_get("audience")?;
            let n: i64 = row.try_get("n")?;
            if tier.parse::<Audience>().is_ok_and(|a| a.is_restricted()) {
                restricted_articles += n;
            } else {
                open_articles += n;
            }
            audience_breakdown.insert(tier, n);
        }
        let mut articles_by_year = BTreeMap::new();
        for row in &year_rows {
            articles_by_year.insert(row.try_get::<String, _>("year")?, row.try_get("n")?);
        }

        let earliest: Option<String> = totals.try_get("earliest")?;
        let latest: Option<String> = totals.try_get("latest")?;
        let avg_words: f64 = totals.try_get("avg_word_count")?;
        let avg_reactions: f64 = totals.try_get("avg_reactions")?;
        let avg_comments: f64 = totals.try_get("avg_comments")?;

        Ok(ArchiveStats {
            total_articles: totals.try_get("total_articles")?,
            total_reactions: totals.try_get("total_reactions")?,
            total_comments: totals.try_get("total_comments")?,
            avg_word_count: avg_words.round() as i64,
            avg_reactions_per_article: round_tenths(avg_reactions),
            avg_comments_per_article: round_tenths(avg_comments),
            date_range: DateRange {
                earliest: earliest.as_deref().and_then(parse_ts),
                latest: latest.as_deref().and_then(parse_ts),
            },
            open_articles,
            restricted_articles,
            audience_breakdown,
            articles_by_year,
        })
    }

    /// Top `n` articles by `metric`; ties go to the more recently published.
    pub async fn top_articles(&self, metric: Metric, n: i64) -> Result<Vec<ArticleSummary>> {
        let sql = format!(
            "SELECT {SUMMARY_COLUMNS} FROM articles ORDER BY {} DESC, published_at DESC, id DESC LIMIT ?",
            metric.column()
        );
        let rows = sqlx::query(&sql).bind(n).fetch_all(&self.pool).await?;
        rows.iter().map(summary_from_row).collect()
    }
}

/// Title and subtitle, lowercased with full Unicode case folding. SQLite
/// `LIKE` and `lower()` only fold ASCII, so keyword matching runs against
/// this column with the keyword lowercased the same way.
fn search_key(article: &NewArticle) -> String {
    format!(
        "{}\n{}",
        article.title,
        article.subtitle.as_deref().unwrap_or_default()
    )
    .to_lowercase()
}

/// Build an FTS5 MATCH expression from free text.
///
/// Splits on anything that is not alphanumeric (the same boundaries the
/// `unicode61` tokenizer uses) and quotes each token. Returns `None` when
/// no token survives.
pub fn fts_match_expression(query: &str) -> Option<String> {
    let tokens: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t))
        .collect();

    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" "))
    }
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn round_tenths(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

fn summary_from_row(row: &SqliteRow) -> Result<ArticleSummary> {
    let published_at: Option<String> = row.try_get("published_at")?;
    let audience: String = row.try_get("audience")?;
    Ok(ArticleSummary {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        subtitle: row.try_get("subtitle")?,
        url: row.try_get("url")?,
        published_at: published_at.as_deref().and_then(parse_ts),
        word_count: row.try_get("word_count")?,
        audience: Audience::from_platform(&audience),
        reaction_count: row.try_get("reaction_count")?,
        comment_count: row.try_get("comment_count")?,
    })
}

fn article_from_row(row: &SqliteRow) -> Result<Article> {
    let published_at: Option<String> = row.try_get("published_at")?;
    let fetched_at: String = row.try_get("fetched_at")?;
    let audience: String = row.try_get("audience")?;
    let reactions_json: String = row.try_get("reactions_json")?;
    let categories_json: String = row.try_get("categories_json")?;

    Ok(Article {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        subtitle: row.try_get("subtitle")?,
        url: row.try_get("url")?,
        published_at: published_at.as_deref().and_then(parse_ts),
        content_html: row.try_get("content_html")?,
        content_text: row.try_get("content_text")?,
        word_count: row.try_get("word_count")?,
        audience: Audience::from_platform(&audience),
        reaction_count: row.try_get("reaction_count")?,
        comment_count: row.try_get("comment_count")?,
        reactions: serde_json::from_str(&reactions_json).unwrap_or_default(),
        categories: serde_json::from_str(&categories_json).unwrap_or_default(),
        hero_image_url: row.try_get("hero_image_url")?,
        fetched_at: parse_ts(&fetched_at),
    })
}
