//! Read-only query surface over the archive.
//!
//! [`QueryService`] is what tools call. It validates and bounds every input
//! before handing it to the [`ArchiveStore`], so that no caller can request
//! an unbounded result set. Limits above the maximum are clamped; malformed
//! values (limits below 1, bad dates, unknown tiers, unknown metrics) are
//! rejected with
//! [`ArchiveError::InvalidInput`]. Nothing here writes.

use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::{ArchiveError, Result};
use crate::models::{
    ArchiveStats, Article, ArticleSummary, Audience, Engagement, Metric, NewsletterInfo, SearchHit,
};
use crate::store::{ArchiveStore, SearchFilter};

pub const SEARCH_DEFAULT_LIMIT: i64 = 20;
pub const SEARCH_MAX_LIMIT: i64 = 50;
pub const FTS_DEFAULT_LIMIT: i64 = 10;
pub const FTS_MAX_LIMIT: i64 = 25;
pub const TOP_DEFAULT_N: i64 = 10;
pub const TOP_MAX_N: i64 = 25;

/// Raw filters for [`QueryService::search_articles`], as they arrive from a tool call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    pub keyword: Option<String>,
    /// `YYYY-MM-DD`, inclusive.
    pub date_from: Option<String>,
    /// `YYYY-MM-DD`, inclusive.
    pub date_to: Option<String>,
    pub audience: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub struct QueryService {
    store: ArchiveStore,
}

impl QueryService {
    pub fn new(store: ArchiveStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &ArchiveStore {
        &self.store
    }

    /// Publication metadata plus a short summary of the archive.
    pub async fn newsletter_info(&self) -> Result<NewsletterInfo> {
        let publication = self.store.publication().await?.ok_or_else(|| {
            ArchiveError::NotFound("no publication ingested yet (run `newsletter ingest`)".into())
        })?;
        let stats = self.store.aggregate_stats().await?;

        Ok(NewsletterInfo {
            publication,
            total_articles: stats.total_articles,
            date_range: stats.date_range,
            engagement: Engagement {
                total_reactions: stats.total_reactions,
                total_comments: stats.total_comments,
            },
            avg_word_count: stats.avg_word_count,
        })
    }

    pub async fn search_articles(&self, params: &SearchParams) -> Result<Vec<ArticleSummary>> {
        let date_from = params.date_from.as_deref().map(parse_date).transpose()?;
        let date_to = params.date_to.as_deref().map(parse_date).transpose()?;
        if let (Some(from), Some(to)) = (date_from, date_to) {
            if from > to {
                return Err(ArchiveError::InvalidInput(format!(
                    "date_from ({}) is after date_to ({})",
                    from, to
                )));
            }
        }

        let audience = params
            .audience
            .as_deref()
            .map(|a| a.parse::<Audience>().map_err(ArchiveError::InvalidInput))
            .transpose()?;

        let filter = SearchFilter {
            keyword: params.keyword.clone(),
            date_from,
            date_to,
            audience,
            limit: clamp_limit(params.limit, SEARCH_DEFAULT_LIMIT, SEARCH_MAX_LIMIT)?,
            offset: check_offset(params.offset)?,
        };
        self.store.search(&filter).await
    }

    pub async fn full_text_search(
        &self,
        query: &str,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<SearchHit>> {
        if query.trim().is_empty() {
            return Err(ArchiveError::InvalidInput(
                "query must not be empty".to_string(),
            ));
        }
        self.store
            .full_text_search(
                query,
                clamp_limit(limit, FTS_DEFAULT_LIMIT, FTS_MAX_LIMIT)?,
                check_offset(offset)?,
            )
            .await
    }

    pub async fn get_article(&self, id: i64) -> Result<Article> {
        self.store
            .get_by_id(id)
            .await?
            .ok_or_else(|| ArchiveError::NotFound(format!("article {}", id)))
    }

    pub async fn get_articles_batch(&self, ids: &[i64]) -> Result<Vec<Article>> {
        self.store.get_by_ids(ids).await
    }

    pub async fn stats(&self) -> Result<ArchiveStats> {
        self.store.aggregate_stats().await
    }

    /// `metric` accepts `reactions`, `comments`, `word_count` and their column aliases.
    pub async fn top_articles(&self, metric: &str, n: Option<i64>) -> Result<Vec<ArticleSummary>> {
        let metric: Metric = metric.parse().map_err(ArchiveError::InvalidInput)?;
        self.store
            .top_articles(metric, clamp_limit(n, TOP_DEFAULT_N, TOP_MAX_N)?)
            .await
    }
}

fn clamp_limit(requested: Option<i64>, default: i64, max: i64) -> Result<i64> {
    match requested.unwrap_or(default) {
        n if n < 1 => Err(ArchiveError::InvalidInput(format!(
            "limit must be >= 1, got {}",
            n
        ))),
        n => Ok(n.min(max)),
    }
}

fn check_offset(offset: Option<i64>) -> Result<i64> {
    match offset.unwrap_or(0) {
        o if o < 0 => Err(ArchiveError::InvalidInput(format!(
            "offset must be >= 0, got {}",
            o
        ))),
        o => Ok(o),
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| {
        ArchiveError::InvalidInput(format!("invalid date '{}', expected YYYY-MM-DD", s))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn service() -> QueryService {
        QueryService::new(ArchiveStore::open_in_memory().await.unwrap())
    }

    #[test]
    fn limits_are_clamped() {
        assert_eq!(clamp_limit(None, 20, 50).unwrap(), 20);
        assert_eq!(clamp_limit(Some(500), 20, 50).unwrap(), 50);
        assert_eq!(clamp_limit(Some(1), 10, 25).unwrap(), 1);
    }

    #[tokio::test]
    async fn zero_or_negative_limits_are_rejected() {
        let q = service().await;

        assert!(matches!(
            q.top_articles("reactions", Some(0)).await.unwrap_err(),
            ArchiveError::InvalidInput(_)
        ));
        assert!(matches!(
            q.full_text_search("tides", Some(-3), None).await.unwrap_err(),
            ArchiveError::InvalidInput(_)
        ));
        let zero = SearchParams {
            limit: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            q.search_articles(&zero).await.unwrap_err(),
            ArchiveError::InvalidInput(_)
        ));
    }

    #[tokio::test]
    async fn malformed_inputs_are_rejected() {
        let q = service().await;

        let bad_date = SearchParams {
            date_from: Some("03/01/2024".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            q.search_articles(&bad_date).await.unwrap_err(),
            ArchiveError::InvalidInput(_)
        ));

        let bad_tier = SearchParams {
            audience: Some("vip".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            q.search_articles(&bad_tier).await.unwrap_err(),
            ArchiveError::InvalidInput(_)
        ));

        let backwards = SearchParams {
            date_from: Some("2024-02-01".to_string()),
            date_to: Some("2024-01-01".to_string()),
            ..Default::default()
        };
        assert!(q.search_articles(&backwards).await.is_err());

        let negative = SearchParams {
            offset: Some(-1),
            ..Default::default()
        };
        assert!(q.search_articles(&negative).await.is_err());

        assert!(matches!(
            q.full_text_search("   ", None, None).await.unwrap_err(),
            ArchiveError::InvalidInput(_)
        ));
        assert!(matches!(
            q.top_articles("likes", None).await.unwrap_err(),
            ArchiveError::InvalidInput(_)
        ));
    }

    #[tokio::test]
    async fn info_before_first_ingest_is_not_found() {
        let q = service().await;
        assert!(matches!(
            q.newsletter_info().await.unwrap_err(),
            ArchiveError::NotFound(_)
        ));
        assert!(matches!(
            q.get_article(1).await.unwrap_err(),
            ArchiveError::NotFound(_)
        ));
    }
}
