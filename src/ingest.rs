//! Ingestion pipeline orchestration.
//!
//! Coordinates one ingest run: resolve publication → enumerate archive →
//! fetch each new article → normalize → store. Runs strictly sequentially.
//! Every article commits on its own, so an interrupted run keeps the work it
//! finished and a re-run picks up the rest via URL dedupe.
//!
//! Failure policy:
//! - Resolving the publication or listing the archive fails the whole run.
//! - A single article that cannot be fetched or stored is counted as
//!   `failed` and the run moves on.
//! - The last-fetched watermark is only advanced when a run completes.

use anyhow::Context;
use chrono::Utc;
use std::collections::HashSet;
use std::fmt;

use crate::config::Config;
use crate::error::{ArchiveError, Result};
use crate::models::{ArchiveEntry, NewArticle};
use crate::normalize::{normalize, HtmlNormalizer, Normalizer};
use crate::progress::{IngestEvent, ProgressMode, ProgressReporter};
use crate::source::{ArchiveSource, SubstackSource};
use crate::store::ArchiveStore;

/// Archive listing page size. Larger pages make the platform return
/// inconsistent counts.
pub const DEFAULT_PAGE_SIZE: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IngestMode {
    /// Only entries published after the last completed run.
    #[default]
    Incremental,
    /// Walk the whole archive; stored URLs are still skipped.
    Full,
    /// Walk the whole archive and overwrite stored articles.
    Refetch,
}

impl fmt::Display for IngestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IngestMode::Incremental => "incremental",
            IngestMode::Full => "full",
            IngestMode::Refetch => "refetch",
        })
    }
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub mode: IngestMode,
    pub page_size: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            mode: IngestMode::Incremental,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// What happened to one archive entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArticleOutcome {
    Saved,
    Updated,
    Skipped,
    Failed(String),
}

impl ArticleOutcome {
    /// Text shown after `...` on the progress line.
    pub fn label(&self) -> String {
        match self {
            ArticleOutcome::Saved => "saved".to_string(),
            ArticleOutcome::Updated => "updated".to_string(),
            ArticleOutcome::Skipped => "already exists, skipped".to_string(),
            ArticleOutcome::Failed(reason) => format!("failed: {}", reason),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ArticleOutcome::Saved => "saved",
            ArticleOutcome::Updated => "updated",
            ArticleOutcome::Skipped => "skipped",
            ArticleOutcome::Failed(_) => "failed",
        }
    }
}

/// Counts for one run. `saved + updated + skipped + failed == discovered`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub discovered: usize,
    pub saved: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl IngestSummary {
    fn record(&mut self, outcome: &ArticleOutcome) {
        match outcome {
            ArticleOutcome::Saved => self.saved += 1,
            ArticleOutcome::Updated => self.updated += 1,
            ArticleOutcome::Skipped => self.skipped += 1,
            ArticleOutcome::Failed(_) => self.failed += 1,
        }
    }
}

/// One ingest run over borrowed collaborators.
pub struct Pipeline<'a> {
    source: &'a dyn ArchiveSource,
    normalizer: &'a dyn Normalizer,
    store: &'a ArchiveStore,
    progress: &'a dyn ProgressReporter,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        source: &'a dyn ArchiveSource,
        normalizer: &'a dyn Normalizer,
        store: &'a ArchiveStore,
        progress: &'a dyn ProgressReporter,
    ) -> Self {
        Self {
            source,
            normalizer,
            store,
            progress,
        }
    }

    pub async fn run(&self, options: &IngestOptions) -> Result<IngestSummary> {
        let started = Utc::now();
        let target = self.source.target();

        let meta = match self.source.resolve().await {
            Ok(meta) => meta,
            Err(e) => {
                let reason = format!("{:#}", e);
                self.progress.report(IngestEvent::ConnectFailed {
                    url: target.clone(),
                    reason: reason.clone(),
                });
                return Err(ArchiveError::SourceUnreachable { target, reason });
            }
        };
        self.progress.report(IngestEvent::Connected {
            url: target.clone(),
        });

        let watermark = match options.mode {
            IngestMode::Incremental => self.store.publication().await?.and_then(|p| p.last_fetched),
            IngestMode::Full | IngestMode::Refetch => None,
        };
        self.store.upsert_publication(&meta).await?;

        let entries = self.enumerate(options.page_size, watermark).await?;
        self.progress.report(IngestEvent::Discovered {
            total: entries.len(),
        });

        let mut summary = IngestSummary {
            discovered: entries.len(),
            ..Default::default()
        };
        let total = entries.len();
        for (i, entry) in entries.iter().enumerate() {
            let outcome = self.process(entry, options.mode).await?;
            summary.record(&outcome);
            self.progress.report(IngestEvent::Article {
                index: i + 1,
                total,
                title: entry.title.clone(),
                date: entry
                    .published_at
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_default(),
                outcome,
            });
        }

        self.store.mark_fetched(started).await?;
        tracing::info!(
            mode = %options.mode,
            discovered = summary.discovered,
            saved = summary.saved,
            updated = summary.updated,
            skipped = summary.skipped,
            failed = summary.failed,
            "ingest complete"
        );
        self.progress.report(IngestEvent::Finished(summary.clone()));
        Ok(summary)
    }

    /// Page through the archive, newest first.
    ///
    /// With a watermark, only entries published after it are kept, and paging
    /// stops on the first page that reaches it. Undated entries are always
    /// kept; dedupe decides their fate. A page whose entries are all already
    /// listed also ends paging, since the listing is no longer advancing.
    async fn enumerate(
        &self,
        page_size: usize,
        watermark: Option<chrono::DateTime<Utc>>,
    ) -> Result<Vec<ArchiveEntry>> {
        let page_size = page_size.max(1);
        let mut entries = Vec::new();
        let mut seen = HashSet::new();
        let mut offset = 0;
        let mut page_number = 0;

        loop {
            let page = self
                .source
                .list_archive(offset, page_size)
                .await
                .map_err(|e| ArchiveError::SourceUnreachable {
                    target: self.source.target(),
                    reason: format!("archive listing at offset {}: {:#}", offset, e),
                })?;
            if page.fetched == 0 {
                break;
            }
            offset += page.fetched;
            page_number += 1;

            let page_entries = page.entries.len();
            let mut added = 0;
            let mut reached_watermark = false;
            for entry in page.entries {
                if let (Some(w), Some(published)) = (watermark, entry.published_at) {
                    if published <= w {
                        reached_watermark = true;
                        continue;
                    }
                }
                if seen.insert(entry.url.clone()) {
                    entries.push(entry);
                    added += 1;
                }
            }
            self.progress.report(IngestEvent::Listed {
                page: page_number,
                listed: entries.len(),
            });

            if reached_watermark {
                tracing::debug!(offset, "reached last-fetched watermark");
                break;
            }
            if page_entries > 0 && added == 0 {
                tracing::warn!(
                    offset,
                    page = page_number,
                    "archive page repeated only listed entries, stopping pagination"
                );
                break;
            }
        }

        Ok(entries)
    }

    async fn process(&self, entry: &ArchiveEntry, mode: IngestMode) -> Result<ArticleOutcome> {
        let stored = self.store.exists(&entry.url).await?;
        if stored && mode != IngestMode::Refetch {
            return Ok(ArticleOutcome::Skipped);
        }

        let content = match self.source.fetch_article(entry).await {
            Ok(content) => content,
            Err(e) => {
                let err = ArchiveError::PerArticleFetch {
                    url: entry.url.clone(),
                    reason: format!("{:#}", e),
                };
                tracing::warn!("{}", err);
                return Ok(ArticleOutcome::Failed(format!("{:#}", e)));
            }
        };

        let normalized = normalize(self.normalizer, &content.body_html);
        let article = NewArticle {
            title: entry.title.clone(),
            subtitle: entry.subtitle.clone(),
            url: entry.url.clone(),
            published_at: entry.published_at,
            content_html: content.body_html,
            content_text: normalized.text,
            word_count: normalized.word_count,
            audience: entry.audience,
            reaction_count: content.reaction_count.unwrap_or(entry.reaction_count),
            comment_count: content.comment_count.unwrap_or(entry.comment_count),
            reactions: content.reactions.unwrap_or_else(|| entry.reactions.clone()),
            categories: entry.categories.clone(),
            hero_image_url: entry.hero_image_url.clone(),
            fetched_at: Utc::now(),
        };

        let outcome = if stored {
            match self.store.replace_article(&article).await {
                Ok(_) => ArticleOutcome::Updated,
                Err(e) => {
                    tracing::warn!(url = %article.url, error = %e, "failed to update article");
                    ArticleOutcome::Failed(e.to_string())
                }
            }
        } else {
            match self.store.insert_article(&article).await {
                Ok(_) => ArticleOutcome::Saved,
                Err(ArchiveError::Constraint { .. }) => ArticleOutcome::Skipped,
                Err(e) => {
                    tracing::warn!(url = %article.url, error = %e, "failed to store article");
                    ArticleOutcome::Failed(e.to_string())
                }
            }
        };
        Ok(outcome)
    }
}

/// `newsletter ingest`: run the pipeline against the configured publication.
///
/// Ctrl-C ends the run between requests; finished articles stay stored and
/// the watermark is left untouched.
pub async fn run_ingest(
    config: &Config,
    mode: IngestMode,
    progress: ProgressMode,
) -> anyhow::Result<()> {
    let store = ArchiveStore::open(&config.db.path)
        .await
        .with_context(|| format!("Failed to open archive at {}", config.db.path.display()))?;
    let source = SubstackSource::new(
        &config.publication.slug,
        config.publication.base_url.as_deref(),
    )?;
    let normalizer = HtmlNormalizer;
    let reporter = progress.reporter();

    let pipeline = Pipeline::new(&source, &normalizer, &store, reporter.as_ref());
    let options = IngestOptions {
        mode,
        ..Default::default()
    };

    let result = tokio::select! {
        result = pipeline.run(&options) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };
    store.close().await;

    match result {
        Some(result) => {
            result.with_context(|| format!("Ingest of '{}' failed", config.publication.slug))?;
            Ok(())
        }
        None => anyhow::bail!("Ingest interrupted; completed articles were kept"),
    }
}
