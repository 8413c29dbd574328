//! Search commands: `newsletter search`, `newsletter fts`, `newsletter top`.
//!
//! Thin printers over the [`QueryService`]; the same bounds apply here as
//! for tool calls.

use anyhow::{Context, Result};

use crate::config::Config;
use crate::models::ArticleSummary;
use crate::query::{QueryService, SearchParams};
use crate::store::ArchiveStore;

pub(crate) async fn open_query(config: &Config) -> Result<QueryService> {
    let store = ArchiveStore::open_read_only(&config.db.path)
        .await
        .with_context(|| format!("Failed to open archive at {}", config.db.path.display()))?;
    Ok(QueryService::new(store))
}

fn date_of(a: &ArticleSummary) -> String {
    a.published_at
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "----------".to_string())
}

fn print_summaries(results: &[ArticleSummary]) {
    for a in results {
        println!("{:>5}  {}  {}", a.id, date_of(a), a.title);
        if let Some(ref subtitle) = a.subtitle {
            println!("       {}", subtitle);
        }
        println!(
            "       {} words, {} reactions, {} comments, {}",
            a.word_count, a.reaction_count, a.comment_count, a.audience
        );
        println!("       {}", a.url);
        println!();
    }
}

/// Metadata listing with filters.
pub async fn run_search(config: &Config, params: SearchParams) -> Result<()> {
    let query = open_query(config).await?;
    let results = query.search_articles(&params).await?;
    query.store().close().await;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }
    print_summaries(&results);
    Ok(())
}

/// Ranked full-text search with snippets.
pub async fn run_fts(config: &Config, text: &str, limit: Option<i64>) -> Result<()> {
    let query = open_query(config).await?;
    let hits = query.full_text_search(text, limit, None).await?;
    query.store().close().await;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        let date = hit
            .published_at
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        println!("{}. [{:.2}] {}", i + 1, hit.score, hit.title);
        println!("    published: {}", date);
        println!("    url: {}", hit.url);
        println!("    excerpt: \"{}\"", hit.snippet.replace('\n', " ").trim());
        println!("    id: {}", hit.id);
        println!();
    }
    Ok(())
}

/// Top articles by an engagement metric.
pub async fn run_top(config: &Config, metric: &str, n: Option<i64>) -> Result<()> {
    let query = open_query(config).await?;
    let results = query.top_articles(metric, n).await?;
    query.store().close().await;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }
    print_summaries(&results);
    Ok(())
}
