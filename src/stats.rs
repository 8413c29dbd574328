//! Archive statistics and overview (`newsletter stats`, `newsletter info`).
//!
//! Gives a quick read on what has been ingested: article counts, engagement
//! totals, date coverage, and breakdowns by audience tier and year.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::error::ArchiveError;
use crate::models::DateRange;
use crate::progress::format_number;
use crate::search::open_query;

/// Print aggregate statistics.
pub async fn run_stats(config: &Config) -> Result<()> {
    let query = open_query(config).await?;
    let stats = query.stats().await?;
    let indexed = query.store().index_entry_count().await?;
    let last_fetched = query
        .store()
        .publication()
        .await?
        .and_then(|p| p.last_fetched);
    query.store().close().await;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Newsletter Archive Stats");
    println!("========================");
    println!();
    println!("  Database:     {}", config.db.path.display());
    println!("  Size:         {}", format_bytes(db_size));
    println!(
        "  Last fetched: {}",
        last_fetched
            .map(|ts| format_ts_relative(&ts))
            .unwrap_or_else(|| "never".to_string())
    );
    println!();
    println!("  Articles:     {}", format_number(stats.total_articles as u64));
    println!("  Indexed:      {}", format_number(indexed as u64));
    println!("  Reactions:    {}", format_number(stats.total_reactions as u64));
    println!("  Comments:     {}", format_number(stats.total_comments as u64));
    println!("  Avg words:    {}", stats.avg_word_count);
    println!(
        "  Avg per post: {:.1} reactions, {:.1} comments",
        stats.avg_reactions_per_article, stats.avg_comments_per_article
    );
    println!("  Date range:   {}", format_range(&stats.date_range));
    println!(
        "  Access:       {} open, {} restricted",
        format_number(stats.open_articles as u64),
        format_number(stats.restricted_articles as u64)
    );

    if !stats.audience_breakdown.is_empty() {
        println!();
        println!("  By audience:");
        for (tier, n) in &stats.audience_breakdown {
            println!("    {:<12} {:>6}", tier, n);
        }
    }

    if !stats.articles_by_year.is_empty() {
        println!();
        println!("  By year:");
        for (year, n) in &stats.articles_by_year {
            println!("    {:<12} {:>6}", year, n);
        }
    }

    println!();
    Ok(())
}

/// Print publication metadata.
pub async fn run_info(config: &Config) -> Result<()> {
    let query = open_query(config).await?;
    let info = query.newsletter_info().await;
    query.store().close().await;

    let info = match info {
        Ok(info) => info,
        Err(ArchiveError::NotFound(_)) => {
            println!(
                "No publication ingested yet. Run `newsletter ingest` for '{}'.",
                config.publication.slug
            );
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let p = &info.publication;
    println!("name:         {}", p.name);
    println!("slug:         {}", p.slug);
    println!("url:          {}", p.url);
    if let Some(ref author) = p.author {
        println!("author:       {}", author);
    }
    if let Some(ref description) = p.description {
        println!("description:  {}", description);
    }
    println!("articles:     {}", info.total_articles);
    println!("date range:   {}", format_range(&info.date_range));
    println!(
        "engagement:   {} reactions, {} comments",
        info.engagement.total_reactions, info.engagement.total_comments
    );
    println!("avg words:    {}", info.avg_word_count);
    println!(
        "last fetched: {}",
        p.last_fetched
            .map(|ts| ts.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_else(|| "never".to_string())
    );
    Ok(())
}

fn format_range(range: &DateRange) -> String {
    match (range.earliest, range.latest) {
        (Some(a), Some(b)) => format!("{} .. {}", a.format("%Y-%m-%d"), b.format("%Y-%m-%d")),
        _ => "n/a".to_string(),
    }
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Relative time for recent timestamps (e.g. "3 hours ago").
fn format_ts_relative(ts: &DateTime<Utc>) -> String {
    let delta = (Utc::now() - *ts).num_seconds();

    if delta < 0 || delta >= 86400 * 30 {
        return ts.format("%Y-%m-%d %H:%M").to_string();
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    }
}
