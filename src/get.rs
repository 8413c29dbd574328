//! Article retrieval by id (`newsletter get`).

use anyhow::Result;

use crate::config::Config;
use crate::search::open_query;

/// Print one or more articles (at most five), in the order given.
pub async fn run_get(config: &Config, ids: &[i64]) -> Result<()> {
    let query = open_query(config).await?;
    let articles = query.get_articles_batch(ids).await;
    query.store().close().await;

    for article in articles? {
        println!("--- Article {} ---", article.id);
        println!("title:        {}", article.title);
        if let Some(ref subtitle) = article.subtitle {
            println!("subtitle:     {}", subtitle);
        }
        println!("url:          {}", article.url);
        if let Some(published) = article.published_at {
            println!("published:    {}", published.format("%Y-%m-%d %H:%M"));
        }
        println!("audience:     {}", article.audience);
        println!("words:        {}", article.word_count);
        println!(
            "engagement:   {} reactions, {} comments",
            article.reaction_count, article.comment_count
        );
        if !article.categories.is_empty() {
            println!("categories:   {}", article.categories.join(", "));
        }
        println!();
        println!("{}", article.content_text);
        println!();
    }

    Ok(())
}
