//! Schema creation.
//!
//! Creates the publication singleton, the article table, the FTS5 index and
//! the triggers that keep the index in lockstep with the table. Every
//! statement is idempotent, so this runs on every startup.

use sqlx::SqlitePool;

use crate::error::Result;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS publication (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            name TEXT NOT NULL,
            slug TEXT NOT NULL,
            url TEXT NOT NULL,
            description TEXT,
            author TEXT,
            last_fetched TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS articles (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            subtitle TEXT,
            url TEXT NOT NULL UNIQUE,
            published_at TEXT,
            content_html TEXT NOT NULL DEFAULT '',
            content_text TEXT NOT NULL DEFAULT '',
            word_count INTEGER NOT NULL DEFAULT 0,
            audience TEXT NOT NULL DEFAULT 'everyone',
            reaction_count INTEGER NOT NULL DEFAULT 0,
            comment_count INTEGER NOT NULL DEFAULT 0,
            reactions_json TEXT NOT NULL DEFAULT '{}',
            categories_json TEXT NOT NULL DEFAULT '[]',
            hero_image_url TEXT,
            fetched_at TEXT NOT NULL,
            search_key TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Archives created before keyword folding lack the column.
    let has_search_key: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM pragma_table_info('articles') WHERE name = 'search_key'",
    )
    .fetch_one(pool)
    .await?;

    if !has_search_key {
        sqlx::query("ALTER TABLE articles ADD COLUMN search_key TEXT NOT NULL DEFAULT ''")
            .execute(pool)
            .await?;
        sqlx::query(
            "UPDATE articles SET search_key = lower(title || char(10) || COALESCE(subtitle, ''))",
        )
        .execute(pool)
        .await?;
    }

    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='articles_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE articles_fts USING fts5(
                title,
                subtitle,
                content_text,
                content='articles',
                content_rowid='id',
                tokenize='unicode61'
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS articles_ai AFTER INSERT ON articles BEGIN
            INSERT INTO articles_fts(rowid, title, subtitle, content_text)
            VALUES (new.id, new.title, new.subtitle, new.content_text);
        END
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS articles_ad AFTER DELETE ON articles BEGIN
            INSERT INTO articles_fts(articles_fts, rowid, title, subtitle, content_text)
            VALUES ('delete', old.id, old.title, old.subtitle, old.content_text);
        END
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS articles_au AFTER UPDATE ON articles BEGIN
            INSERT INTO articles_fts(articles_fts, rowid, title, subtitle, content_text)
            VALUES ('delete', old.id, old.title, old.subtitle, old.content_text);
            INSERT INTO articles_fts(rowid, title, subtitle, content_text)
            VALUES (new.id, new.title, new.subtitle, new.content_text);
        END
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_articles_published_at ON articles(published_at DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_articles_audience ON articles(audience)")
        .execute(pool)
        .await?;

    Ok(())
}
