//! Configuration loading.
//!
//! Settings come from an optional TOML file, then environment overrides:
//!
//! | Key | TOML | Environment |
//! |-----|------|-------------|
//! | publication slug | `publication.slug` | `NEWSLETTER_SLUG` |
//! | base URL | `publication.base_url` | `NEWSLETTER_BASE_URL` |
//! | database file | `db.path` | `NEWSLETTER_DB_PATH` |
//! | HTTP bind address | `server.bind` | `NEWSLETTER_BIND` |
//!
//! ```toml
//! [publication]
//! slug = "fieldnotes"
//!
//! [db]
//! path = "./data/fieldnotes.sqlite"
//!
//! [server]
//! bind = "127.0.0.1:7331"
//! ```
//!
//! The slug and database path are required once both layers are applied.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_BIND: &str = "127.0.0.1:7331";

/// Resolved configuration, passed explicitly to every command.
#[derive(Debug, Clone)]
pub struct Config {
    pub publication: PublicationConfig,
    pub db: DbConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone)]
pub struct PublicationConfig {
    pub slug: String,
    /// Overrides `https://{slug}.substack.com`, e.g. for custom domains.
    pub base_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    publication: PublicationSection,
    #[serde(default)]
    db: DbSection,
    #[serde(default)]
    server: ServerSection,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PublicationSection {
    slug: Option<String>,
    base_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DbSection {
    path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ServerSection {
    bind: Option<String>,
}

/// Load `path` (if it exists) and apply environment overrides.
pub fn load_config(path: &Path) -> Result<Config> {
    load_config_with(path, |key| std::env::var(key).ok())
}

/// Same as [`load_config`] with an injectable environment lookup.
pub fn load_config_with<F>(path: &Path, env: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let mut file = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str::<ConfigFile>(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?
    } else {
        tracing::debug!(path = %path.display(), "no config file, using environment only");
        ConfigFile::default()
    };

    let lookup = |key: &str| env(key).filter(|v| !v.trim().is_empty());
    if let Some(slug) = lookup("NEWSLETTER_SLUG") {
        file.publication.slug = Some(slug);
    }
    if let Some(base_url) = lookup("NEWSLETTER_BASE_URL") {
        file.publication.base_url = Some(base_url);
    }
    if let Some(db_path) = lookup("NEWSLETTER_DB_PATH") {
        file.db.path = Some(PathBuf::from(db_path));
    }
    if let Some(bind) = lookup("NEWSLETTER_BIND") {
        file.server.bind = Some(bind);
    }

    let slug = match file.publication.slug {
        Some(s) if !s.trim().is_empty() => s.trim().to_string(),
        _ => bail!(
            "publication slug is not set (publication.slug in {} or NEWSLETTER_SLUG)",
            path.display()
        ),
    };
    let db_path = match file.db.path {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => bail!(
            "database path is not set (db.path in {} or NEWSLETTER_DB_PATH)",
            path.display()
        ),
    };
    if let Some(ref base_url) = file.publication.base_url {
        url::Url::parse(base_url)
            .with_context(|| format!("publication.base_url is not a valid URL: {}", base_url))?;
    }

    Ok(Config {
        publication: PublicationConfig {
            slug,
            base_url: file.publication.base_url,
        },
        db: DbConfig { path: db_path },
        server: ServerConfig {
            bind: file
                .server
                .bind
                .unwrap_or_else(|| DEFAULT_BIND.to_string()),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn file_values_are_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("newsletter.toml");
        std::fs::write(
            &path,
            "[publication]\nslug = \"fieldnotes\"\n[db]\npath = \"./data/a.sqlite\"\n",
        )
        .unwrap();

        let config = load_config_with(&path, env_of(&[])).unwrap();
        assert_eq!(config.publication.slug, "fieldnotes");
        assert_eq!(config.db.path, PathBuf::from("./data/a.sqlite"));
        assert_eq!(config.server.bind, DEFAULT_BIND);
    }

    #[test]
    fn environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("newsletter.toml");
        std::fs::write(
            &path,
            "[publication]\nslug = \"fieldnotes\"\n[db]\npath = \"a.sqlite\"\n",
        )
        .unwrap();

        let config = load_config_with(
            &path,
            env_of(&[("NEWSLETTER_SLUG", "other"), ("NEWSLETTER_BIND", "0.0.0.0:9000")]),
        )
        .unwrap();
        assert_eq!(config.publication.slug, "other");
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.db.path, PathBuf::from("a.sqlite"));
    }

    #[test]
    fn missing_file_uses_environment() {
        let config = load_config_with(
            Path::new("/nonexistent/newsletter.toml"),
            env_of(&[
                ("NEWSLETTER_SLUG", "fieldnotes"),
                ("NEWSLETTER_DB_PATH", "/tmp/x.sqlite"),
            ]),
        )
        .unwrap();
        assert_eq!(config.publication.slug, "fieldnotes");
    }

    #[test]
    fn missing_slug_is_an_error() {
        let err = load_config_with(
            Path::new("/nonexistent/newsletter.toml"),
            env_of(&[("NEWSLETTER_DB_PATH", "/tmp/x.sqlite")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("slug"));
    }

    #[test]
    fn missing_db_path_is_an_error() {
        let err = load_config_with(
            Path::new("/nonexistent/newsletter.toml"),
            env_of(&[("NEWSLETTER_SLUG", "fieldnotes")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("database path"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("newsletter.toml");
        std::fs::write(&path, "[publication]\nslug = \"a\"\nsulg = \"b\"\n").unwrap();
        assert!(load_config_with(&path, env_of(&[])).is_err());
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let err = load_config_with(
            Path::new("/nonexistent/newsletter.toml"),
            env_of(&[
                ("NEWSLETTER_SLUG", "a"),
                ("NEWSLETTER_DB_PATH", "a.sqlite"),
                ("NEWSLETTER_BASE_URL", "not a url"),
            ]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("base_url"));
    }
}
