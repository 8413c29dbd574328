use axum::extract::{Path as UrlPath, Query};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn newsletter_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("newsletter");
    path
}

// ============ Fake publication ============

fn archive_posts() -> Vec<serde_json::Value> {
    vec![
        json!({
            "type": "newsletter", "slug": "gulls", "title": "On Gulls",
            "subtitle": "Thieves of the boardwalk", "post_date": "2024-03-09T08:00:00.000Z",
            "audience": "everyone", "reaction_count": 40, "comment_count": 1,
            "publication": { "name": "Shoreline", "hero_text": "Coastal notes" },
            "publishedBylines": [{ "name": "A. Tern" }]
        }),
        json!({
            "type": "podcast", "slug": "episode-1", "title": "Episode 1",
            "post_date": "2024-03-07T08:00:00.000Z"
        }),
        json!({
            "type": "newsletter", "slug": "kelp", "title": "On Kelp",
            "post_date": "2024-03-05T08:00:00.000Z", "audience": "only_paid",
            "reaction_count": 10, "comment_count": 9, "postTags": [{ "name": "ecology" }]
        }),
        json!({
            "type": "newsletter", "slug": "broken", "title": "Broken Post",
            "post_date": "2024-03-01T08:00:00.000Z"
        }),
    ]
}

async fn archive(Query(q): Query<HashMap<String, String>>) -> Json<Vec<serde_json::Value>> {
    let offset: usize = q.get("offset").and_then(|v| v.parse().ok()).unwrap_or(0);
    let limit: usize = q.get("limit").and_then(|v| v.parse().ok()).unwrap_or(12);
    Json(archive_posts().into_iter().skip(offset).take(limit).collect())
}

async fn post(UrlPath(slug): UrlPath<String>) -> Response {
    let body = match slug.as_str() {
        "gulls" => "<p>Gulls steal chips.</p><p>They also steal sandwiches.</p>",
        "kelp" => "<h2>Forests</h2><p>Kelp grows fast in cold water.</p>",
        _ => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };
    Json(json!({ "body_html": body })).into_response()
}

/// Serve a fake publication on an ephemeral port; returns its base URL.
fn spawn_fake_publication() -> String {
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async move {
            let app = Router::new()
                .route("/api/v1/archive", get(archive))
                .route("/api/v1/posts/{slug}", get(post));
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            tx.send(listener.local_addr().unwrap()).unwrap();
            axum::serve(listener, app).await.unwrap();
        });
    });
    format!("http://{}", rx.recv().unwrap())
}

// ============ Harness ============

fn setup_test_env(base_url: Option<&str>) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let mut config_content = format!(
        r#"[publication]
slug = "shoreline"
{}
[db]
path = "{}/data/archive.sqlite"

[server]
bind = "127.0.0.1:7331"
"#,
        base_url
            .map(|u| format!("base_url = \"{}\"\n", u))
            .unwrap_or_default(),
        root.display()
    );
    config_content.push('\n');

    let config_path = config_dir.join("newsletter.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn command(config_path: &Path) -> Command {
    let mut cmd = Command::new(newsletter_binary());
    cmd.arg("--config")
        .arg(config_path)
        .env_remove("NEWSLETTER_SLUG")
        .env_remove("NEWSLETTER_DB_PATH")
        .env_remove("NEWSLETTER_BASE_URL")
        .env_remove("NEWSLETTER_BIND")
        .env_remove("RUST_LOG");
    cmd
}

fn run_newsletter(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = command(config_path)
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run newsletter binary: {}", e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn ingested_env() -> (TempDir, PathBuf, String) {
    let base = spawn_fake_publication();
    let (tmp, config_path) = setup_test_env(Some(&base));
    let (stdout, stderr, success) = run_newsletter(&config_path, &["ingest"]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    (tmp, config_path, stdout)
}

// ============ init / config ============

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env(None);

    let (stdout, stderr, success) = run_newsletter(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/archive.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env(None);

    let (_, _, first) = run_newsletter(&config_path, &["init"]);
    assert!(first, "First init failed");
    let (_, stderr, second) = run_newsletter(&config_path, &["init"]);
    assert!(second, "Second init failed (not idempotent): {}", stderr);
}

#[test]
fn test_missing_config_reports_slug() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope.toml");

    let (_, stderr, success) = run_newsletter(&missing, &["init"]);
    assert!(!success);
    assert!(stderr.contains("slug"), "stderr: {}", stderr);
}

#[test]
fn test_environment_only_config() {
    let tmp = TempDir::new().unwrap();
    let db = tmp.path().join("env.sqlite");

    let output = command(&tmp.path().join("nope.toml"))
        .env("NEWSLETTER_SLUG", "shoreline")
        .env("NEWSLETTER_DB_PATH", &db)
        .arg("init")
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(db.exists());
}

#[test]
fn test_info_before_ingest() {
    let (_tmp, config_path) = setup_test_env(None);
    run_newsletter(&config_path, &["init"]);
    let (stdout, _, success) = run_newsletter(&config_path, &["info"]);
    assert!(success);
    assert!(stdout.contains("No publication ingested yet"));
}

#[test]
fn test_read_commands_never_create_the_database() {
    let (tmp, config_path) = setup_test_env(None);
    let db = tmp.path().join("data/archive.sqlite");

    for args in [&["stats"][..], &["info"], &["fts", "gulls"], &["get", "1"]] {
        let (_, stderr, success) = run_newsletter(&config_path, args);
        assert!(!success, "{:?} succeeded without an archive", args);
        assert!(stderr.contains("newsletter init"), "stderr: {}", stderr);
    }
    assert!(!db.exists());
}

// ============ ingest ============

#[test]
fn test_ingest_progress_lines() {
    let (_tmp, _config_path, stdout) = ingested_env();
    let lines: Vec<&str> = stdout.lines().collect();

    assert!(lines[0].starts_with("Connecting to http://127.0.0.1:"));
    assert!(lines[0].ends_with("... OK"));
    assert_eq!(lines[1], "Fetching article archive... page 1, 3 articles so far");
    assert_eq!(lines[2], "Fetching article archive... found 3 articles");
    assert_eq!(lines[3], "[  1/  3] \"On Gulls\" (2024-03-09)... saved");
    assert_eq!(lines[4], "[  2/  3] \"On Kelp\" (2024-03-05)... saved");
    assert!(lines[5].starts_with("[  3/  3] \"Broken Post\" (2024-03-01)... failed: HTTP 500"));
    assert_eq!(lines[6], "Done: 2 saved, 0 updated, 0 skipped, 1 failed");
}

#[test]
fn test_ingest_full_rerun_skips_stored() {
    let (_tmp, config_path, _) = ingested_env();

    let (stdout, stderr, success) = run_newsletter(&config_path, &["ingest", "--full"]);
    assert!(success, "rerun failed: {}", stderr);
    assert!(stdout.contains("\"On Gulls\" (2024-03-09)... already exists, skipped"));
    assert!(stdout.contains("Done: 0 saved, 0 updated, 2 skipped, 1 failed"));
}

#[test]
fn test_ingest_unreachable_source_fails() {
    // nothing listens on port 9 on loopback
    let (_tmp, config_path) = setup_test_env(Some("http://127.0.0.1:9"));

    let (stdout, stderr, success) = run_newsletter(&config_path, &["ingest"]);
    assert!(!success);
    assert!(stdout.contains("... FAILED"), "stdout: {}", stdout);
    assert!(stderr.contains("source unreachable"), "stderr: {}", stderr);
}

#[test]
fn test_ingest_json_progress() {
    let base = spawn_fake_publication();
    let (_tmp, config_path) = setup_test_env(Some(&base));

    let (stdout, stderr, success) =
        run_newsletter(&config_path, &["ingest", "--progress", "json"]);
    assert!(success, "ingest failed: {}", stderr);

    let events: Vec<serde_json::Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(events[0]["event"], "connected");
    assert_eq!(events[1]["event"], "listed");
    assert_eq!(events[2]["total"], 3);
    let done = events.last().unwrap();
    assert_eq!(done["event"], "done");
    assert_eq!(done["saved"], 2);
    assert_eq!(done["failed"], 1);
}

// ============ read commands ============

#[test]
fn test_read_commands_over_ingested_archive() {
    let (_tmp, config_path, _) = ingested_env();

    let (stdout, _, success) = run_newsletter(&config_path, &["search", "--audience", "only_paid"]);
    assert!(success);
    assert!(stdout.contains("On Kelp"));
    assert!(!stdout.contains("On Gulls"));

    let (stdout, _, success) = run_newsletter(&config_path, &["fts", "sandwiches"]);
    assert!(success);
    assert!(stdout.contains("On Gulls"));
    assert!(stdout.contains("<b>sandwiches</b>"));

    let (stdout, _, success) = run_newsletter(&config_path, &["fts", "nonexistentword"]);
    assert!(success);
    assert!(stdout.contains("No results."));

    let (stdout, _, success) = run_newsletter(&config_path, &["top", "--metric", "comments", "-n", "1"]);
    assert!(success);
    assert!(stdout.contains("On Kelp"));

    let (stdout, _, success) = run_newsletter(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Articles:     2"));
    assert!(stdout.contains("Indexed:      2"));
    assert!(stdout.contains("Access:       1 open, 1 restricted"));
    assert!(stdout.starts_with("Newsletter Archive Stats\n"));

    let (stdout, _, success) = run_newsletter(&config_path, &["info"]);
    assert!(success);
    assert!(stdout.contains("Shoreline"));
    assert!(stdout.contains("A. Tern"));
}

#[test]
fn test_get_prints_plain_text() {
    let (_tmp, config_path, _) = ingested_env();

    let (stdout, stderr, success) = run_newsletter(&config_path, &["get", "1"]);
    assert!(success, "get failed: {}", stderr);
    assert!(stdout.contains("Gulls steal chips.\n\nThey also steal sandwiches."));
    assert!(!stdout.contains("<p>"));
}

#[test]
fn test_get_rejects_more_than_five() {
    let (_tmp, config_path) = setup_test_env(None);
    run_newsletter(&config_path, &["init"]);

    let (_, stderr, success) = run_newsletter(&config_path, &["get", "1", "2", "3", "4", "5", "6"]);
    assert!(!success);
    assert!(stderr.contains("too many articles requested"), "stderr: {}", stderr);
}

#[test]
fn test_search_bad_date() {
    let (_tmp, config_path) = setup_test_env(None);
    run_newsletter(&config_path, &["init"]);
    let (_, stderr, success) = run_newsletter(&config_path, &["search", "--from", "yesterday"]);
    assert!(!success);
    assert!(stderr.contains("YYYY-MM-DD"), "stderr: {}", stderr);
}
