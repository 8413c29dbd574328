//! Ingest progress reporting.
//!
//! The pipeline emits an [`IngestEvent`] at each step so the operator can see
//! what is being fetched and what happened to each article. Human output goes
//! to **stdout** as the primary output of `newsletter ingest`; JSON mode emits
//! one object per line on stdout for scripts. Diagnostics stay on stderr via
//! `tracing`.

use std::io::Write;

use crate::ingest::{ArticleOutcome, IngestSummary};

/// A single progress event for an ingest run.
#[derive(Clone, Debug)]
pub enum IngestEvent {
    /// Publication resolved.
    Connected { url: String },
    /// Publication could not be resolved; the run ends.
    ConnectFailed { url: String, reason: String },
    /// One archive page listed; `listed` entries kept so far.
    Listed { page: usize, listed: usize },
    /// Listing complete; `total` entries will be processed.
    Discovered { total: usize },
    /// One article processed (1-based `index`).
    Article {
        index: usize,
        total: usize,
        title: String,
        /// `YYYY-MM-DD`, empty when the platform gave no date.
        date: String,
        outcome: ArticleOutcome,
    },
    /// Run finished.
    Finished(IngestSummary),
}

/// Receives ingest events. Called from the pipeline, one event at a time.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: IngestEvent);
}

/// Human-readable progress lines on stdout.
pub struct ConsoleProgress;

impl ConsoleProgress {
    fn render(event: &IngestEvent) -> String {
        match event {
            IngestEvent::Connected { url } => format!("Connecting to {}... OK", url),
            IngestEvent::ConnectFailed { url, reason } => {
                format!("Connecting to {}... FAILED\n  {}", url, reason)
            }
            IngestEvent::Listed { page, listed } => format!(
                "Fetching article archive... page {}, {} articles so far",
                page,
                format_number(*listed as u64)
            ),
            IngestEvent::Discovered { total } => format!(
                "Fetching article archive... found {} articles",
                format_number(*total as u64)
            ),
            IngestEvent::Article {
                index,
                total,
                title,
                date,
                outcome,
            } => {
                let width = total.to_string().len();
                format!(
                    "[{:>width$}/{:>width$}] \"{}\" ({})... {}",
                    index,
                    total,
                    title,
                    date,
                    outcome.label(),
                    width = width.max(3)
                )
            }
            IngestEvent::Finished(s) => format!(
                "Done: {} saved, {} updated, {} skipped, {} failed",
                s.saved, s.updated, s.skipped, s.failed
            ),
        }
    }
}

impl ProgressReporter for ConsoleProgress {
    fn report(&self, event: IngestEvent) {
        let line = Self::render(&event);
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{}", line);
        let _ = out.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stdout.
pub struct JsonProgress;

impl JsonProgress {
    fn to_json(event: &IngestEvent) -> serde_json::Value {
        match event {
            IngestEvent::Connected { url } => serde_json::json!({
                "event": "connected",
                "url": url
            }),
            IngestEvent::ConnectFailed { url, reason } => serde_json::json!({
                "event": "connect_failed",
                "url": url,
                "reason": reason
            }),
            IngestEvent::Listed { page, listed } => serde_json::json!({
                "event": "listed",
                "page": page,
                "listed": listed
            }),
            IngestEvent::Discovered { total } => serde_json::json!({
                "event": "discovered",
                "total": total
            }),
            IngestEvent::Article {
                index,
                total,
                title,
                date,
                outcome,
            } => {
                let mut obj = serde_json::json!({
                    "event": "article",
                    "n": index,
                    "total": total,
                    "title": title,
                    "date": date,
                    "outcome": outcome.kind(),
                });
                if let ArticleOutcome::Failed(reason) = outcome {
                    obj["reason"] = serde_json::Value::String(reason.clone());
                }
                obj
            }
            IngestEvent::Finished(s) => serde_json::json!({
                "event": "done",
                "discovered": s.discovered,
                "saved": s.saved,
                "updated": s.updated,
                "skipped": s.skipped,
                "failed": s.failed
            }),
        }
    }
}

impl ProgressReporter for JsonProgress {
    fn report(&self, event: IngestEvent) {
        if let Ok(line) = serde_json::to_string(&Self::to_json(&event)) {
            let mut out = std::io::stdout().lock();
            let _ = writeln!(out, "{}", line);
            let _ = out.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: IngestEvent) {}
}

/// Insert thousands separators: `1234567` → `1,234,567`.
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub enum ProgressMode {
    Off,
    #[default]
    Human,
    Json,
}

impl std::str::FromStr for ProgressMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" | "none" => Ok(ProgressMode::Off),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            other => Err(format!(
                "unknown progress mode '{}'. Must be human, json, or off",
                other
            )),
        }
    }
}

impl ProgressMode {
    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(ConsoleProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
