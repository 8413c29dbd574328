//! Tool surface exposed to AI assistants.
//!
//! Each [`Tool`] wraps one read operation of the [`QueryService`]. Tools are
//! collected in a [`ToolRegistry`] that both transports use: the MCP bridge
//! (`tools/list`, `tools/call`) and the HTTP API (`GET /tools/list`,
//! `POST /tools/{name}`).
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              ToolRegistry                │
//! │  get_newsletter_info   search_articles   │
//! │  full_text_search      get_article       │
//! │  get_articles_batch    get_stats         │
//! │  get_top_articles                        │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!          QueryService → ArchiveStore
//! ```
//!
//! Tool names are a stable contract with clients.
//!
//! Responses never include raw HTML; the plain-text body is returned instead.

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::ArchiveError;
use crate::query::{QueryService, SearchParams};
use crate::store::MAX_BATCH;

/// A tool that agents can discover and call.
///
/// [`execute`](Tool::execute) errors that wrap an [`ArchiveError`] keep it
/// reachable through `downcast_ref`, which the transports use to tell a bad
/// request apart from an internal failure.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Stable identifier, used as the route path and MCP tool name.
    fn name(&self) -> &str;

    /// One-line description for agent discovery.
    fn description(&self) -> &str;

    /// JSON Schema of the parameters object.
    fn parameters_schema(&self) -> Value;

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value>;
}

/// Shared state handed to every tool call.
#[derive(Clone)]
pub struct ToolContext {
    query: Arc<QueryService>,
}

impl ToolContext {
    pub fn new(query: Arc<QueryService>) -> Self {
        Self { query }
    }

    pub fn query(&self) -> &QueryService {
        &self.query
    }
}

/// Decode a params object, treating `null` as `{}`.
fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T> {
    let params = if params.is_null() { json!({}) } else { params };
    serde_json::from_value(params)
        .map_err(|e| ArchiveError::InvalidInput(format!("invalid parameters: {}", e)).into())
}

// ============ Built-in tools ============

pub struct NewsletterInfoTool;

#[async_trait]
impl Tool for NewsletterInfoTool {
    fn name(&self) -> &str {
        "get_newsletter_info"
    }

    fn description(&self) -> &str {
        "Get publication metadata and a summary of the archive (article count, date range, engagement)"
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
        let info = ctx.query().newsletter_info().await?;
        Ok(serde_json::to_value(info)?)
    }
}

pub struct SearchArticlesTool;

#[async_trait]
impl Tool for SearchArticlesTool {
    fn name(&self) -> &str {
        "search_articles"
    }

    fn description(&self) -> &str {
        "List articles by title/subtitle keyword, publish date range, and audience tier (metadata only)"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "keyword": { "type": "string", "description": "Case-insensitive substring of title or subtitle" },
                "date_from": { "type": "string", "description": "Published on or after (YYYY-MM-DD)" },
                "date_to": { "type": "string", "description": "Published on or before (YYYY-MM-DD)" },
                "audience": { "type": "string", "enum": ["everyone", "only_free", "only_paid", "founding"] },
                "limit": { "type": "integer", "default": 20, "minimum": 1, "maximum": 50 },
                "offset": { "type": "integer", "default": 0, "minimum": 0 }
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let params: SearchParams = parse_params(params)?;
        let results = ctx.query().search_articles(&params).await?;
        Ok(json!({ "count": results.len(), "results": results }))
    }
}

#[derive(Deserialize)]
struct FullTextParams {
    query: String,
    limit: Option<i64>,
    offset: Option<i64>,
}

pub struct FullTextSearchTool;

#[async_trait]
impl Tool for FullTextSearchTool {
    fn name(&self) -> &str {
        "full_text_search"
    }

    fn description(&self) -> &str {
        "Ranked keyword search over article titles, subtitles and bodies, with highlighted snippets"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Words to search for; all must match" },
                "limit": { "type": "integer", "default": 10, "minimum": 1, "maximum": 25 },
                "offset": { "type": "integer", "default": 0, "minimum": 0 }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let params: FullTextParams = parse_params(params)?;
        let results = ctx
            .query()
            .full_text_search(&params.query, params.limit, params.offset)
            .await?;
        Ok(json!({ "count": results.len(), "results": results }))
    }
}

#[derive(Debug, Deserialize)]
struct GetArticleParams {
    id: i64,
}

pub struct GetArticleTool;

#[async_trait]
impl Tool for GetArticleTool {
    fn name(&self) -> &str {
        "get_article"
    }

    fn description(&self) -> &str {
        "Retrieve one article with its full plain-text body"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": { "type": "integer", "description": "Article id" }
            },
            "required": ["id"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let params: GetArticleParams = parse_params(params)?;
        let article = ctx.query().get_article(params.id).await?;
        Ok(serde_json::to_value(article)?)
    }
}

#[derive(Deserialize)]
struct BatchParams {
    ids: Vec<i64>,
}

pub struct GetArticlesBatchTool;

#[async_trait]
impl Tool for GetArticlesBatchTool {
    fn name(&self) -> &str {
        "get_articles_batch"
    }

    fn description(&self) -> &str {
        "Retrieve up to 5 articles with full plain-text bodies, in request order"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "ids": {
                    "type": "array",
                    "items": { "type": "integer" },
                    "minItems": 1,
                    "maxItems": MAX_BATCH
                }
            },
            "required": ["ids"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let params: BatchParams = parse_params(params)?;
        let articles = ctx.query().get_articles_batch(&params.ids).await?;
        Ok(json!({ "articles": articles }))
    }
}

pub struct StatsTool;

#[async_trait]
impl Tool for StatsTool {
    fn name(&self) -> &str {
        "get_stats"
    }

    fn description(&self) -> &str {
        "Aggregate statistics: totals, averages, date range, counts by audience tier and by year"
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
        let stats = ctx.query().stats().await?;
        Ok(serde_json::to_value(stats)?)
    }
}

fn default_metric() -> String {
    "reactions".to_string()
}

#[derive(Deserialize)]
struct TopParams {
    #[serde(default = "default_metric")]
    metric: String,
    #[serde(alias = "limit")]
    n: Option<i64>,
}

pub struct TopArticlesTool;

#[async_trait]
impl Tool for TopArticlesTool {
    fn name(&self) -> &str {
        "get_top_articles"
    }

    fn description(&self) -> &str {
        "Top articles ranked by reactions, comments, or word count"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "metric": {
                    "type": "string",
                    "enum": ["reactions", "comments", "word_count"],
                    "default": "reactions"
                },
                "n": { "type": "integer", "default": 10, "minimum": 1, "maximum": 25 }
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let params: TopParams = parse_params(params)?;
        let results = ctx.query().top_articles(&params.metric, params.n).await?;
        Ok(json!({ "metric": params.metric, "results": results }))
    }
}

// ============ Registry ============

/// Ordered collection of tools, looked up by name.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Registry with all seven archive tools.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(NewsletterInfoTool));
        registry.register(Box::new(SearchArticlesTool));
        registry.register(Box::new(FullTextSearchTool));
        registry.register(Box::new(GetArticleTool));
        registry.register(Box::new(GetArticlesBatchTool));
        registry.register(Box::new(StatsTool));
        registry.register(Box::new(TopArticlesTool));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_names_are_stable() {
        let registry = ToolRegistry::with_builtins();
        let names: Vec<&str> = registry.tools().iter().map(|t| t.name()).collect();
        assert_eq!(
            names,
            vec![
                "get_newsletter_info",
                "search_articles",
                "full_text_search",
                "get_article",
                "get_articles_batch",
                "get_stats",
                "get_top_articles",
            ]
        );
        for tool in registry.tools() {
            assert_eq!(tool.parameters_schema()["type"], "object");
        }
    }

    #[test]
    fn bad_params_are_invalid_input() {
        let err = parse_params::<GetArticleParams>(json!({ "id": "seven" })).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ArchiveError>(),
            Some(ArchiveError::InvalidInput(_))
        ));
    }

    #[test]
    fn top_params_accept_limit_alias() {
        let params: TopParams = parse_params(json!({ "limit": 3 })).unwrap();
        assert_eq!(params.n, Some(3));
        assert_eq!(params.metric, "reactions");
    }
}
