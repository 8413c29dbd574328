//! # Newsletter Archive
//!
//! A local, searchable archive of one newsletter publication's posts, served
//! read-only to AI assistants as MCP tools.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌───────────┐
//! │ArchiveSource │──▶│   Pipeline   │──▶│  SQLite   │
//! │  (Substack)  │   │ normalize +  │   │  + FTS5   │
//! │              │   │   dedupe     │   │           │
//! └──────────────┘   └──────────────┘   └─────┬─────┘
//!                                             ▼
//!                                       QueryService
//!                                             │
//!                          ┌──────────────────┤
//!                          ▼                  ▼
//!                    ┌──────────┐       ┌───────────┐
//!                    │   CLI    │       │ MCP tools │
//!                    └──────────┘       └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! newsletter init                    # create database
//! newsletter ingest                  # fetch new posts
//! newsletter fts "walrus migration"  # ranked keyword search
//! newsletter serve mcp               # MCP over stdio
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML + environment configuration |
//! | [`models`] | Core data types |
//! | [`error`] | Error taxonomy |
//! | [`normalize`] | HTML to plain text, word counts |
//! | [`source`] | Archive source trait and Substack client |
//! | [`store`] | SQLite archive store |
//! | [`ingest`] | Ingestion pipeline |
//! | [`progress`] | Ingest progress reporting |
//! | [`query`] | Bounded read-only queries |
//! | [`tools`] | Tool trait and registry |
//! | [`mcp`] | MCP protocol bridge |
//! | [`server`] | stdio and HTTP servers |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod db;
pub mod error;
pub mod get;
pub mod ingest;
pub mod mcp;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod query;
pub mod search;
pub mod server;
pub mod source;
pub mod stats;
pub mod store;
pub mod tools;
