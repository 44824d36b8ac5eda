//! # Tome
//!
//! Crawl `llms.txt` documentation sites into a local SQLite index and read
//! them back by path, heading, or full-text query.
//!
//! The crawl, chunking, and retrieval logic lives in [`tome_core`]; this
//! crate supplies the reqwest fetcher, the SQLite store, configuration, and
//! the `tome` CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌──────────────┐
//! │ HttpFetcher  │──▶│ tome_core::crawl │──▶│ SqliteStore  │
//! │  (reqwest)   │   │ chunk + links    │   │ FTS5, gens   │
//! └──────────────┘   └──────────────────┘   └──────┬───────┘
//!                                                  │
//!                                                  ▼
//!                                     tome get / search / toc
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! tome init
//! tome ingest react.dev --max-depth 2
//! tome search react.dev "useState initial value"
//! tome get react.dev INDEX
//! tome toc react.dev /reference/react/useState.md
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`sqlite_store`] | SQLite implementation of the store trait |
//! | [`http`] | reqwest implementation of the fetcher trait |
//! | [`ingest`] | `tome ingest` |
//! | [`get`] | `tome get`, `tome toc` |
//! | [`search`] | `tome search` |
//! | [`stats`] | `tome domains`, `tome cleanup`, `tome forget` |

pub mod config;
pub mod db;
pub mod get;
pub mod http;
pub mod ingest;
pub mod migrate;
pub mod search;
pub mod sqlite_store;
pub mod stats;
