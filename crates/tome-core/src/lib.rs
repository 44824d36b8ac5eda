//! # Tome Core
//!
//! Runtime-agnostic logic for Tome: markdown heading parsing, the
//! recursive heading-aware chunker, `llms.txt` link discovery, domain
//! normalization, the generation-based crawl orchestrator, the store
//! abstraction, and the retrieval service.
//!
//! This crate contains no tokio, sqlx, reqwest, or filesystem I/O. The
//! crawler is generic over a [`fetch::Fetcher`] and a [`store::Store`],
//! so the application crate supplies the HTTP client and the database.
//!
//! ## Pipeline
//!
//! ```text
//! llms.txt ──▶ Fetcher ──▶ links ──▶ more fetches (same domain, ≤ max_depth)
//!                 │
//!                 ▼
//!              chunk ──▶ flatten ──▶ Store (generation N, inactive)
//!                                       │
//!                        crawl done ──▶ activate N, deactivate N-1
//!                                       │
//!                                       ▼
//!                                   service: get / search / toc
//! ```

pub mod chunk;
pub mod crawl;
pub mod domain;
pub mod fetch;
pub mod headings;
pub mod links;
pub mod models;
pub mod service;
pub mod store;
