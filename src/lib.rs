//! # codeatlas — Code-Intelligence Indexing & Hybrid Search
//!
//! Turns source trees into searchable, graph-connected knowledge: files are
//! parsed into semantic chunks, embedded in two domains, resolved into a
//! dependency graph, and served through a fused lexical + vector search.
//!
//! ## Architecture
//!
//! - **[`config`]** — Configuration loading, validation, and defaults
//! - **[`language`]** — Language detection and artifact-directory exclusion
//! - **[`chunker`]** — Tree-sitter AST chunking with size budget + fixed fallback
//! - **[`extract`]** — Per-language metadata extractors (calls, imports, inheritance)
//! - **[`embedder`]** — Dual-domain embedding (TEXT + CODE) via ONNX Runtime
//! - **[`store`]** — SQLite + sqlite-vec durable store (chunks, graph, errors)
//! - **[`graph`]** — Dependency graph builder and in-memory adjacency index
//! - **[`cache`]** — Tiered read-through cache (in-process, shared, durable)
//! - **[`search`]** — Hybrid search with Reciprocal Rank Fusion
//! - **[`indexer`]** — Pipeline orchestrator and batch reporting

pub mod cache;
pub mod chunker;
pub mod config;
pub mod embedder;
pub mod extract;
pub mod graph;
pub mod indexer;
pub mod language;
pub mod search;
pub mod store;
