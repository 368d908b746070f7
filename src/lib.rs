//! # Cairn
//!
//! A local-first hybrid retrieval engine.
//!
//! Cairn ingests documents into named, isolated collections ("scopes"),
//! builds a per-scope vector index and a scoped knowledge graph, and answers
//! questions by fusing vector search, keyword-driven graph lookup, and an
//! LLM synthesis step with conversation memory.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐   ┌──────────────────────┐   ┌───────────────────┐
//! │ raw/<scope>/  │──▶│ Ingestion pipeline    │──▶│ SQLite             │
//! │ pdf docx md   │   │ dedup → chunk →       │   │ chunks + vectors   │
//! │ txt           │   │ embed → triples       │   │ entities+relations │
//! └───────────────┘   └──────────────────────┘   └─────────┬─────────┘
//!                                                          │
//!                               question ──▶ rewrite ──▶ vector search
//!                                              │              │
//!                                              ▼              ▼
//!                                        graph lookup ◀── keywords
//!                                              │
//!                                              ▼
//!                                     LLM synthesis (+ history)
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types |
//! | [`dedup`] | Content fingerprinting and the ingestion ledger |
//! | [`loader`] | Format-dispatched document loading |
//! | [`chunk`] | Sliding-window text chunking |
//! | [`llm`] | Language-model HTTP client (generate + chat) |
//! | [`embedding`] | Embedding backends and vector utilities |
//! | [`vector`] | Per-scope vector index build and search |
//! | [`triples`] | LLM-driven triple extraction |
//! | [`graph`] | Scoped knowledge-graph store |
//! | [`keywords`] | Term-frequency keyword extraction |
//! | [`ingest`] | Three-stage ingestion orchestration |
//! | [`retrieve`] | Hybrid question answering |
//! | [`scopes`] | Scope listing and deletion |

pub mod chunk;
pub mod config;
pub mod db;
pub mod dedup;
pub mod embedding;
pub mod graph;
pub mod ingest;
pub mod keywords;
pub mod llm;
pub mod loader;
pub mod migrate;
pub mod models;
pub mod retrieve;
pub mod scopes;
pub mod triples;
pub mod vector;
