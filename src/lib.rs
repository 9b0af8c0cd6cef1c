//! # Portfolio Chat
//!
//! A conversational question-answering backend over a small corpus of
//! résumé documents. The model answers as the person the documents describe,
//! grounded in retrieved passages and the last few turns of the session.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐
//! │  PDFs    │──▶│ Change check │──▶│ Vector index │
//! │ (corpus) │   │ chunk+embed  │   │  (SQLite)    │
//! └──────────┘   └──────┬───────┘   └──────┬───────┘
//!                       │ fingerprints     │ top-k
//!                       ▼                  ▼
//!                 ┌───────────┐     ┌──────────────┐     ┌─────┐
//!                 │ KV store  │◀───▶│ Orchestrator │────▶│ LLM │
//!                 │  (Redis)  │     └──────┬───────┘     └─────┘
//!                 └───────────┘            │
//!                 history, cache     ┌─────┴─────┐
//!                                    ▼           ▼
//!                               ┌────────┐  ┌────────┐
//!                               │  HTTP  │  │  CLI   │
//!                               └────────┘  └────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration, environment overrides, validation |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`fingerprint`] | SHA-256 file fingerprints |
//! | [`extract`] | PDF and plain-text extraction |
//! | [`corpus`] | Document discovery and loading |
//! | [`chunk`] | Text chunking |
//! | [`store`] | Key-value store (Redis, in-memory) |
//! | [`change`] | Document change detection |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Vector index build, load, search |
//! | [`indexer`] | Index bootstrap and rebuild lifecycle |
//! | [`conversation`] | Rolling per-session history |
//! | [`cache`] | Optional response cache |
//! | [`prompt`] | Persona prompt rendering |
//! | [`llm`] | Chat model abstraction |
//! | [`orchestrator`] | Query answering |
//! | [`server`] | HTTP API |

pub mod cache;
pub mod change;
pub mod chunk;
pub mod config;
pub mod conversation;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod fingerprint;
pub mod index;
pub mod indexer;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod prompt;
pub mod server;
pub mod store;
