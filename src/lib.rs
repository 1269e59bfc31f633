//! # Forum Search
//!
//! In-memory ranked search over forum posts and replies, plus AI answers
//! that only ever cite documents the asking user is allowed to read.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────┐   ┌───────────┐   ┌─────────┐   ┌────────┐
//! │  Store   │──▶│ Corpus  │──▶│  Inverted │──▶│ Ranking │──▶│  HTTP  │
//! │ (SQLite) │   │ builder │   │   index   │   │ engine  │   │  CLI   │
//! └────┬─────┘   └─────────┘   └───────────┘   └────┬────┘   └────────┘
//!      │ access scope, record detail                │
//!      ▼                                            ▼
//! ┌──────────┐                               ┌───────────┐   ┌────────┐
//! │ Augmenter│◀──────────────────────────────│ shortlist │──▶│  LLM   │
//! └──────────┘                               └───────────┘   └────────┘
//! ```
//!
//! The corpus and index of one [`generation::Generation`] never change
//! after construction. A refresh builds a complete new generation and
//! publishes it through [`generation::IndexHandle`].
//!
//! ## Quick Start
//!
//! ```bash
//! fsearch init                              # create the schema
//! fsearch search "winter range" --sort top
//! fsearch ask "where do the elk go?" --user 7
//! fsearch serve                             # start the HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`tokenize`] | Text normalization shared by index and queries |
//! | [`models`] | Source records and search documents |
//! | [`corpus`] | Snapshot → document array |
//! | [`index`] | Term → posting set |
//! | [`search`] | Ranking query engine |
//! | [`snippet`] | Highlighted snippets |
//! | [`generation`] | Immutable generations and their atomic swap |
//! | [`store`] | Storage trait and in-memory store |
//! | [`sqlite_store`] | SQLite storage |
//! | [`augment`] | Access-scoped shortlist and enrichment |
//! | [`llm`] | Language-model capability interface |
//! | [`answer`] | Prompting, output schema and citation resolution |
//! | [`service`] | Everything above behind one type |
//! | [`server`] | HTTP binding |
//! | [`config`] | TOML configuration |
//! | [`error`] | Boundary error taxonomy |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |

pub mod answer;
pub mod augment;
pub mod config;
pub mod corpus;
pub mod db;
pub mod error;
pub mod generation;
pub mod index;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod search;
pub mod server;
pub mod service;
pub mod snippet;
pub mod sqlite_store;
pub mod store;
pub mod tokenize;
