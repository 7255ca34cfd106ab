//! # LegaLens
//!
//! A local-first legal document clause analyzer.
//!
//! LegaLens splits contracts into clause-level segments, indexes them in
//! SQLite (with optional embeddings), and runs a three-stage analysis
//! pipeline — retrieve, score, summarize — that combines LLM risk
//! assessments with a deterministic keyword rule engine. Results are
//! exposed via a CLI and a JSON HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌──────────┐
//! │  Loader  │──▶│  Segmenter     │──▶│  SQLite   │
//! │ txt/pdf/ │   │ clause splits │   │ segments │
//! │ docx     │   │               │   │ +vectors │
//! └──────────┘   └───────────────┘   └────┬─────┘
//!                                         │
//!                 ┌───────────────────────┤
//!                 ▼                       ▼
//!            ┌──────────┐          ┌──────────┐
//!            │   CLI    │          │   HTTP   │
//!            │  (lens)  │          │  (axum)  │
//!            └──────────┘          └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! lens init                        # create database
//! lens ingest contract.pdf         # segment and index a document
//! lens analyze "what are my termination risks?"
//! lens serve                       # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`loader`] | Decode txt/pdf/docx bytes into plain text |
//! | [`segmenter`] | Split documents at clause boundaries |
//! | [`index`] | SQLite-backed semantic index (cosine or keyword) |
//! | [`embedding`] | Gemini / Ollama embedding providers |
//! | [`rules`] | Deterministic keyword risk rules |
//! | [`scorer`] | Hybrid LLM + rules risk scoring |
//! | [`pipeline`] | Retrieve / score / summarize orchestration |
//! | [`server`] | JSON HTTP API |

pub mod completion;
pub mod config;
pub mod db;
pub mod embedding;
pub mod index;
pub mod ingest;
pub mod loader;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod rules;
pub mod scorer;
pub mod segmenter;
pub mod server;
