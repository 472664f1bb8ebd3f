//! # Connie
//!
//! Duplicate-aware document ingestion plus two conversational assistants on
//! top of a vector index.
//!
//! Documents are hashed, chunked and embedded once; re-runs skip anything the
//! ingest log or the index already knows. At chat time the support assistant
//! routes the conversation to a namespace, retrieves context, asks the chat
//! model, and passes the answer through output guardrails before returning
//! it. The companion keeps a short rolling history and optionally draws on
//! retrieved background.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌─────────────┐
//! │  PDF / CSV  │──▶│   Ingestor   │──▶│ VectorIndex │
//! │   files     │   │ hash+chunk+  │   │  Pinecone / │
//! └─────────────┘   │    embed     │   │   memory    │
//!                   └──────────────┘   └──────┬──────┘
//!                                             │
//!                        ┌────────────────────┤
//!                        ▼                    ▼
//!                 ┌─────────────┐      ┌─────────────┐
//!                 │   Support   │      │  Companion  │
//!                 │ route+RAG+  │      │  history +  │
//!                 │  guardrail  │      │  background │
//!                 └──────┬──────┘      └──────┬──────┘
//!                        └──────────┬─────────┘
//!                                   ▼
//!                        ┌────────────────────┐
//!                        │ HTTP (axum) / CLI  │
//!                        └────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! connie ingest pdfs            # index data/docs/**/*.pdf
//! connie namespaces             # check what landed where
//! connie ask "How do I register?"
//! connie serve                  # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Typed pipeline errors |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`models`] | Core data types |
//! | [`chunk`] | Word-window and recursive text chunking |
//! | [`extract`] | PDF and text extraction |
//! | [`csv_source`] | Conversation CSV loading and filtering |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`llm`] | Chat-completion clients |
//! | [`index`] | Vector index abstraction (Pinecone, in-memory) |
//! | [`ingest`] | Deduplicating ingestion pipeline |
//! | [`router`] | Namespace routing |
//! | [`retriever`] | Context retrieval and truncation |
//! | [`guardrail`] | Secret masking and URL verification |
//! | [`format`] | Reply cleanup and formatting |
//! | [`session`] | In-memory conversation sessions |
//! | [`support`] | Support assistant pipeline |
//! | [`companion`] | Companion pipeline |
//! | [`services`] | Provider wiring from config |
//! | [`server`] | HTTP server |
//! | [`admin`] | Index maintenance commands |

pub mod admin;
pub mod chunk;
pub mod companion;
pub mod config;
pub mod csv_source;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod format;
pub mod guardrail;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod models;
pub mod retriever;
pub mod router;
pub mod server;
pub mod services;
pub mod session;
pub mod support;
