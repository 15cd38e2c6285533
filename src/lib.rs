//! # Match Agent
//!
//! Tracks which player a conversation is about and keeps that player's
//! competitive match history synced locally for analytics questions.
//!
//! ## Architecture
//!
//! - **models**: Core data structures (identities, match records, cursors, results)
//! - **context**: Session-scoped active player and `name#tag` mention parsing
//! - **fetch**: HTTP client for the upstream stats API
//! - **sync**: Incremental match sync with stop-on-known-match and region probing
//! - **storage**: Filesystem storage (JSONL collections)
//! - **calculate**: KDR, averages and rates over stored matches
//! - **config**: Configuration loading and validation
//! - **ingest**: Offline ingestion of saved upstream responses

pub mod calculate;
pub mod config;
pub mod context;
pub mod fetch;
pub mod ingest;
pub mod models;
pub mod storage;
pub mod sync;

pub use models::*;
