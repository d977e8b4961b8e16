//! Sentiment Pipeline - Chat Message Enrichment and Aggregation
//!
//! A Rust library that ingests chat messages, enriches them with
//! investment-sentiment signals from a text-classification oracle, and
//! serves windowed per-protocol statistics.
//!
//! # Features
//!
//! - Eligibility filtering before any remote call
//! - Oracle extraction with a single timeout and typed failures
//! - Idempotent storage keyed by platform message id
//! - On-demand aggregation and a read-only HTTP API

/// Windowed per-protocol statistics
pub mod aggregation;
/// Read-only HTTP API
pub mod api;
/// Configuration management
pub mod config;
/// Database operations and connection pooling
pub mod db;
/// Eligibility filter
pub mod eligibility;
/// Error types
pub mod error;
/// Sentiment extraction client
pub mod extraction;
/// Ingestion orchestrator
pub mod ingest;
/// Per-key async locks
pub mod locks;
/// Logging setup and utilities
pub mod logging;
/// Metrics collection
pub mod metrics;
/// Data models and structures
pub mod models;
/// Classification oracle capability
pub mod oracle;
/// Repository pattern for data access
pub mod repository;
/// Entity resolution for users and channels
pub mod resolver;
/// Database schema definitions
pub mod schema;
/// Idempotent message store
pub mod store;
/// Text helpers
pub mod utils;
/// Input validation and sanitization
pub mod validation;

// Re-export key components for easier access
pub use aggregation::AggregationEngine;
pub use db::Database;
pub use error::{ExtractionFailure, ExtractionFailureKind, PipelineError, SentimentError, StorageError};
pub use ingest::{IngestSummary, Orchestrator, PipelineOutcome};
pub use models::{Channel, Enrichment, InboundEvent, ProtocolStats, StoredMessage, User};
pub use repository::{SentimentRepository, SqliteRepository};
