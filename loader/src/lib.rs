//! # cfload - New elementary flows and characterization factors from CSV
//!
//! cfload reads CSV files describing new elementary flows and their
//! characterization factors, and turns them into the records an LCA data
//! library needs: one flow per row for a target database, and one
//! `(flow, factor)` entry per row for an impact assessment method.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   CSV File  │────▶│   Parser    │────▶│  Flows +    │────▶│    Sink     │
//! │  (ISO/UTF8) │     │  (auto-enc) │     │  Factors    │     │ (local/http)│
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//!                                          shared FlowId
//! ```
//!
//! Both parsers derive the same [`FlowId`] from `(database, name, categories)`,
//! so a factor always points at the flow produced from the same row.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cfload::{parse_factors, parse_flows, ColumnConfig, RowPolicy};
//!
//! let columns = ColumnConfig::default();
//! let flows = parse_flows("new_flows.csv".as_ref(), &columns, RowPolicy::Abort)?;
//! let factors = parse_factors("new_flows.csv".as_ref(), &columns, RowPolicy::Abort)?;
//! assert_eq!(flows.records[0].id, factors.records[0].flow);
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`config`] - Column configuration and environment settings
//! - [`models`] - Flow records, characterization entries, policies
//! - [`identity`] - Flow identifier derivation
//! - [`parser`] - CSV decoding and row access
//! - [`transform`] - Flow and factor parsers, grouping, pipeline
//! - [`validation`] - JSON schema and CAS number validation
//! - [`sink`] - Local and remote record stores
//! - [`api`] - HTTP API server

// Core modules
pub mod config;
pub mod error;
pub mod identity;
pub mod models;

// Parsing
pub mod parser;

// Transformation
pub mod transform;

// Validation
pub mod validation;

// Stores
pub mod sink;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError, LoadError, PipelineError, RowError, ServerError, SinkError,
};

// =============================================================================
// Re-exports - Configuration
// =============================================================================

pub use config::{ColumnConfig, Settings};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use identity::derive_flow_id;
pub use models::{
    CharacterizationEntry, DuplicatePolicy, FlowId, FlowRecord, MethodName, Parsed, RowPolicy,
};

// =============================================================================
// Re-exports - CSV Parsing
// =============================================================================

pub use parser::{decode_content, detect_delimiter, detect_encoding, CsvSource};

// =============================================================================
// Re-exports - Parsers and Grouping
// =============================================================================

pub use transform::{
    conflicting_keys, duplicate_flows, group_by_database, merge_factors, parse_factor_bytes, parse_factors,
    parse_flow_bytes, parse_flows, FactorRows, FlowRows,
};

// =============================================================================
// Re-exports - Validation
// =============================================================================

pub use validation::{
    is_valid, is_valid_cas, validate, validate_characterization_entry, validate_factors,
    validate_flow_record, validate_flows,
};

// =============================================================================
// Re-exports - Sinks
// =============================================================================

pub use sink::{LocalStore, RecordSink, RemoteSink, StoredDatabase, StoredMethod};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::{load_csv, DatabaseReport, LoadOptions, LoadReport};

// =============================================================================
// Re-exports - API
// =============================================================================

pub use api::types::{error_response, CsvMetadata, ParseResponse};

// Server
pub mod server {
    pub use crate::api::server::{router, start_server};
}
