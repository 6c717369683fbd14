//! Domain models for the cfload pipeline.
//!
//! This module contains the record shapes handed to an LCA data library:
//!
//! - [`FlowId`] - Derived identifier linking flows and characterization factors
//! - [`FlowRecord`] - One new elementary flow for a target database
//! - [`CharacterizationEntry`] - One (flow, factor) pair for a method
//! - [`MethodName`] - Hierarchical name of an impact assessment method
//! - [`RowPolicy`] / [`DuplicatePolicy`] - How invalid rows and duplicate flows are handled
//! - [`Parsed`] - Records produced by a parse plus the rows that were rejected

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RowError;

// =============================================================================
// Flow Identifier
// =============================================================================

/// Identifier of a flow, derived from its database, name and category path.
///
/// Always fits in a non-negative `i64`, see [`crate::identity::derive_flow_id`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowId(pub u64);

impl FlowId {
    pub fn as_i64(self) -> i64 {
        // The top bit is cleared at derivation time.
        self.0 as i64
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Flow Record
// =============================================================================

/// A new elementary flow to be inserted into a target database.
///
/// Field names follow the node attributes expected by the LCA data library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRecord {
    /// Derived identifier.
    pub id: FlowId,
    /// Target database name.
    pub database: String,
    /// Flow name.
    pub name: String,
    /// Code, unique within the database.
    pub code: String,
    /// Compartment path, e.g. `["water", "surface water", "freshwater"]`.
    pub categories: Vec<String>,
    /// Unit of measure.
    pub unit: String,
    /// Classification tag, e.g. `emission`.
    #[serde(rename = "type")]
    pub flow_type: String,
    /// CAS registry number, may be empty.
    #[serde(rename = "CAS number", default)]
    pub cas_number: String,
}

impl FlowRecord {
    /// The `(database, code)` key the library stores the node under.
    pub fn key(&self) -> (&str, &str) {
        (&self.database, &self.code)
    }
}

// =============================================================================
// Characterization Entry
// =============================================================================

/// One characterization factor for a method's factor list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterizationEntry {
    /// Identifier of the characterized flow.
    pub flow: FlowId,
    /// Factor value exactly as written in the source, no unit conversion.
    pub factor: f64,
    /// Unit label, documentation only.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub unit: Option<String>,
}

impl CharacterizationEntry {
    /// The `(flow, factor)` pair a method write expects.
    pub fn as_tuple(&self) -> (FlowId, f64) {
        (self.flow, self.factor)
    }
}

// =============================================================================
// Method Name
// =============================================================================

/// Hierarchical method name, e.g. `("ReCiPe 2016", "ecotoxicity", "freshwater")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MethodName(pub Vec<String>);

impl MethodName {
    /// Parse a name written as segments joined by `separator`.
    ///
    /// Returns `None` when no non-blank segment remains.
    pub fn parse(raw: &str, separator: &str) -> Option<Self> {
        let parts: Vec<String> = raw
            .split(separator)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(Self(parts))
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for MethodName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("::"))
    }
}

// =============================================================================
// Policies
// =============================================================================

/// What a parse does with a row that fails validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowPolicy {
    /// Stop at the first invalid row and return no records.
    #[default]
    Abort,
    /// Leave the row out and report it in [`Parsed::rejected`].
    Skip,
}

/// What a method extension does when a flow already has a factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    /// Refuse to write a method with two factors for one flow.
    #[default]
    Reject,
    /// The newest factor for a flow wins.
    Replace,
    /// Keep every factor, duplicates included.
    KeepAll,
}

// =============================================================================
// Parse Outcome
// =============================================================================

/// Records produced by a parse, in row order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Parsed<T> {
    /// One record per valid row.
    pub records: Vec<T>,
    /// Rows left out under [`RowPolicy::Skip`], in row order.
    pub rejected: Vec<RowError>,
    /// Data rows scanned, header excluded.
    pub rows_read: usize,
}

impl<T> Parsed<T> {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
