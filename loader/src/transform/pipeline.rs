//! High-level load pipeline: CSV to database flows and method factors.
//!
//! Steps:
//! 1. Parse flows (and characterization entries, from the same or another file)
//! 2. Drop entries whose flow row was rejected
//! 3. Validate records against the embedded schemas, and check that no two
//!    flows claim the same `(database, code)` key
//! 4. Merge the entries into the method's existing factor list
//! 5. Write one flow batch per database, then the method
//!
//! # Example
//!
//! ```rust,ignore
//! use cfload::{load_csv, LoadOptions, LocalStore, MethodName};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut store = LocalStore::new(".cfload");
//!     let options = LoadOptions {
//!         method: MethodName::parse("ReCiPe 2016::ecotoxicity", "::"),
//!         ..LoadOptions::new("new_flows.csv")
//!     };
//!     let report = load_csv(&options, &mut store).await?;
//!     println!("{} flows written", report.flows_written);
//!     Ok(())
//! }
//! ```

use std::collections::HashSet;
use std::path::PathBuf;

use serde::Serialize;

use super::factors::parse_factors;
use super::flows::parse_flows;
use super::grouper::{conflicting_keys, group_by_database, merge_factors};
use crate::api::logs::{log_error, log_info, log_info_indent, log_success, log_warning, log_warning_indent};
use crate::config::ColumnConfig;
use crate::error::{PipelineError, PipelineResult, RowError};
use crate::models::{DuplicatePolicy, FlowId, MethodName, RowPolicy};
use crate::sink::RecordSink;
use crate::validation::{validate_factors, validate_flows};

/// Number of individual errors printed per step.
const MAX_LOGGED_ERRORS: usize = 5;

/// Options for [`load_csv`].
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// CSV file with the flows.
    pub input: PathBuf,
    /// CSV file with the factors; defaults to `input`.
    pub factors: Option<PathBuf>,
    /// Method receiving the factors. Without one only flows are written.
    pub method: Option<MethodName>,
    /// Unit recorded on the method.
    pub method_unit: Option<String>,
    pub columns: ColumnConfig,
    pub row_policy: RowPolicy,
    pub duplicates: DuplicatePolicy,
    pub skip_validation: bool,
    /// Parse, validate and merge without writing.
    pub dry_run: bool,
}

impl LoadOptions {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            factors: None,
            method: None,
            method_unit: None,
            columns: ColumnConfig::default(),
            row_policy: RowPolicy::default(),
            duplicates: DuplicatePolicy::default(),
            skip_validation: false,
            dry_run: false,
        }
    }
}

/// Flows written to one database.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseReport {
    pub name: String,
    pub flows: usize,
}

/// Outcome of [`load_csv`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadReport {
    /// Data rows read from the flow file.
    pub rows_read: usize,
    pub databases: Vec<DatabaseReport>,
    pub flows_written: usize,
    pub method: Option<String>,
    /// Incoming entries merged into the method.
    pub factors_written: usize,
    /// Size of the method's factor list after the merge.
    pub method_size: usize,
    /// Entries dropped because their flow row was rejected.
    pub orphaned_factors: usize,
    /// Rows rejected under the skip policy, flow and factor parses combined.
    pub rejected: Vec<RowError>,
    pub dry_run: bool,
}

/// Run the full load against `sink`.
///
/// Nothing is written if parsing, validation, the key check or the duplicate
/// check fails.
pub async fn load_csv<S: RecordSink>(options: &LoadOptions, sink: &mut S) -> PipelineResult<LoadReport> {
    options.columns.check()?;

    // Step 1: flows
    log_info(format!("📖 Reading flows from {}", options.input.display()));
    let flows = parse_flows(&options.input, &options.columns, options.row_policy)?;
    log_success(format!("{} flows from {} rows", flows.records.len(), flows.rows_read));
    log_rejected(&flows.rejected);

    if flows.records.is_empty() {
        log_error("No valid flow rows");
        return Err(PipelineError::EmptyInput);
    }

    let mut rejected = flows.rejected.clone();

    // Step 2: characterization entries
    let mut entries = Vec::new();
    let mut orphaned_factors = 0;
    if let Some(method) = &options.method {
        let path = options.factors.as_ref().unwrap_or(&options.input);
        log_info(format!("📖 Reading factors for {method} from {}", path.display()));
        let parsed = parse_factors(path, &options.columns, options.row_policy)?;
        log_success(format!("{} factors", parsed.records.len()));

        if options.factors.is_some() {
            log_rejected(&parsed.rejected);
            rejected.extend(parsed.rejected);
            entries = parsed.records;
        } else {
            // Same file: a row rejected by the flow parse must not leave a factor behind
            let known: HashSet<FlowId> = flows.records.iter().map(|f| f.id).collect();
            let total = parsed.records.len();
            entries = parsed
                .records
                .into_iter()
                .filter(|e| known.contains(&e.flow))
                .collect();
            orphaned_factors = total - entries.len();
            if orphaned_factors > 0 {
                log_warning(format!("{orphaned_factors} factors dropped, their flow row was rejected"));
            }

            let seen: HashSet<u64> = rejected.iter().map(RowError::line).collect();
            rejected.extend(parsed.rejected.into_iter().filter(|e| !seen.contains(&e.line())));
        }
    }

    // Step 3: validation
    if options.skip_validation {
        log_info("(validation skipped)");
    } else {
        log_info("✔️  Validating records...");
        check_valid("flows", validate_flows(&flows.records))?;
        check_valid("factors", validate_factors(&entries))?;
        log_success("All records valid");
    }

    let conflicts = conflicting_keys(&flows.records);
    if !conflicts.is_empty() {
        log_error(format!("{} codes used by more than one flow", conflicts.len()));
        for (database, code) in conflicts.iter().take(MAX_LOGGED_ERRORS) {
            log_warning_indent(format!("{database}/{code}"), 1);
        }
        return Err(PipelineError::KeyConflicts(conflicts));
    }

    // Step 4: merge into the method's factor list
    let merged = match &options.method {
        Some(method) => {
            let existing = sink.load_method(method).await?;
            log_info(format!("Method {method} has {} factors", existing.len()));
            let merged = merge_factors(existing, entries.clone(), options.duplicates).map_err(|ids| {
                log_error(format!("{} flows would get a second factor", ids.len()));
                PipelineError::Duplicates(ids)
            })?;
            Some((method, merged))
        }
        None => None,
    };

    // Step 5: writes
    let grouped = group_by_database(flows.records);
    let databases: Vec<DatabaseReport> = grouped
        .iter()
        .map(|(name, flows)| DatabaseReport {
            name: name.clone(),
            flows: flows.len(),
        })
        .collect();
    let flows_written = databases.iter().map(|d| d.flows).sum();

    if options.dry_run {
        log_warning("Dry run, nothing written");
    } else {
        for (database, batch) in &grouped {
            sink.write_database(database, batch).await?;
            log_success(format!("{} flows written to {database}", batch.len()));
        }
        if let Some((method, factors)) = &merged {
            sink.write_method(method, factors, options.method_unit.as_deref()).await?;
            log_success(format!("{} factors in {method}", factors.len()));
        }
    }

    Ok(LoadReport {
        rows_read: flows.rows_read,
        databases,
        flows_written,
        method: merged.as_ref().map(|(m, _)| m.to_string()),
        factors_written: entries.len(),
        method_size: merged.as_ref().map_or(0, |(_, f)| f.len()),
        orphaned_factors,
        rejected,
        dry_run: options.dry_run,
    })
}

fn log_rejected(rejected: &[RowError]) {
    if rejected.is_empty() {
        return;
    }
    log_warning(format!("{} rows skipped", rejected.len()));
    for error in rejected.iter().take(MAX_LOGGED_ERRORS) {
        log_warning_indent(error.to_string(), 1);
    }
    if rejected.len() > MAX_LOGGED_ERRORS {
        log_info_indent(format!("... +{}", rejected.len() - MAX_LOGGED_ERRORS), 1);
    }
}

fn check_valid(what: &str, errors: Vec<(usize, Vec<String>)>) -> PipelineResult<()> {
    if errors.is_empty() {
        return Ok(());
    }
    log_error(format!("{} {what} failed validation", errors.len()));
    for (index, messages) in errors.iter().take(MAX_LOGGED_ERRORS) {
        log_warning_indent(format!("#{index}: {}", messages.join(", ")), 1);
    }
    Err(PipelineError::Validation {
        count: errors.len(),
        errors,
    })
}
