//! Transformation module.
//!
//! This module turns CSV rows into records for an LCA data library:
//! - Flows: one flow record per row
//! - Factors: one characterization entry per row
//! - Grouper: per-database grouping and method factor merging
//! - Pipeline: parse, validate, and write through a sink

pub mod factors;
pub mod flows;
pub mod grouper;
pub mod pipeline;

pub use factors::{parse_factor_bytes, parse_factors, FactorRows};
pub use flows::{parse_flow_bytes, parse_flows, FlowRows};
pub use grouper::{conflicting_keys, duplicate_flows, group_by_database, merge_factors};
pub use pipeline::{load_csv, DatabaseReport, LoadOptions, LoadReport};

use crate::config::ColumnConfig;
use crate::error::{LoadResult, RowError};
use crate::identity::derive_flow_id;
use crate::models::{FlowId, RowPolicy};
use crate::parser::fields::{category_path, required};
use crate::parser::{Header, Row};

/// Positions of the columns that define a flow's identity.
#[derive(Debug, Clone)]
struct IdentityLayout {
    database: (usize, String),
    name: (usize, String),
    categories: Vec<(usize, String)>,
    separator: String,
}

/// Identity columns of one row.
#[derive(Debug, Clone)]
struct Identity {
    id: FlowId,
    database: String,
    name: String,
    categories: Vec<String>,
}

impl IdentityLayout {
    /// Resolve against `header`, which must already hold every required column.
    fn resolve(header: &Header, columns: &ColumnConfig) -> LoadResult<Self> {
        let database = header.require(&[columns.database.as_str()])?[0];
        let name = header.require(&[columns.name.as_str()])?[0];
        let mut categories = Vec::with_capacity(columns.categories.len());
        for column in &columns.categories {
            let index = header.require(&[column.as_str()])?[0];
            categories.push((index, column.clone()));
        }

        Ok(Self {
            database: (database, columns.database.clone()),
            name: (name, columns.name.clone()),
            categories,
            separator: columns.category_separator.clone(),
        })
    }

    fn read(&self, row: &Row) -> Result<Identity, RowError> {
        let database = required(row, self.database.0, &self.database.1)?.to_string();
        let name = required(row, self.name.0, &self.name.1)?.to_string();
        let categories = category_path(row, &self.categories, &self.separator)?;
        let id = derive_flow_id(&database, &name, &categories);

        Ok(Identity {
            id,
            database,
            name,
            categories,
        })
    }
}

/// Drain `rows` under `policy`.
///
/// Under [`RowPolicy::Abort`] the first invalid row fails the whole parse.
fn collect_rows<T, I>(rows: I, policy: RowPolicy) -> LoadResult<(Vec<T>, Vec<RowError>)>
where
    I: Iterator<Item = Result<T, RowError>>,
{
    let mut records = Vec::new();
    let mut rejected = Vec::new();

    for row in rows {
        match (row, policy) {
            (Ok(record), _) => records.push(record),
            (Err(error), RowPolicy::Abort) => return Err(error.into()),
            (Err(error), RowPolicy::Skip) => rejected.push(error),
        }
    }

    Ok((records, rejected))
}
