//! Flow parser: one [`FlowRecord`] per CSV row.
//!
//! ```rust,ignore
//! use cfload::{parse_flows, ColumnConfig, RowPolicy};
//!
//! let parsed = parse_flows("new_flows.csv".as_ref(), &ColumnConfig::default(), RowPolicy::Skip)?;
//! for flow in &parsed.records {
//!     println!("{} {} -> {}", flow.database, flow.name, flow.id);
//! }
//! ```

use std::path::Path;

use super::{collect_rows, IdentityLayout};
use crate::config::ColumnConfig;
use crate::error::{LoadResult, RowError};
use crate::models::{FlowRecord, Parsed, RowPolicy};
use crate::parser::fields::{optional, required, sanitize_code};
use crate::parser::{CsvSource, Row};

/// Lazy sequence of flow records over a CSV source.
///
/// Opening validates the header; each `next` reads one more row. Re-opening the
/// same file restarts the sequence.
#[derive(Debug)]
pub struct FlowRows {
    source: CsvSource,
    identity: IdentityLayout,
    unit: (usize, String),
    code: Option<usize>,
    cas_number: Option<usize>,
    flow_type: Option<usize>,
    default_flow_type: String,
    rows_read: usize,
}

impl FlowRows {
    /// Open a CSV file.
    pub fn open(path: &Path, columns: &ColumnConfig) -> LoadResult<Self> {
        Self::from_source(CsvSource::open(path, columns.delimiter)?, columns)
    }

    /// Read CSV content already in memory, e.g. an upload.
    pub fn from_bytes(bytes: &[u8], columns: &ColumnConfig) -> LoadResult<Self> {
        Self::from_source(CsvSource::from_bytes(bytes, columns.delimiter)?, columns)
    }

    /// Wrap a source, failing with a schema error if a required column is absent.
    pub fn from_source(source: CsvSource, columns: &ColumnConfig) -> LoadResult<Self> {
        let header = source.header();
        header.require(&columns.flow_columns())?;

        let identity = IdentityLayout::resolve(header, columns)?;
        let unit = header.require(&[columns.unit.as_str()])?[0];
        let code = header.position(&columns.code);
        let cas_number = header.position(&columns.cas_number);
        let flow_type = header.position(&columns.flow_type);

        Ok(Self {
            source,
            identity,
            unit: (unit, columns.unit.clone()),
            code,
            cas_number,
            flow_type,
            default_flow_type: columns.default_flow_type.clone(),
            rows_read: 0,
        })
    }

    pub fn source(&self) -> &CsvSource {
        &self.source
    }

    /// Data rows consumed so far, header and blank lines excluded.
    pub fn rows_read(&self) -> usize {
        self.rows_read
    }

    /// Read the remaining rows under `policy`.
    pub fn into_parsed(mut self, policy: RowPolicy) -> LoadResult<Parsed<FlowRecord>> {
        let (records, rejected) = collect_rows(&mut self, policy)?;
        Ok(Parsed {
            records,
            rejected,
            rows_read: self.rows_read,
        })
    }

    fn build(&self, row: &Row) -> Result<FlowRecord, RowError> {
        let identity = self.identity.read(row)?;
        let unit = required(row, self.unit.0, &self.unit.1)?.to_string();

        let code = optional(row, self.code)
            .map(String::from)
            .unwrap_or_else(|| sanitize_code(&identity.name));
        let flow_type = optional(row, self.flow_type)
            .unwrap_or(self.default_flow_type.as_str())
            .to_string();
        let cas_number = optional(row, self.cas_number).unwrap_or("").to_string();

        Ok(FlowRecord {
            id: identity.id,
            database: identity.database,
            name: identity.name,
            code,
            categories: identity.categories,
            unit,
            flow_type,
            cas_number,
        })
    }
}

impl Iterator for FlowRows {
    type Item = Result<FlowRecord, RowError>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = match self.source.next_row()? {
            Ok(row) => row,
            Err(e) => return Some(Err(e)),
        };
        self.rows_read += 1;
        Some(self.build(&row))
    }
}

/// Parse every flow of a CSV file.
pub fn parse_flows(
    path: &Path,
    columns: &ColumnConfig,
    policy: RowPolicy,
) -> LoadResult<Parsed<FlowRecord>> {
    FlowRows::open(path, columns)?.into_parsed(policy)
}

/// Parse every flow of in-memory CSV content.
pub fn parse_flow_bytes(
    bytes: &[u8],
    columns: &ColumnConfig,
    policy: RowPolicy,
) -> LoadResult<Parsed<FlowRecord>> {
    FlowRows::from_bytes(bytes, columns)?.into_parsed(policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoadError;
    use crate::identity::derive_flow_id;
    use std::fs;
    use tempfile::tempdir;

    const HEADER: &str = "new_database,flow_name,code,unit,CAS number,categories,type,cf";

    const SAMPLE: &str = "\
new_database,flow_name,code,unit,CAS number,categories,type,cf
additional_chemical_flows,Acetaminophen,acetaminophen,kg,103-90-2,water::surface water::freshwater,emission,1.23E-05
additional_chemical_flows,Ibuprofen,,kg,15687-27-1,water::surface water::freshwater,emission,2.45E-06
additional_chemical_flows,Aspirin,aspirin,kg,50-78-2,water::groundwater,emission,3.67E-07
additional_chemical_flows,Metformin,,kg,657-24-9,water::surface water::freshwater,emission,4.89E-06
";

    fn parse(csv: &str, policy: RowPolicy) -> LoadResult<Parsed<FlowRecord>> {
        parse_flow_bytes(csv.as_bytes(), &ColumnConfig::default(), policy)
    }

    #[test]
    fn test_parse_sample() {
        let parsed = parse(SAMPLE, RowPolicy::Abort).unwrap();
        assert_eq!(parsed.records.len(), 4);
        assert_eq!(parsed.rows_read, 4);
        assert!(parsed.is_clean());

        let first = &parsed.records[0];
        assert_eq!(first.database, "additional_chemical_flows");
        assert_eq!(first.name, "Acetaminophen");
        assert_eq!(first.code, "acetaminophen");
        assert_eq!(first.unit, "kg");
        assert_eq!(first.cas_number, "103-90-2");
        assert_eq!(first.categories, vec!["water", "surface water", "freshwater"]);
        assert_eq!(first.flow_type, "emission");
        assert_eq!(
            first.id,
            derive_flow_id(
                "additional_chemical_flows",
                "Acetaminophen",
                &["water", "surface water", "freshwater"]
            )
        );

        // Empty code falls back to the flow name
        assert_eq!(parsed.records[1].code, "Ibuprofen");
    }

    #[test]
    fn test_code_sanitization_when_empty() {
        let csv = format!(
            "{HEADER}\ndb,Test Substance With Spaces,,kg,,water::surface water,emission,1.0E-05\n"
        );
        let parsed = parse(&csv, RowPolicy::Abort).unwrap();
        assert_eq!(parsed.records[0].code, "Test_Substance_With_Spaces");
        assert_eq!(parsed.records[0].cas_number, "");
    }

    #[test]
    fn test_minimal_columns_use_defaults() {
        let csv = "new_database,flow_name,categories,unit\ndb,Zinc,soil::agricultural,kg\n";
        let parsed = parse(csv, RowPolicy::Abort).unwrap();
        let flow = &parsed.records[0];
        assert_eq!(flow.code, "Zinc");
        assert_eq!(flow.flow_type, "emission");
        assert_eq!(flow.cas_number, "");
    }

    #[test]
    fn test_missing_required_column_is_schema_error() {
        let csv = "new_database,flow_name,categories\ndb,Zinc,soil\n";
        match parse(csv, RowPolicy::Skip).unwrap_err() {
            LoadError::Schema { missing, .. } => assert_eq!(missing, vec!["unit"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_factor_column_not_required_for_flows() {
        let csv = "new_database,flow_name,categories,unit\ndb,Zinc,soil,kg\n";
        assert!(parse(csv, RowPolicy::Abort).is_ok());
    }

    #[test]
    fn test_blank_name_aborts() {
        let csv = format!("{HEADER}\ndb,Zinc,,kg,,soil,emission,1\ndb,,,kg,,soil,emission,1\n");
        match parse(&csv, RowPolicy::Abort).unwrap_err() {
            LoadError::Row(RowError::MissingValue { line, column }) => {
                assert_eq!(line, 3);
                assert_eq!(column, "flow_name");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_skip_policy_preserves_valid_rows() {
        let csv = format!(
            "{HEADER}\ndb,Zinc,,kg,,soil,emission,1\ndb,Lead,,,,soil,emission,1\ndb,Copper,,kg,,soil,emission,1\n"
        );
        let parsed = parse(&csv, RowPolicy::Skip).unwrap();
        assert_eq!(parsed.rows_read, 3);
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.rejected.len(), 1);
        assert_eq!(parsed.rejected[0].line(), 3);
        assert_eq!(parsed.rejected[0].column(), "unit");
    }

    #[test]
    fn test_invalid_factor_does_not_affect_flows() {
        let csv = format!("{HEADER}\ndb,Zinc,,kg,,soil,emission,not_a_number\n");
        assert_eq!(parse(&csv, RowPolicy::Abort).unwrap().records.len(), 1);
    }

    #[test]
    fn test_lazy_iteration_stops_when_dropped() {
        let mut rows = FlowRows::from_bytes(SAMPLE.as_bytes(), &ColumnConfig::default()).unwrap();
        let first = rows.next().unwrap().unwrap();
        assert_eq!(first.name, "Acetaminophen");
        assert_eq!(rows.rows_read(), 1);
    }

    #[test]
    fn test_reparse_is_identical() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("flows.csv");
        fs::write(&path, SAMPLE).unwrap();

        let columns = ColumnConfig::default();
        let first = parse_flows(&path, &columns, RowPolicy::Abort).unwrap();
        let second = parse_flows(&path, &columns, RowPolicy::Abort).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first.records).unwrap(),
            serde_json::to_string(&second.records).unwrap()
        );
    }

    #[test]
    fn test_missing_file() {
        let err = parse_flows(
            Path::new("nonexistent_file.csv"),
            &ColumnConfig::default(),
            RowPolicy::Abort,
        )
        .unwrap_err();
        assert!(matches!(err, LoadError::FileAccess { .. }));
    }

    #[test]
    fn test_custom_columns() {
        let columns = ColumnConfig {
            database: "db".into(),
            name: "substance".into(),
            categories: vec!["compartment".into(), "subcompartment".into()],
            ..ColumnConfig::default()
        };
        let csv = "db;substance;compartment;subcompartment;unit\nbio;Nickel;soil;industrial;kg\n";
        let parsed = parse_flow_bytes(csv.as_bytes(), &columns, RowPolicy::Abort).unwrap();
        assert_eq!(parsed.records[0].categories, vec!["soil", "industrial"]);
        assert_eq!(parsed.records[0].name, "Nickel");
    }
}
