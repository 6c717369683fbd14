//! Characterization entry parser: one [`CharacterizationEntry`] per CSV row.
//!
//! The flow identifier is re-derived from the identity columns, so entries can
//! be parsed from a different file than the flows they refer to. Rows with the
//! same identity are all emitted; reconciling them is left to
//! [`super::grouper::merge_factors`].

use std::path::Path;

use super::{collect_rows, IdentityLayout};
use crate::config::ColumnConfig;
use crate::error::{LoadResult, RowError};
use crate::models::{CharacterizationEntry, Parsed, RowPolicy};
use crate::parser::fields::{optional, parse_factor};
use crate::parser::{CsvSource, Row};

/// Lazy sequence of characterization entries over a CSV source.
#[derive(Debug)]
pub struct FactorRows {
    source: CsvSource,
    identity: IdentityLayout,
    factor: (usize, String),
    factor_unit: Option<usize>,
    rows_read: usize,
}

impl FactorRows {
    /// Open a CSV file.
    pub fn open(path: &Path, columns: &ColumnConfig) -> LoadResult<Self> {
        Self::from_source(CsvSource::open(path, columns.delimiter)?, columns)
    }

    /// Read CSV content already in memory.
    pub fn from_bytes(bytes: &[u8], columns: &ColumnConfig) -> LoadResult<Self> {
        Self::from_source(CsvSource::from_bytes(bytes, columns.delimiter)?, columns)
    }

    /// Wrap a source, failing with a schema error if a required column is absent.
    pub fn from_source(source: CsvSource, columns: &ColumnConfig) -> LoadResult<Self> {
        let header = source.header();
        header.require(&columns.factor_columns())?;

        let identity = IdentityLayout::resolve(header, columns)?;
        let factor = header.require(&[columns.factor.as_str()])?[0];
        let factor_unit = header.position(&columns.factor_unit);

        Ok(Self {
            source,
            identity,
            factor: (factor, columns.factor.clone()),
            factor_unit,
            rows_read: 0,
        })
    }

    pub fn source(&self) -> &CsvSource {
        &self.source
    }

    pub fn rows_read(&self) -> usize {
        self.rows_read
    }

    /// Read the remaining rows under `policy`.
    pub fn into_parsed(mut self, policy: RowPolicy) -> LoadResult<Parsed<CharacterizationEntry>> {
        let (records, rejected) = collect_rows(&mut self, policy)?;
        Ok(Parsed {
            records,
            rejected,
            rows_read: self.rows_read,
        })
    }

    fn build(&self, row: &Row) -> Result<CharacterizationEntry, RowError> {
        let identity = self.identity.read(row)?;
        let factor = parse_factor(row.value(self.factor.0), row.line(), &self.factor.1)?;

        Ok(CharacterizationEntry {
            flow: identity.id,
            factor,
            unit: optional(row, self.factor_unit).map(String::from),
        })
    }
}

impl Iterator for FactorRows {
    type Item = Result<CharacterizationEntry, RowError>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = match self.source.next_row()? {
            Ok(row) => row,
            Err(e) => return Some(Err(e)),
        };
        self.rows_read += 1;
        Some(self.build(&row))
    }
}

/// Parse every characterization entry of a CSV file.
pub fn parse_factors(
    path: &Path,
    columns: &ColumnConfig,
    policy: RowPolicy,
) -> LoadResult<Parsed<CharacterizationEntry>> {
    FactorRows::open(path, columns)?.into_parsed(policy)
}

/// Parse every characterization entry of in-memory CSV content.
pub fn parse_factor_bytes(
    bytes: &[u8],
    columns: &ColumnConfig,
    policy: RowPolicy,
) -> LoadResult<Parsed<CharacterizationEntry>> {
    FactorRows::from_bytes(bytes, columns)?.into_parsed(policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoadError;
    use crate::transform::flows::parse_flow_bytes;
    use std::collections::HashSet;

    const SAMPLE: &str = "\
new_database,flow_name,code,unit,CAS number,categories,type,cf,cf_unit
additional_chemical_flows,Acetaminophen,acetaminophen,kg,103-90-2,water::surface water::freshwater,emission,1.23E-05,CTUe
additional_chemical_flows,Ibuprofen,,kg,15687-27-1,water::surface water::freshwater,emission,2.45E-06,
additional_chemical_flows,Aspirin,aspirin,kg,50-78-2,water::groundwater,emission,-3.67E-07,CTUe
";

    fn parse(csv: &str, policy: RowPolicy) -> LoadResult<Parsed<CharacterizationEntry>> {
        parse_factor_bytes(csv.as_bytes(), &ColumnConfig::default(), policy)
    }

    #[test]
    fn test_parse_sample() {
        let parsed = parse(SAMPLE, RowPolicy::Abort).unwrap();
        assert_eq!(parsed.records.len(), 3);
        assert_eq!(parsed.records[0].factor, 1.23e-5);
        assert_eq!(parsed.records[0].unit.as_deref(), Some("CTUe"));
        assert_eq!(parsed.records[1].unit, None);
        assert_eq!(parsed.records[2].factor, -3.67e-7);
    }

    #[test]
    fn test_entries_match_flows() {
        let flows = parse_flow_bytes(SAMPLE.as_bytes(), &ColumnConfig::default(), RowPolicy::Abort)
            .unwrap();
        let entries = parse(SAMPLE, RowPolicy::Abort).unwrap();

        let flow_ids: HashSet<_> = flows.records.iter().map(|f| f.id).collect();
        for entry in &entries.records {
            assert!(flow_ids.contains(&entry.flow));
        }
        for (flow, entry) in flows.records.iter().zip(&entries.records) {
            assert_eq!(flow.id, entry.flow);
        }
    }

    #[test]
    fn test_separate_file_resolves_same_ids() {
        // Factor file without unit, code or CAS columns
        let factors_csv = "\
new_database,flow_name,categories,cf
additional_chemical_flows,Aspirin,water::groundwater,9.9
";
        let flows = parse_flow_bytes(SAMPLE.as_bytes(), &ColumnConfig::default(), RowPolicy::Abort)
            .unwrap();
        let entries = parse(factors_csv, RowPolicy::Abort).unwrap();
        assert_eq!(entries.records[0].flow, flows.records[2].id);
    }

    #[test]
    fn test_missing_factor_column() {
        let csv = "new_database,flow_name,code,unit,CAS number,categories,type\n\
                   db,Test Substance,test_substance,kg,123-45-6,water,emission\n";
        match parse(csv, RowPolicy::Abort).unwrap_err() {
            LoadError::Schema { missing, .. } => assert_eq!(missing, vec!["cf"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_factor_value() {
        let csv = "new_database,flow_name,categories,cf\ndb,Zinc,soil,0.5\ndb,Lead,soil,not_a_number\n";
        match parse(csv, RowPolicy::Abort).unwrap_err() {
            LoadError::Row(RowError::NotANumber { line, column, value }) => {
                assert_eq!(line, 3);
                assert_eq!(column, "cf");
                assert_eq!(value, "not_a_number");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_factor_skipped() {
        let csv = "new_database,flow_name,categories,cf\ndb,Zinc,soil,\ndb,Lead,soil,2\n";
        let parsed = parse(csv, RowPolicy::Skip).unwrap();
        assert_eq!(parsed.records.len(), 1);
        assert!(matches!(parsed.rejected[0], RowError::NotANumber { line: 2, .. }));
    }

    #[test]
    fn test_duplicates_are_all_emitted() {
        let csv = "new_database,flow_name,categories,cf\ndb,Zinc,soil,1\ndb,Zinc,soil,2\n";
        let parsed = parse(csv, RowPolicy::Abort).unwrap();
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.records[0].flow, parsed.records[1].flow);
        assert_eq!(parsed.records[0].factor, 1.0);
        assert_eq!(parsed.records[1].factor, 2.0);
    }

    #[test]
    fn test_numeric_fidelity() {
        let csv = "new_database,flow_name,categories,cf\n\
                   db,A,soil,0.1\n\
                   db,B,soil,123456789.123456789\n\
                   db,C,soil,6.02214076e23\n\
                   db,D,soil,-0\n";
        let parsed = parse(csv, RowPolicy::Abort).unwrap();
        let factors: Vec<f64> = parsed.records.iter().map(|e| e.factor).collect();
        assert_eq!(factors, vec![0.1, 123456789.123456789, 6.02214076e23, -0.0]);
    }

    #[test]
    fn test_end_to_end_skip_scenario() {
        let csv = "\
new_database,flow_name,categories,unit,cf
db,Zinc,soil::agricultural,kg,0.25
db,,soil::agricultural,kg,0.5
db,Lead,soil::agricultural,kg,0.75
";
        let columns = ColumnConfig::default();
        let flows = parse_flow_bytes(csv.as_bytes(), &columns, RowPolicy::Skip).unwrap();
        let entries = parse_factor_bytes(csv.as_bytes(), &columns, RowPolicy::Skip).unwrap();

        assert_eq!(flows.records.len(), 2);
        assert_eq!(entries.records.len(), 2);
        assert_eq!(flows.rejected.len(), 1);
        assert_eq!(
            flows.rejected[0],
            RowError::MissingValue {
                line: 3,
                column: "flow_name".into()
            }
        );
        assert_eq!(entries.rejected, flows.rejected);
    }

    #[test]
    fn test_end_to_end_abort_scenario() {
        let csv = "new_database,flow_name,categories,unit,cf\ndb,Zinc,soil,kg,0.25\ndb,,soil,kg,0.5\n";
        let columns = ColumnConfig::default();
        assert!(parse_flow_bytes(csv.as_bytes(), &columns, RowPolicy::Abort).is_err());
        assert!(parse_factor_bytes(csv.as_bytes(), &columns, RowPolicy::Abort).is_err());
    }
}
