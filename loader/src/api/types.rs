//! REST API types.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::RowError;
use crate::models::{Parsed, RowPolicy};
use crate::parser::CsvSource;

/// Query string of the parse endpoints.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ParseQuery {
    #[serde(default)]
    pub policy: RowPolicy,
}

/// Response to a parse upload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseResponse<T> {
    /// Unique job identifier
    pub job_id: String,
    /// "ready" when every row produced a record, "warning" otherwise
    pub status: String,
    pub records: Vec<T>,
    pub rejected: Vec<RowError>,
    pub metadata: CsvMetadata,
}

/// CSV file metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvMetadata {
    pub file_name: Option<String>,
    pub encoding: String,
    pub delimiter: String,
    pub columns: Vec<String>,
    pub row_count: usize,
}

impl CsvMetadata {
    /// Metadata of `source`; `row_count` is filled in once the rows are read.
    pub fn from_source(source: &CsvSource, file_name: Option<String>) -> Self {
        Self {
            file_name,
            encoding: source.encoding().to_string(),
            delimiter: format_delimiter(source.delimiter()),
            columns: source.header().names().to_vec(),
            row_count: 0,
        }
    }
}

impl<T> ParseResponse<T> {
    pub fn new(parsed: Parsed<T>, mut metadata: CsvMetadata) -> Self {
        metadata.row_count = parsed.rows_read;
        Self {
            job_id: Uuid::new_v4().to_string(),
            status: if parsed.is_clean() { "ready" } else { "warning" }.to_string(),
            records: parsed.records,
            rejected: parsed.rejected,
            metadata,
        }
    }
}

/// Delimiter for display
pub fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "TAB".to_string(),
        c => c.to_string(),
    }
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "jobId": Uuid::new_v4().to_string(),
        "status": "error",
        "error": error,
        "records": [],
        "rejected": [],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CharacterizationEntry, FlowId};

    #[test]
    fn test_response_status_and_metadata() {
        let source = CsvSource::from_bytes(b"new_database;flow_name;categories;cf\n", None).unwrap();
        let metadata = CsvMetadata::from_source(&source, Some("cf.csv".into()));
        assert_eq!(metadata.delimiter, ";");
        assert_eq!(metadata.columns.len(), 4);

        let parsed = Parsed {
            records: vec![CharacterizationEntry {
                flow: FlowId(1),
                factor: 1.0,
                unit: None,
            }],
            rejected: vec![RowError::MissingValue {
                line: 3,
                column: "cf".into(),
            }],
            rows_read: 2,
        };
        let response = ParseResponse::new(parsed, metadata);
        assert_eq!(response.status, "warning");
        assert_eq!(response.metadata.row_count, 2);

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["rejected"][0]["kind"], "missingValue");
        assert_eq!(json["rejected"][0]["line"], 3);
        assert_eq!(json["metadata"]["fileName"], "cf.csv");
    }

    #[test]
    fn test_format_delimiter() {
        assert_eq!(format_delimiter('\t'), "TAB");
        assert_eq!(format_delimiter(';'), ";");
        assert_eq!(format_delimiter('#'), "#");
    }

    #[test]
    fn test_error_response() {
        let body = error_response("No file provided");
        assert_eq!(body["status"], "error");
        assert_eq!(body["error"], "No file provided");
    }

    #[test]
    fn test_policy_query_default() {
        let query: ParseQuery = serde_json::from_value(json!({})).unwrap();
        assert_eq!(query.policy, RowPolicy::Abort);
        let query: ParseQuery = serde_json::from_value(json!({ "policy": "skip" })).unwrap();
        assert_eq!(query.policy, RowPolicy::Skip);
    }
}
