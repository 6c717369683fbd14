//! Cell-level interpretation shared by the flow and factor parsers.

use super::Row;
use crate::error::RowError;

/// Value of a required column, or [`RowError::MissingValue`] when blank.
pub fn required<'r>(row: &'r Row, index: usize, column: &str) -> Result<&'r str, RowError> {
    let value = row.value(index);
    if value.is_empty() {
        return Err(RowError::MissingValue {
            line: row.line(),
            column: column.to_string(),
        });
    }
    Ok(value)
}

/// Value of an optional column; absent columns and blank cells read as `None`.
pub fn optional(row: &Row, index: Option<usize>) -> Option<&str> {
    index.map(|i| row.value(i)).filter(|v| !v.is_empty())
}

/// Split one category cell into trimmed, non-empty segments.
///
/// A blank cell yields no segments. A non-blank cell made only of separators
/// and whitespace is malformed.
pub fn split_categories(
    raw: &str,
    separator: &str,
    line: u64,
    column: &str,
) -> Result<Vec<String>, RowError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }

    let parts: Vec<String> = raw
        .split(separator)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(String::from)
        .collect();

    if parts.is_empty() {
        return Err(RowError::Malformed {
            line,
            column: column.to_string(),
            message: format!("no category between '{separator}' separators"),
        });
    }

    Ok(parts)
}

/// Category path of a row, concatenating every category column in order.
///
/// `columns` pairs each column index with its header name. The path must not
/// be empty.
pub fn category_path(
    row: &Row,
    columns: &[(usize, String)],
    separator: &str,
) -> Result<Vec<String>, RowError> {
    let mut path = Vec::new();
    for (index, name) in columns {
        path.extend(split_categories(row.value(*index), separator, row.line(), name)?);
    }

    if path.is_empty() {
        let column = columns
            .iter()
            .map(|(_, name)| name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(RowError::MissingValue {
            line: row.line(),
            column,
        });
    }

    Ok(path)
}

/// Code derived from a flow name: trimmed, spaces replaced by underscores.
pub fn sanitize_code(name: &str) -> String {
    name.trim().replace(' ', "_")
}

/// Parse a characterization factor.
///
/// Accepts the CSV's native `.` decimal separator and exponent notation.
/// Blank, non-numeric and non-finite values are rejected.
pub fn parse_factor(raw: &str, line: u64, column: &str) -> Result<f64, RowError> {
    let not_a_number = || RowError::NotANumber {
        line,
        column: column.to_string(),
        value: raw.to_string(),
    };

    let value: f64 = raw.trim().parse().map_err(|_| not_a_number())?;
    if !value.is_finite() {
        return Err(not_a_number());
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::CsvSource;

    fn first_row(csv: &str) -> Row {
        let mut source = CsvSource::from_bytes(csv.as_bytes(), None).unwrap();
        source.next_row().unwrap().unwrap()
    }

    #[test]
    fn test_split_categories() {
        let parts = split_categories(" air :: low urban :: population ", "::", 2, "categories").unwrap();
        assert_eq!(parts, vec!["air", "low urban", "population"]);
    }

    #[test]
    fn test_split_blank_categories() {
        assert!(split_categories("  ", "::", 2, "categories").unwrap().is_empty());
    }

    #[test]
    fn test_split_only_separators_is_malformed() {
        let err = split_categories(":: ::", "::", 9, "categories").unwrap_err();
        assert!(matches!(err, RowError::Malformed { line: 9, .. }));
    }

    #[test]
    fn test_category_path_across_columns() {
        let row = first_row("compartment,subcompartment\nwater,surface water::freshwater");
        let columns = vec![(0, "compartment".to_string()), (1, "subcompartment".to_string())];
        let path = category_path(&row, &columns, "::").unwrap();
        assert_eq!(path, vec!["water", "surface water", "freshwater"]);
    }

    #[test]
    fn test_empty_category_path_is_missing() {
        let row = first_row("name,categories\nCO2,");
        let err = category_path(&row, &[(1, "categories".to_string())], "::").unwrap_err();
        assert_eq!(
            err,
            RowError::MissingValue {
                line: 2,
                column: "categories".into()
            }
        );
    }

    #[test]
    fn test_sanitize_code() {
        assert_eq!(sanitize_code(" Test Substance With Spaces "), "Test_Substance_With_Spaces");
        assert_eq!(sanitize_code("Ibuprofen"), "Ibuprofen");
    }

    #[test]
    fn test_parse_factor_exponent() {
        assert_eq!(parse_factor("1.23E-05", 2, "cf").unwrap(), 1.23e-5);
        assert_eq!(parse_factor(" -4.5 ", 2, "cf").unwrap(), -4.5);
    }

    #[test]
    fn test_parse_factor_rejects_comma_decimal() {
        assert!(parse_factor("1,5", 3, "cf").is_err());
    }

    #[test]
    fn test_parse_factor_rejects_non_finite() {
        for raw in ["inf", "-inf", "NaN", "", "not_a_number"] {
            let err = parse_factor(raw, 4, "cf").unwrap_err();
            assert_eq!(err.line(), 4);
            assert_eq!(err.column(), "cf");
        }
    }

    #[test]
    fn test_required_and_optional() {
        let row = first_row("a,b,c\nx,,z");
        assert_eq!(required(&row, 0, "a").unwrap(), "x");
        assert!(required(&row, 1, "b").is_err());
        assert_eq!(optional(&row, Some(2)), Some("z"));
        assert_eq!(optional(&row, Some(1)), None);
        assert_eq!(optional(&row, None), None);
    }
}
