//! CSV source with encoding and delimiter auto-detection.
//!
//! A file is read in one scoped call, decoded to text, and then scanned row by
//! row with the `csv` crate. No LCA-specific logic lives here; cell-level
//! interpretation is in [`fields`].

pub mod fields;

use std::io::Cursor;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};

use crate::error::{LoadError, LoadResult, RowError};

/// Delimiters tried by [`detect_delimiter`], in order of preference.
const CANDIDATE_DELIMITERS: [char; 4] = [',', ';', '\t', '|'];

/// Column reported for errors that concern the whole record.
const RECORD_COLUMN: &str = "<record>";

/// Read a whole file, mapping failures to [`LoadError::FileAccess`].
///
/// The handle is closed before this returns.
pub fn read_file(path: &Path) -> LoadResult<Vec<u8>> {
    std::fs::read(path).map_err(|source| LoadError::FileAccess {
        path: path.to_path_buf(),
        source,
    })
}

/// Detect the encoding of raw bytes.
///
/// Valid UTF-8 is taken as UTF-8; anything else is handed to chardet.
pub fn detect_encoding(bytes: &[u8]) -> String {
    if std::str::from_utf8(bytes).is_ok() {
        return "utf-8".to_string();
    }

    let charset = chardet::detect(bytes).0;

    // Normalize charset names
    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        "" => "windows-1252".to_string(),
        other => other.to_string(),
    }
}

/// Decode bytes to a string using the specified encoding label.
///
/// A leading byte order mark is removed. Unknown labels fall back to
/// Windows-1252, which maps every byte.
pub fn decode_content(bytes: &[u8], encoding: &str) -> LoadResult<String> {
    if encoding.eq_ignore_ascii_case("utf-8") || encoding.eq_ignore_ascii_case("utf8") {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| LoadError::Encoding(format!("invalid UTF-8: {e}")))?;
        return Ok(text.trim_start_matches('\u{feff}').to_string());
    }

    let codec = encoding_rs::Encoding::for_label(encoding.as_bytes())
        .unwrap_or(encoding_rs::WINDOWS_1252);
    let (text, _, had_errors) = codec.decode(bytes);
    if had_errors {
        return Err(LoadError::Encoding(format!(
            "content is not valid {}",
            codec.name()
        )));
    }
    Ok(text.trim_start_matches('\u{feff}').to_string())
}

/// Detect the delimiter by counting occurrences in the first line.
///
/// Falls back to `,` when the first line holds none of the candidates.
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let mut best_sep = CANDIDATE_DELIMITERS[0];
    let mut best_count = 0;

    for &sep in &CANDIDATE_DELIMITERS {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

// =============================================================================
// Rows
// =============================================================================

/// One data row with its physical line number.
#[derive(Debug, Clone)]
pub struct Row {
    line: u64,
    record: StringRecord,
}

impl Row {
    pub fn line(&self) -> u64 {
        self.line
    }

    /// Trimmed value at `index`; short rows read as blank.
    pub fn value(&self, index: usize) -> &str {
        self.record.get(index).unwrap_or("")
    }

    /// Whether every cell is empty, e.g. a line of bare delimiters.
    pub fn is_blank(&self) -> bool {
        self.record.iter().all(str::is_empty)
    }
}

// =============================================================================
// Header
// =============================================================================

/// Header names of a CSV source.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    names: Vec<String>,
}

impl Header {
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Position of the first column named `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Positions of `required`, or a [`LoadError::Schema`] naming every absent one.
    pub fn require(&self, required: &[&str]) -> LoadResult<Vec<usize>> {
        let missing: Vec<String> = required
            .iter()
            .filter(|name| self.position(name).is_none())
            .map(|name| name.to_string())
            .collect();

        if !missing.is_empty() {
            return Err(LoadError::Schema {
                required: required.iter().map(|s| s.to_string()).collect(),
                missing,
            });
        }

        Ok(required
            .iter()
            .filter_map(|name| self.position(name))
            .collect())
    }
}

// =============================================================================
// CSV Source
// =============================================================================

/// A decoded CSV document scanned one row at a time.
pub struct CsvSource {
    reader: csv::Reader<Cursor<String>>,
    header: Header,
    encoding: String,
    delimiter: char,
    lines: LineCursor,
    done: bool,
}

/// Incremental byte offset to line number mapping.
#[derive(Debug, Clone, Copy)]
struct LineCursor {
    byte: usize,
    line: u64,
}

impl LineCursor {
    /// Line of the first non-newline byte at or after `byte`.
    ///
    /// Offsets must be visited in increasing order.
    fn advance(&mut self, content: &[u8], byte: u64) -> u64 {
        let mut start = (byte as usize).min(content.len());
        while start < content.len() && matches!(content[start], b'\n' | b'\r') {
            start += 1;
        }
        if start > self.byte {
            self.line += content[self.byte..start]
                .iter()
                .filter(|&&b| b == b'\n')
                .count() as u64;
            self.byte = start;
        }
        self.line
    }
}

impl std::fmt::Debug for CsvSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvSource")
            .field("header", &self.header)
            .field("encoding", &self.encoding)
            .field("delimiter", &self.delimiter)
            .finish()
    }
}

impl CsvSource {
    /// Open a file with auto-detection of encoding and, unless given, delimiter.
    pub fn open(path: &Path, delimiter: Option<char>) -> LoadResult<Self> {
        let bytes = read_file(path)?;
        Self::from_bytes(&bytes, delimiter)
    }

    /// Same as [`CsvSource::open`] over bytes already in memory.
    pub fn from_bytes(bytes: &[u8], delimiter: Option<char>) -> LoadResult<Self> {
        let encoding = detect_encoding(bytes);
        let content = decode_content(bytes, &encoding)?;
        let delimiter = delimiter.unwrap_or_else(|| detect_delimiter(&content));
        Self::from_text(content, encoding, delimiter)
    }

    fn from_text(content: String, encoding: String, delimiter: char) -> LoadResult<Self> {
        let delimiter_byte = u8::try_from(delimiter)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| {
                LoadError::Encoding(format!("delimiter {delimiter:?} is not an ASCII character"))
            })?;

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .delimiter(delimiter_byte)
            .from_reader(Cursor::new(content));

        let names = reader
            .headers()
            .map_err(|e| LoadError::Encoding(format!("cannot read header: {e}")))?
            .iter()
            .map(|name| name.trim_matches('\u{feff}').trim().to_string())
            .collect();

        Ok(Self {
            reader,
            header: Header { names },
            encoding,
            delimiter,
            lines: LineCursor { byte: 0, line: 1 },
            done: false,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    fn line_at(&mut self, byte: u64) -> u64 {
        let content = self.reader.get_ref().get_ref().as_bytes();
        self.lines.advance(content, byte)
    }

    /// Next non-blank data row.
    ///
    /// A structurally broken record yields a [`RowError::Malformed`]; the scan
    /// stops after it since the reader position can no longer be trusted.
    pub fn next_row(&mut self) -> Option<Result<Row, RowError>> {
        if self.done {
            return None;
        }

        loop {
            let mut record = StringRecord::new();
            match self.reader.read_record(&mut record) {
                Ok(false) => {
                    self.done = true;
                    return None;
                }
                Ok(true) => {
                    let byte = record
                        .position()
                        .map(|p| p.byte())
                        .unwrap_or_else(|| self.reader.position().byte());
                    let line = self.line_at(byte);
                    let row = Row { line, record };
                    if row.is_blank() {
                        continue;
                    }
                    return Some(Ok(row));
                }
                Err(e) => {
                    self.done = true;
                    let byte = e
                        .position()
                        .map(|p| p.byte())
                        .unwrap_or_else(|| self.reader.position().byte());
                    let line = self.line_at(byte);
                    return Some(Err(RowError::Malformed {
                        line,
                        column: RECORD_COLUMN.to_string(),
                        message: e.to_string(),
                    }));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(source: &mut CsvSource) -> Vec<Row> {
        std::iter::from_fn(|| source.next_row())
            .map(|r| r.unwrap())
            .collect()
    }

    #[test]
    fn test_simple_csv() {
        let mut source = CsvSource::from_bytes(b"name,unit\nCO2,kg\nCH4,kg", None).unwrap();
        assert_eq!(source.header().names(), ["name", "unit"]);
        let rows = rows(&mut source);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].value(0), "CO2");
        assert_eq!(rows[1].value(1), "kg");
    }

    #[test]
    fn test_line_numbers_follow_file() {
        let csv = "a,b\n1,2\n\n3,4\n\"multi\nline\",5\n6,7\n";
        let mut source = CsvSource::from_bytes(csv.as_bytes(), None).unwrap();
        let lines: Vec<u64> = rows(&mut source).iter().map(Row::line).collect();
        assert_eq!(lines, vec![2, 4, 5, 7]);
    }

    #[test]
    fn test_blank_rows_skipped() {
        let csv = "a,b\n1,2\n,\n3,4\n";
        let mut source = CsvSource::from_bytes(csv.as_bytes(), None).unwrap();
        assert_eq!(rows(&mut source).len(), 2);
    }

    #[test]
    fn test_quoted_values_and_trimming() {
        let csv = "name , value\n\"Soda, ash\" ,  1.5 ";
        let mut source = CsvSource::from_bytes(csv.as_bytes(), None).unwrap();
        assert_eq!(source.header().names(), ["name", "value"]);
        let rows = rows(&mut source);
        assert_eq!(rows[0].value(0), "Soda, ash");
        assert_eq!(rows[0].value(1), "1.5");
    }

    #[test]
    fn test_short_rows_read_blank() {
        let csv = "a,b,c\n1";
        let mut source = CsvSource::from_bytes(csv.as_bytes(), None).unwrap();
        let rows = rows(&mut source);
        assert_eq!(rows[0].value(0), "1");
        assert_eq!(rows[0].value(2), "");
    }

    #[test]
    fn test_bom_stripped_from_header() {
        let csv = "\u{feff}flow_name,unit\nCO2,kg";
        let source = CsvSource::from_bytes(csv.as_bytes(), None).unwrap();
        assert_eq!(source.header().position("flow_name"), Some(0));
    }

    #[test]
    fn test_require_reports_all_missing() {
        let source = CsvSource::from_bytes(b"flow_name,unit\n", None).unwrap();
        let err = source
            .header()
            .require(&["new_database", "flow_name", "cf"])
            .unwrap_err();
        match err {
            LoadError::Schema { missing, .. } => assert_eq!(missing, vec!["new_database", "cf"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_content_has_no_columns() {
        let source = CsvSource::from_bytes(b"", None).unwrap();
        assert!(source.header().require(&["flow_name"]).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = CsvSource::open(Path::new("does/not/exist.csv"), None).unwrap_err();
        assert!(matches!(err, LoadError::FileAccess { .. }));
    }

    #[test]
    fn test_detect_delimiter_semicolon() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), ';');
    }

    #[test]
    fn test_detect_delimiter_tab() {
        assert_eq!(detect_delimiter("a\tb\tc\n1\t2\t3"), '\t');
    }

    #[test]
    fn test_detect_delimiter_default_comma() {
        assert_eq!(detect_delimiter("single"), ',');
    }

    #[test]
    fn test_explicit_delimiter_wins() {
        let mut source = CsvSource::from_bytes(b"a;b|c\n1;2|3", Some('|')).unwrap();
        assert_eq!(source.delimiter(), '|');
        assert_eq!(rows(&mut source)[0].value(0), "1;2");
    }

    #[test]
    fn test_latin1_decoding() {
        // "name\nSociété" in ISO-8859-1
        let bytes: &[u8] = &[
            0x6E, 0x61, 0x6D, 0x65, 0x0A, 0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9,
        ];
        let decoded = decode_content(bytes, "iso-8859-1").unwrap();
        assert!(decoded.ends_with("Société"));
    }

    #[test]
    fn test_utf8_detected_directly() {
        assert_eq!(detect_encoding("Société".as_bytes()), "utf-8");
    }

    #[test]
    fn test_non_ascii_delimiter_rejected() {
        assert!(CsvSource::from_bytes(b"a,b", Some('é')).is_err());
    }
}
