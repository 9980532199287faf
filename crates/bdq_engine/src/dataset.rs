//! Darwin Core dataset reader.
//!
//! Takes the raw attachment bytes, sniffs the delimiter from the header
//! line, detects whether the table is occurrence- or taxon-centric, and
//! materializes the rows in source order. Column lookups everywhere in the
//! engine go through [`Header::resolve`], which is case-insensitive on the
//! Darwin Core local name and tolerant of the namespace prefix, so
//! `dwc:countryCode`, `countryCode` and `COUNTRYCODE` all address the same
//! column.

use crate::error::DatasetError;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

const CANDIDATE_DELIMITERS: [u8; 4] = [b'\t', b',', b';', b'|'];
const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Whether a dataset is keyed at the occurrence or the taxon level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreType {
    Occurrence,
    Taxon,
}

impl CoreType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoreType::Occurrence => "occurrence",
            CoreType::Taxon => "taxon",
        }
    }

    /// The column that carries the record identifier for this core.
    pub fn id_column_name(&self) -> &'static str {
        match self {
            CoreType::Occurrence => "occurrenceID",
            CoreType::Taxon => "taxonID",
        }
    }
}

impl fmt::Display for CoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The Darwin Core local name: the part after the last namespace separator.
pub fn local_name(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

/// Normalized column key: lowercased local name.
pub fn normalize_name(name: &str) -> String {
    local_name(name.trim()).to_ascii_lowercase()
}

/// Parsed header: original column names in source order, plus a
/// normalized-name lookup in which the first occurrence of a duplicate
/// local name wins.
#[derive(Debug, Clone)]
pub struct Header {
    columns: Vec<String>,
    lookup: HashMap<String, usize>,
}

impl Header {
    /// Build a header, recording a warning for every duplicate dropped from
    /// the lookup. The duplicate column itself stays in `columns` so output
    /// reproduces the input header verbatim.
    pub fn new(columns: Vec<String>) -> (Self, Vec<String>) {
        let mut lookup = HashMap::with_capacity(columns.len());
        let mut warnings = Vec::new();
        for (idx, column) in columns.iter().enumerate() {
            let key = normalize_name(column);
            if let Some(first) = lookup.get(&key) {
                warnings.push(format!(
                    "duplicate column '{}' at position {} ignored; keeping '{}' at position {}",
                    column, idx, columns[*first], first
                ));
            } else {
                lookup.insert(key, idx);
            }
        }
        (Self { columns, lookup }, warnings)
    }

    /// Resolve a (possibly namespaced, any-case) column name to its index.
    pub fn resolve(&self, name: &str) -> Option<usize> {
        self.lookup.get(&normalize_name(name)).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    /// Column names in source order, verbatim.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// An in-memory Darwin Core table. Read-only once parsed.
#[derive(Debug)]
pub struct Dataset {
    pub header: Header,
    rows: Vec<Vec<String>>,
    pub delimiter: u8,
    pub core_type: CoreType,
    /// Index of the record-identifier column.
    pub id_column: usize,
    pub warnings: Vec<String>,
}

impl Dataset {
    /// Parse attachment bytes into a dataset.
    ///
    /// The filename is advisory (used for diagnostics only); the delimiter
    /// is always sniffed from the header line.
    pub fn parse(bytes: &[u8], filename: &str) -> Result<Self, DatasetError> {
        let bytes = bytes.strip_prefix(&UTF8_BOM).unwrap_or(bytes);
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(DatasetError::NoAttachment);
        }

        let delimiter = sniff_delimiter(header_line(bytes));
        debug!(
            filename,
            delimiter = %(delimiter as char).escape_default(),
            "parsing dataset"
        );

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(false)
            .from_reader(bytes);

        let mut records = reader.records();
        let header_record = match records.next() {
            Some(Ok(record)) => record,
            Some(Err(err)) => {
                return Err(DatasetError::MalformedRow {
                    row: 0,
                    detail: err.to_string(),
                })
            }
            None => return Err(DatasetError::NoAttachment),
        };
        let columns: Vec<String> = header_record
            .iter()
            .map(|cell| cell.trim().to_string())
            .collect();
        let (header, warnings) = Header::new(columns);

        let mut rows = Vec::new();
        for (row_index, record) in records.enumerate() {
            let record = record.map_err(|err| DatasetError::MalformedRow {
                row: row_index,
                detail: err.to_string(),
            })?;
            rows.push(record.iter().map(|cell| cell.to_string()).collect());
        }
        if rows.is_empty() {
            return Err(DatasetError::EmptyDataset);
        }

        let core_type = if header.contains("occurrenceID") {
            CoreType::Occurrence
        } else if header.contains("taxonID") {
            CoreType::Taxon
        } else {
            return Err(DatasetError::NoCoreColumn);
        };
        // contains() above guarantees this resolves
        let id_column = header
            .resolve(core_type.id_column_name())
            .ok_or(DatasetError::NoCoreColumn)?;

        debug!(
            rows = rows.len(),
            columns = header.len(),
            core_type = %core_type,
            "dataset parsed"
        );

        Ok(Self {
            header,
            rows,
            delimiter,
            core_type,
            id_column,
            warnings,
        })
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Cell value at (row, column index), verbatim.
    pub fn value(&self, row: usize, column: usize) -> &str {
        &self.rows[row][column]
    }

    /// The record identifier of a row, verbatim.
    pub fn record_id(&self, row: usize) -> &str {
        self.value(row, self.id_column)
    }

    /// Rows in source order.
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Number of distinct record identifier values.
    pub fn distinct_record_ids(&self) -> usize {
        let mut seen: std::collections::HashSet<&str> = std::collections::HashSet::new();
        for row in 0..self.rows.len() {
            seen.insert(self.record_id(row));
        }
        seen.len()
    }
}

/// Detect the delimiter: the first candidate byte appearing in the header
/// line; comma when none appears.
pub fn sniff_delimiter(header_line: &[u8]) -> u8 {
    header_line
        .iter()
        .find(|b| CANDIDATE_DELIMITERS.contains(b))
        .copied()
        .unwrap_or(b',')
}

fn header_line(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().position(|&b| b == b'\n').unwrap_or(bytes.len());
    let line = &bytes[..end];
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_first_candidate_delimiter() {
        assert_eq!(sniff_delimiter(b"occurrenceID\tcountryCode"), b'\t');
        assert_eq!(sniff_delimiter(b"occurrenceID,countryCode"), b',');
        assert_eq!(sniff_delimiter(b"occurrenceID;countryCode"), b';');
        assert_eq!(sniff_delimiter(b"occurrenceID|countryCode"), b'|');
        // mixed: whichever separator appears first wins
        assert_eq!(sniff_delimiter(b"a;b,c"), b';');
        // no separator at all: comma
        assert_eq!(sniff_delimiter(b"occurrenceID"), b',');
    }

    #[test]
    fn resolves_columns_namespace_and_case_insensitively() {
        let data = b"dwc:occurrenceID,dwc:countryCode\no1,US\n";
        let dataset = Dataset::parse(data, "test.csv").unwrap();
        assert_eq!(dataset.core_type, CoreType::Occurrence);
        assert_eq!(dataset.header.resolve("occurrenceid"), Some(0));
        assert_eq!(dataset.header.resolve("COUNTRYCODE"), Some(1));
        assert_eq!(dataset.header.resolve("dwc:countryCode"), Some(1));
        assert_eq!(dataset.header.resolve("eventDate"), None);
        assert_eq!(dataset.record_id(0), "o1");
    }

    #[test]
    fn duplicate_header_keeps_first_and_warns() {
        let data = b"occurrenceID,countryCode,dwc:CountryCode\no1,US,GB\n";
        let dataset = Dataset::parse(data, "test.csv").unwrap();
        assert_eq!(dataset.header.resolve("countryCode"), Some(1));
        assert_eq!(dataset.header.columns().len(), 3);
        assert_eq!(dataset.warnings.len(), 1);
        assert!(dataset.warnings[0].contains("duplicate column"));
    }

    #[test]
    fn detects_taxon_core() {
        let data = b"taxonID\tscientificName\nt1\tPuma concolor\n";
        let dataset = Dataset::parse(data, "taxa.tsv").unwrap();
        assert_eq!(dataset.core_type, CoreType::Taxon);
        assert_eq!(dataset.record_id(0), "t1");
    }

    #[test]
    fn empty_input_is_no_attachment() {
        assert!(matches!(
            Dataset::parse(b"", "empty.csv"),
            Err(DatasetError::NoAttachment)
        ));
        assert!(matches!(
            Dataset::parse(b"   \n", "blank.csv"),
            Err(DatasetError::NoAttachment)
        ));
    }

    #[test]
    fn header_only_is_empty_dataset() {
        assert!(matches!(
            Dataset::parse(b"occurrenceID,countryCode\n", "h.csv"),
            Err(DatasetError::EmptyDataset)
        ));
    }

    #[test]
    fn missing_core_column_is_rejected() {
        assert!(matches!(
            Dataset::parse(b"locality,countryCode\nSomewhere,US\n", "x.csv"),
            Err(DatasetError::NoCoreColumn)
        ));
    }

    #[test]
    fn ragged_row_is_fatal() {
        let err = Dataset::parse(b"occurrenceID,countryCode\no1,US\no2\n", "x.csv").unwrap_err();
        match err {
            DatasetError::MalformedRow { row, .. } => assert_eq!(row, 1),
            other => panic!("expected MalformedRow, got {other:?}"),
        }
    }

    #[test]
    fn bom_is_stripped() {
        let data = b"\xEF\xBB\xBFoccurrenceID,countryCode\no1,US\n";
        let dataset = Dataset::parse(data, "bom.csv").unwrap();
        assert_eq!(dataset.header.resolve("occurrenceID"), Some(0));
    }

    #[test]
    fn distinct_record_ids_counts_duplicates() {
        let data = b"occurrenceID,countryCode\no1,US\no1,GB\no2,FR\n";
        let dataset = Dataset::parse(data, "dup.csv").unwrap();
        assert_eq!(dataset.row_count(), 3);
        assert_eq!(dataset.distinct_record_ids(), 2);
    }
}
