use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use csv::StringRecord;
use tracing::{debug, info, warn};

use crate::category::CategoryClassifier;
use crate::error::PipelineError;
use crate::models::SourceDatabase;

/// Column names of the national recall site extract.
pub mod source_a {
    pub const DATE: &str = "Date";
    pub const BRAND: &str = "Brand Name(s)";
    pub const DESCRIPTION: &str = "Product Description";
    pub const PRODUCT_TYPE: &str = "Product Type";
    pub const REASON: &str = "Recall Reason Description";
    pub const COMPANY: &str = "Company Name";
    pub const EXCERPT: &str = "Excerpt";
}

/// Column names of the regional notification extract.
pub mod source_b {
    pub const REFERENCE: &str = "reference";
    pub const DATE: &str = "date";
    pub const SUBJECT: &str = "subject";
    pub const CATEGORY: &str = "category";
    pub const HAZARDS: &str = "hazards";
    pub const OPERATOR: &str = "operator";
    pub const ORIGIN: &str = "origin";
    pub const NOTIFYING_COUNTRY: &str = "notifying_country";
    pub const CLASSIFICATION: &str = "classification";
    pub const FOR_ATTENTION: &str = "forAttention";
    pub const FOR_FOLLOW_UP: &str = "forFollowUp";

    pub const ALL: &[&str] = &[
        REFERENCE,
        DATE,
        SUBJECT,
        CATEGORY,
        HAZARDS,
        OPERATOR,
        ORIGIN,
        NOTIFYING_COUNTRY,
        CLASSIFICATION,
        FOR_ATTENTION,
        FOR_FOLLOW_UP,
    ];
}

/// A raw extract: header row plus string records, column names as the source wrote them.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    headers: Vec<String>,
    index: HashMap<String, usize>,
    folded: HashMap<String, usize>,
    rows: Vec<StringRecord>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<StringRecord>) -> Self {
        let mut index = HashMap::new();
        let mut folded = HashMap::new();
        for (position, header) in headers.iter().enumerate() {
            index.entry(header.clone()).or_insert(position);
            folded.entry(header.to_lowercase()).or_insert(position);
        }
        Self {
            headers,
            index,
            folded,
            rows,
        }
    }

    #[cfg(test)]
    pub fn from_rows(headers: &[&str], rows: &[&[&str]]) -> Self {
        let headers = headers.iter().map(|h| h.to_string()).collect();
        let rows = rows.iter().map(|row| StringRecord::from(row.to_vec())).collect();
        Self::new(headers, rows)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, csv::Error> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|header| header.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for (line, result) in reader.records().enumerate() {
            match result {
                Ok(record) => rows.push(record),
                Err(err) => warn!(line = line + 2, error = %err, "skipping malformed row"),
            }
        }

        Ok(Self::new(headers, rows))
    }

    pub fn from_path(path: &Path, database: SourceDatabase) -> Result<Self, PipelineError> {
        let unavailable = |reason: String| PipelineError::SourceUnavailable {
            database,
            path: path.to_path_buf(),
            reason,
        };
        let file = std::fs::File::open(path).map_err(|e| unavailable(e.to_string()))?;
        Self::from_reader(file).map_err(|e| unavailable(e.to_string()))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_position(column).is_some()
    }

    pub fn row(&self, ordinal: usize) -> Option<RawRow<'_>> {
        self.rows.get(ordinal).map(|record| RawRow {
            table: self,
            record,
            ordinal,
        })
    }

    pub fn rows(&self) -> impl Iterator<Item = RawRow<'_>> {
        self.rows.iter().enumerate().map(move |(ordinal, record)| RawRow {
            table: self,
            record,
            ordinal,
        })
    }

    fn column_position(&self, column: &str) -> Option<usize> {
        self.index
            .get(column)
            .or_else(|| self.folded.get(&column.to_lowercase()))
            .copied()
    }
}

/// Borrowed view of one raw row.
#[derive(Debug, Clone, Copy)]
pub struct RawRow<'a> {
    table: &'a RawTable,
    record: &'a StringRecord,
    ordinal: usize,
}

impl<'a> RawRow<'a> {
    /// Position of the row in its raw table, before any filtering.
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Field value, or `""` when the column or the cell is missing.
    pub fn get(&self, column: &str) -> &'a str {
        self.table
            .column_position(column)
            .and_then(|position| self.record.get(position))
            .map(str::trim)
            .unwrap_or("")
    }

    /// JSON object of the row's non-empty cells, in header order.
    pub fn snapshot(&self) -> String {
        let mut map = serde_json::Map::new();
        for (header, value) in self.table.headers.iter().zip(self.record.iter()) {
            if !value.trim().is_empty() {
                map.insert(header.clone(), serde_json::Value::String(value.to_string()));
            }
        }
        serde_json::Value::Object(map).to_string()
    }
}

/// Rows of one source that passed the category membership test.
#[derive(Debug, Clone)]
pub struct FilteredTable {
    pub source: SourceDatabase,
    table: RawTable,
    selected: Vec<usize>,
}

impl FilteredTable {
    pub fn empty(source: SourceDatabase) -> Self {
        Self {
            source,
            table: RawTable::default(),
            selected: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.table.has_column(column)
    }

    /// Rows read from the extract before filtering.
    pub fn read_rows(&self) -> usize {
        self.table.len()
    }

    pub fn rows(&self) -> impl Iterator<Item = RawRow<'_>> {
        self.selected.iter().filter_map(|&ordinal| self.table.row(ordinal))
    }
}

/// Type and description columns the membership test reads for each source.
fn filter_columns(source: SourceDatabase) -> (&'static str, &'static str) {
    match source {
        SourceDatabase::SourceA => (source_a::PRODUCT_TYPE, source_a::DESCRIPTION),
        SourceDatabase::SourceB => (source_b::CATEGORY, source_b::SUBJECT),
    }
}

pub fn filter_table(
    table: RawTable,
    source: SourceDatabase,
    classifier: &CategoryClassifier<'_>,
) -> FilteredTable {
    let (type_column, description_column) = filter_columns(source);
    for column in [type_column, description_column] {
        if !table.is_empty() && !table.has_column(column) {
            debug!(%source, column, "column missing, treating as empty");
        }
    }

    let selected: Vec<usize> = table
        .rows()
        .filter(|row| {
            classifier.classify(row.get(type_column), row.get(description_column), source)
        })
        .map(|row| row.ordinal())
        .collect();

    info!(%source, read = table.len(), kept = selected.len(), "filtered source rows");

    FilteredTable {
        source,
        table,
        selected,
    }
}

/// Read and filter one source extract. An unreadable extract is logged and
/// yields an empty table so the other source can still be processed.
pub fn load_and_filter(
    path: &Path,
    source: SourceDatabase,
    classifier: &CategoryClassifier<'_>,
) -> FilteredTable {
    match RawTable::from_path(path, source) {
        Ok(table) => {
            info!(%source, path = %path.display(), rows = table.len(), "read source extract");
            filter_table(table, source, classifier)
        }
        Err(err) => {
            warn!(error = %err, "source skipped");
            FilteredTable::empty(source)
        }
    }
}

pub fn filter_source_a(path: &Path, classifier: &CategoryClassifier<'_>) -> FilteredTable {
    load_and_filter(path, SourceDatabase::SourceA, classifier)
}

pub fn filter_source_b(path: &Path, classifier: &CategoryClassifier<'_>) -> FilteredTable {
    load_and_filter(path, SourceDatabase::SourceB, classifier)
}

/// Most recently modified `*.csv` in `dir` whose lower-cased name contains `pattern`.
pub fn locate_latest(dir: &Path, pattern: &str) -> Option<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            debug!(dir = %dir.display(), error = %err, "cannot list extract directory");
            return None;
        }
    };
    let pattern = pattern.to_lowercase();

    entries
        .filter_map(Result::ok)
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy().to_lowercase();
            name.ends_with(".csv") && name.contains(&pattern)
        })
        .filter_map(|entry| {
            let modified = entry.metadata().and_then(|meta| meta.modified()).ok()?;
            Some((modified, entry.path()))
        })
        .max_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
        .map(|(_, path)| path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn missing_columns_read_as_empty() {
        let table = RawTable::from_rows(&["reference", "subject"], &[&["R1", "milk powder"]]);
        let row = table.row(0).unwrap();
        assert_eq!(row.get("reference"), "R1");
        assert_eq!(row.get("hazards"), "");
    }

    #[test]
    fn column_lookup_falls_back_to_case_insensitive() {
        let table = RawTable::from_rows(&["date", "PRODUCT TYPE"], &[&["01/02/2024", "Bakery"]]);
        let row = table.row(0).unwrap();
        assert_eq!(row.get(source_a::DATE), "01/02/2024");
        assert_eq!(row.get(source_a::PRODUCT_TYPE), "Bakery");
    }

    #[test]
    fn reader_keeps_short_rows() {
        let csv = "reference,subject,hazards\nR1,milk powder,salmonella\nR2,bread\n";
        let table = RawTable::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.row(1).unwrap().get("hazards"), "");
    }

    #[test]
    fn snapshot_skips_empty_cells_in_header_order() {
        let table = RawTable::from_rows(&["b", "a", "c"], &[&["2", "", "3"]]);
        assert_eq!(table.row(0).unwrap().snapshot(), r#"{"b":"2","c":"3"}"#);
    }

    #[test]
    fn filter_keeps_target_rows_and_ordinals() {
        let config = Config::default();
        let classifier = CategoryClassifier::new(&config);
        let table = RawTable::from_rows(
            &["Product Type", "Product Description"],
            &[
                &["Seafood", "smoked salmon"],
                &["Bakery", "sourdough"],
                &["Frozen", "vanilla ice cream"],
            ],
        );

        let filtered = filter_table(table, SourceDatabase::SourceA, &classifier);
        let ordinals: Vec<usize> = filtered.rows().map(|row| row.ordinal()).collect();
        assert_eq!(ordinals, vec![1, 2]);
        assert_eq!(filtered.source, SourceDatabase::SourceA);
        assert_eq!(filtered.read_rows(), 3);
    }

    #[test]
    fn unreadable_source_yields_empty_table() {
        let config = Config::default();
        let classifier = CategoryClassifier::new(&config);
        let filtered = filter_source_b(Path::new("/definitely/not/here.csv"), &classifier);
        assert!(filtered.is_empty());
        assert_eq!(filtered.source, SourceDatabase::SourceB);
    }

    #[test]
    fn locates_newest_matching_extract() {
        let dir = tempfile::tempdir().unwrap();
        let older = dir.path().join("fda_alerts_20240101.csv");
        let newer = dir.path().join("FDA_alerts_20240201.csv");
        std::fs::write(&older, "Date\n").unwrap();
        std::fs::write(&newer, "Date\n").unwrap();
        std::fs::write(dir.path().join("rasff_window_20240301.csv"), "date\n").unwrap();
        std::fs::write(dir.path().join("fda_alerts_notes.txt"), "").unwrap();

        let an_hour_ago = std::time::SystemTime::now() - std::time::Duration::from_secs(3600);
        std::fs::File::options()
            .write(true)
            .open(&older)
            .unwrap()
            .set_modified(an_hour_ago)
            .unwrap();

        assert_eq!(locate_latest(dir.path(), "fda_alerts"), Some(newer));
        assert_eq!(locate_latest(dir.path(), "missing"), None);
        assert_eq!(locate_latest(&dir.path().join("nope"), "fda_alerts"), None);
    }
}
