use reqwest::Url;
use std::fs;
use std::io::Read;
use std::path::Path;

use crate::domain::portfolio::{
    PortfolioEntry, PortfolioError, PortfolioTable, REQUIRED_COLUMNS, TECHSTACK_DELIMITER,
};

/// Example portfolio offered for download; also the table synthesized on first run.
pub const TEMPLATE_CSV: &str = "Techstack,Links\n\
React | Node.js | MongoDB,https://example.com/react-portfolio\n\
Angular | .NET | SQL Server,https://example.com/angular-portfolio\n";

pub const TEMPLATE_FILE_NAME: &str = "my_portfolio.csv";

/// Parses CSV text with a header row into a table.
///
/// Only the header is checked against the column contract later; rows are taken
/// positionally. A row whose field count differs from the header is a parse error.
pub fn parse_table<R: Read>(reader: R, origin: &Path) -> Result<PortfolioTable, PortfolioError> {
    let table_error = |message: String| PortfolioError::Table {
        path: origin.to_path_buf(),
        message,
    };

    let mut csv_reader = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
    let columns: Vec<String> = csv_reader
        .headers()
        .map_err(|e| table_error(e.to_string()))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = record.map_err(|e| table_error(e.to_string()))?;
        let techstack = record.get(0).unwrap_or_default();
        let link = record.get(1).unwrap_or_default();
        rows.push(PortfolioEntry::new(techstack, link));
    }
    Ok(PortfolioTable::new(columns, rows))
}

pub fn read_table(path: &Path) -> Result<PortfolioTable, PortfolioError> {
    let file = fs::File::open(path).map_err(|e| PortfolioError::Table {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    parse_table(file, path)
}

pub fn write_table(path: &Path, table: &PortfolioTable) -> Result<(), PortfolioError> {
    let table_error = |message: String| PortfolioError::Table {
        path: path.to_path_buf(),
        message,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| table_error(e.to_string()))?;
    }
    let mut writer = csv::Writer::from_path(path).map_err(|e| table_error(e.to_string()))?;
    writer
        .write_record(&table.columns)
        .map_err(|e| table_error(e.to_string()))?;
    for row in &table.rows {
        writer
            .write_record([row.techstack.as_str(), row.link.as_str()])
            .map_err(|e| table_error(e.to_string()))?;
    }
    writer.flush().map_err(|e| table_error(e.to_string()))?;
    Ok(())
}

/// The table synthesized when no portfolio file exists yet.
pub fn default_table() -> PortfolioTable {
    PortfolioTable::with_rows(vec![
        PortfolioEntry::new(
            "React | Node.js | MongoDB",
            "https://example.com/react-portfolio",
        ),
        PortfolioEntry::new(
            "Angular | .NET | SQL Server",
            "https://example.com/angular-portfolio",
        ),
    ])
}

/// Reads the table at `path`, first writing the default table there if it is absent.
pub fn ensure_table(path: &Path) -> Result<PortfolioTable, PortfolioError> {
    if !path.exists() {
        log::warn!(
            "Portfolio table {:?} not found; writing a default table with {} columns.",
            path,
            REQUIRED_COLUMNS.len()
        );
        write_table(path, &default_table())?;
    }
    read_table(path)
}

/// A problem with a single row, reported with its 1-based row number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowIssue {
    pub row: usize,
    pub message: String,
}

impl std::fmt::Display for RowIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Row {}: {}", self.row, self.message)
    }
}

/// Content checks applied before a user table is committed.
///
/// The store only needs the column contract; these checks catch tables that would
/// load fine but match poorly or produce unusable links.
pub fn validate_rows(table: &PortfolioTable) -> Vec<RowIssue> {
    let mut issues = Vec::new();
    for (index, row) in table.rows.iter().enumerate() {
        let row_number = index + 1;
        if !row.techstack.contains(TECHSTACK_DELIMITER) {
            issues.push(RowIssue {
                row: row_number,
                message: format!(
                    "Tech stack must contain technologies separated by '{}'",
                    TECHSTACK_DELIMITER
                ),
            });
        }
        if !is_valid_url(&row.link) {
            issues.push(RowIssue {
                row: row_number,
                message: "Invalid URL format".to_string(),
            });
        }
    }
    issues
}

fn is_valid_url(candidate: &str) -> bool {
    Url::parse(candidate.trim())
        .map(|url| !url.scheme().is_empty() && url.host_str().map_or(false, |h| !h.is_empty()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::tempdir;

    #[test]
    fn template_parses_with_canonical_header() {
        let table = parse_table(TEMPLATE_CSV.as_bytes(), Path::new("template")).unwrap();
        assert!(table.check_schema().is_ok());
        assert_eq!(table, default_table());
        assert!(validate_rows(&table).is_empty());
    }

    #[test]
    fn header_is_kept_verbatim_for_schema_check() {
        let csv = "Links,Techstack\nhttps://a.example,Rust | Tokio\n";
        let table = parse_table(csv.as_bytes(), Path::new("inline")).unwrap();
        assert_eq!(table.columns, vec!["Links", "Techstack"]);
        assert_matches!(table.check_schema(), Err(PortfolioError::Schema { .. }));
    }

    #[test]
    fn ragged_rows_are_a_table_error() {
        let csv = "Techstack,Links\nRust | Tokio\n";
        assert_matches!(
            parse_table(csv.as_bytes(), Path::new("inline")),
            Err(PortfolioError::Table { .. })
        );
    }

    #[test]
    fn quoted_fields_survive() {
        let csv = "Techstack,Links\n\"Rust, async | Tokio\",https://a.example/x\n";
        let table = parse_table(csv.as_bytes(), Path::new("inline")).unwrap();
        assert_eq!(table.rows[0].techstack, "Rust, async | Tokio");
    }

    #[test]
    fn ensure_table_synthesizes_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("resource").join(TEMPLATE_FILE_NAME);
        assert!(!path.exists());

        let table = ensure_table(&path).unwrap();
        assert!(path.exists());
        assert_eq!(table, default_table());

        // an existing file is read as-is
        fs::write(&path, "Techstack,Links\nGo | gRPC,https://g.example\n").unwrap();
        let table = ensure_table(&path).unwrap();
        assert_eq!(table.rows, vec![PortfolioEntry::new("Go | gRPC", "https://g.example")]);
    }

    #[test]
    fn write_then_read_preserves_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("portfolio.csv");
        let table = PortfolioTable::with_rows(vec![PortfolioEntry::new(
            "Python | \"Django\"",
            "https://p.example/x",
        )]);
        write_table(&path, &table).unwrap();
        assert_eq!(read_table(&path).unwrap(), table);
    }

    #[test]
    fn validate_rows_reports_each_problem() {
        let table = PortfolioTable::with_rows(vec![
            PortfolioEntry::new("Rust | Tokio", "https://ok.example/x"),
            PortfolioEntry::new("Rust", "https://ok.example/y"),
            PortfolioEntry::new("Go | gRPC", "not a url"),
            PortfolioEntry::new("Go", "example.com/no-scheme"),
        ]);
        let issues = validate_rows(&table);
        let rows: Vec<usize> = issues.iter().map(|i| i.row).collect();
        assert_eq!(rows, vec![2, 3, 4, 4]);
        assert_eq!(issues[1].to_string(), "Row 3: Invalid URL format");
    }
}
