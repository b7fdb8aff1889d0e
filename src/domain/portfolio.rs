use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use thiserror::Error;

/// Column names a portfolio table must carry, in this exact order.
pub const TECHSTACK_COLUMN: &str = "Techstack";
pub const LINKS_COLUMN: &str = "Links";
pub const REQUIRED_COLUMNS: [&str; 2] = [TECHSTACK_COLUMN, LINKS_COLUMN];

/// Delimiter between technology names inside a techstack cell.
pub const TECHSTACK_DELIMITER: &str = " | ";

const LINK_MARKER: &str = "Links: ";

#[derive(Debug, Error)]
pub enum PortfolioError {
    #[error("portfolio table must have exactly two columns 'Techstack' and 'Links' in that order, found {found:?}")]
    Schema { found: Vec<String> },

    #[error("failed to initialize portfolio storage at {path:?}: {message}")]
    StorageInit { path: PathBuf, message: String },

    #[error("portfolio table {path:?}: {message}")]
    Table { path: PathBuf, message: String },

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("failed to replace portfolio collection: {0}")]
    Replace(String),

    #[error("portfolio retrieval failed: {0}")]
    Retrieval(String),
}

/// One row of the portfolio: a pipe-delimited techstack and the link showcasing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioEntry {
    pub techstack: String,
    pub link: String,
}

impl PortfolioEntry {
    pub fn new(techstack: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            techstack: techstack.into(),
            link: link.into(),
        }
    }

    /// Text that gets embedded for this entry.
    pub fn render(&self) -> String {
        format!("Techstack: {}, {}{}", self.techstack, LINK_MARKER, self.link)
    }
}

/// An in-memory table as supplied by the user: its header row plus its entries.
///
/// The header is kept separately from the rows so that the column contract can be
/// checked before anything touches the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortfolioTable {
    pub columns: Vec<String>,
    pub rows: Vec<PortfolioEntry>,
}

impl PortfolioTable {
    pub fn new(columns: Vec<String>, rows: Vec<PortfolioEntry>) -> Self {
        Self { columns, rows }
    }

    /// A table with the canonical header.
    pub fn with_rows(rows: Vec<PortfolioEntry>) -> Self {
        Self {
            columns: REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect(),
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rejects any header other than exactly `Techstack,Links`.
    pub fn check_schema(&self) -> Result<(), PortfolioError> {
        let matches = self.columns.len() == REQUIRED_COLUMNS.len()
            && self
                .columns
                .iter()
                .zip(REQUIRED_COLUMNS.iter())
                .all(|(found, expected)| found == expected);
        if matches {
            Ok(())
        } else {
            Err(PortfolioError::Schema {
                found: self.columns.clone(),
            })
        }
    }
}

/// Normalized skill terms used to query the portfolio.
///
/// Construction trims every term and drops empty ones, so an empty `Skills` means
/// "nothing to ask the store". Repeated terms are kept in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Skills(Vec<String>);

impl Skills {
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            terms
                .into_iter()
                .map(|term| term.as_ref().trim().to_string())
                .filter(|term| !term.is_empty())
                .collect(),
        )
    }

    /// Reads the loosely typed `skills` field of an extracted job record.
    ///
    /// A string becomes a single term, an array keeps only its string elements, and
    /// anything else (null, numbers, objects) yields no terms.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::String(s) => Self::new([s.as_str()]),
            Value::Array(items) => Self::new(items.iter().filter_map(Value::as_str)),
            _ => Self::default(),
        }
    }

    pub fn terms(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The single disjunctive query phrase, or `None` when there is nothing to ask.
    pub fn to_query(&self) -> Option<String> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.0.join(" OR "))
        }
    }
}

impl From<&str> for Skills {
    fn from(value: &str) -> Self {
        Self::new([value])
    }
}

impl From<String> for Skills {
    fn from(value: String) -> Self {
        Self::new([value])
    }
}

impl From<Vec<String>> for Skills {
    fn from(value: Vec<String>) -> Self {
        Self::new(value)
    }
}

impl From<Vec<&str>> for Skills {
    fn from(value: Vec<&str>) -> Self {
        Self::new(value)
    }
}

impl From<&[&str]> for Skills {
    fn from(value: &[&str]) -> Self {
        Self::new(value.iter().copied())
    }
}

impl From<&Value> for Skills {
    fn from(value: &Value) -> Self {
        Self::from_json(value)
    }
}

/// A portfolio item returned for a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioMatch {
    pub techstack: String,
    pub link: String,
}

/// Payload stored next to each vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentPayload {
    pub document: String,
    pub techstack: String,
    #[serde(default)]
    pub link: Option<String>,
}

impl DocumentPayload {
    pub fn from_entry(entry: &PortfolioEntry) -> Self {
        Self {
            document: entry.render(),
            techstack: entry.techstack.clone(),
            link: Some(entry.link.clone()),
        }
    }

    /// Resolves the payload into a match, or `None` when no link can be recovered.
    ///
    /// The `link` field wins; payloads written without one fall back to the
    /// `Links: ` pattern of the rendered document.
    pub fn to_match(&self) -> Option<PortfolioMatch> {
        let link = self
            .link
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .or_else(|| extract_link(&self.document))?;
        Some(PortfolioMatch {
            techstack: self.techstack.clone(),
            link,
        })
    }
}

/// Pulls the URL-shaped token following the last `Links: ` marker.
pub fn extract_link(document: &str) -> Option<String> {
    let (_, rest) = document.rsplit_once(LINK_MARKER)?;
    rest.split_whitespace().next().map(str::to_string)
}

/// A document ready to be written into a vector collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentToUpsert {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: DocumentPayload,
}

/// A document returned by a similarity search, best match first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub score: f32,
    pub payload: DocumentPayload,
}
