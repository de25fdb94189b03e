use crate::retry::RemoteError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One spreadsheet cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Number(f64),
    Bool(bool),
    Text(String),
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn empty() -> Self {
        Self::Text(String::new())
    }

    pub fn is_blank(&self) -> bool {
        match self {
            Self::Text(s) => s.trim().is_empty(),
            Self::Number(_) | Self::Bool(_) => false,
        }
    }

    /// Integer view of the cell: whole numbers, or text that parses as one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            #[allow(clippy::cast_possible_truncation)]
            Self::Number(n) if n.fract() == 0.0 && n.is_finite() => Some(*n as i64),
            Self::Number(_) | Self::Bool(_) => None,
            Self::Text(s) => {
                let s = s.trim();
                s.parse::<i64>().ok().or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|n| n.fract() == 0.0 && n.is_finite())
                        .map(|n| n as i64)
                })
            }
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) if n.fract() == 0.0 && n.is_finite() => write!(f, "{n:.0}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<u32> for Cell {
    fn from(value: u32) -> Self {
        Self::Number(f64::from(value))
    }
}

pub type Row = Vec<Cell>;

/// What a probe learns about the spreadsheet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetMetadata {
    pub title: String,
    pub sheets: Vec<String>,
}

/// Range-addressed access to a spreadsheet.
///
/// Ranges use A1 notation (`Reports!A2:H`). Implementations return
/// [`RemoteError`] with a classified code; retrying is the caller's concern.
#[async_trait]
pub trait SheetsBackend: Send + Sync {
    /// Read the values in `range`. Trailing empty rows and cells are omitted.
    async fn read_range(&self, range: &str) -> Result<Vec<Row>, RemoteError>;

    /// Overwrite the cells starting at the top-left of `range`.
    async fn write_range(&self, range: &str, rows: Vec<Row>) -> Result<(), RemoteError>;

    /// Append `rows` after the last non-empty row of the sheet in `range`.
    async fn append_rows(&self, range: &str, rows: Vec<Row>) -> Result<(), RemoteError>;

    /// Check that the spreadsheet is reachable and list its sheets.
    async fn probe(&self) -> Result<SheetMetadata, RemoteError>;

    fn name(&self) -> &str;
}
