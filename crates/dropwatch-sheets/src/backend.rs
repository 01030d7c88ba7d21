//! Backend seam for spreadsheet access.
//!
//! Cells travel as [`serde_json::Value`] so booleans and numbers keep their
//! type on the way in (value-semantics writes, never formulas) and come back
//! however the backend renders them.

use std::fmt;
use std::ops::Range;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// One row of cell values, left to right.
pub type Row = Vec<Value>;

/// A rectangular block of a worksheet. Columns are 0-based (`A` = 0), rows
/// are 1-based like the sheet UI. `last_row = None` runs to the end of the
/// worksheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellRange {
    pub worksheet: String,
    pub first_col: u32,
    pub last_col: u32,
    pub first_row: u32,
    pub last_row: Option<u32>,
}

impl CellRange {
    pub fn new(worksheet: &str, first_col: u32, last_col: u32, first_row: u32, last_row: u32) -> Self {
        Self {
            worksheet: worksheet.to_string(),
            first_col,
            last_col,
            first_row,
            last_row: Some(last_row),
        }
    }

    /// A whole column, from row 1 to the end of the worksheet.
    pub fn column(worksheet: &str, col: u32) -> Self {
        Self {
            worksheet: worksheet.to_string(),
            first_col: col,
            last_col: col,
            first_row: 1,
            last_row: None,
        }
    }

    pub fn cell(worksheet: &str, col: u32, row: u32) -> Self {
        Self::new(worksheet, col, col, row, row)
    }

    /// A1 notation with the worksheet name quoted, e.g. `'Velo Test'!A17:A100`.
    pub fn to_a1(&self) -> String {
        let sheet = self.worksheet.replace('\'', "''");
        let start = format!("{}{}", column_letter(self.first_col), self.first_row);
        let end = match self.last_row {
            Some(row) => format!("{}{}", column_letter(self.last_col), row),
            None => column_letter(self.last_col),
        };
        format!("'{sheet}'!{start}:{end}")
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1())
    }
}

/// Column letter for a 0-based index: 0 -> `A`, 25 -> `Z`, 26 -> `AA`.
pub fn column_letter(index: u32) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        letters.push((b'A' + rem) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Textual form of a cell used for comparisons: strings are trimmed,
/// booleans render as `TRUE`/`FALSE`, blanks as the empty string.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        other => other.to_string(),
    }
}

/// Read/write access to one spreadsheet.
///
/// Reads follow the Google Sheets convention: trailing empty rows and
/// trailing empty cells within a row are omitted, so a read may return fewer
/// rows than the range spans.
#[async_trait]
pub trait SheetsBackend: Send + Sync {
    async fn get_values(&self, range: &CellRange) -> Result<Vec<Row>>;

    /// Write `rows` starting at the top-left of `range`, storing values as
    /// given.
    async fn update_values(&self, range: &CellRange, rows: Vec<Row>) -> Result<()>;

    /// Copy data-validation rules (checkboxes) from `template_row` onto
    /// `target_row` for each span of 0-based columns.
    async fn copy_validation(
        &self,
        worksheet: &str,
        template_row: u32,
        target_row: u32,
        columns: &[Range<u32>],
    ) -> Result<()>;
}
