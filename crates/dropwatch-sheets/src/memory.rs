//! In-process [`SheetsBackend`].
//!
//! Reads mimic the Google API: trailing blank rows and trailing blank cells
//! are trimmed. Writes, validation copies and failures are observable so
//! callers can assert on exactly what reached the sheet. Stalled calls never
//! complete, which is how a hung remote looks to the caller.

use std::collections::{BTreeMap, HashMap};
use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::backend::{cell_text, CellRange, Row, SheetsBackend};
use crate::error::{Result, SheetError};

type Grid = BTreeMap<(u32, u32), Value>;

/// A recorded validation copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationCopy {
    pub worksheet: String,
    pub template_row: u32,
    pub target_row: u32,
    pub columns: Vec<Range<u32>>,
}

#[derive(Default)]
pub struct MemorySheets {
    // worksheet -> (row, col) -> value
    sheets: Mutex<HashMap<String, Grid>>,
    validations: Mutex<Vec<ValidationCopy>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
    fail_validation: AtomicBool,
    // value calls left to hang; usize::MAX means all of them
    stalls: AtomicUsize,
}

impl MemorySheets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty worksheet. Ranges naming an unknown worksheet fail
    /// with [`SheetError::UnknownWorksheet`].
    pub fn add_worksheet(&self, name: &str) {
        self.grids().entry(name.to_string()).or_default();
    }

    pub fn set_cell(&self, worksheet: &str, row: u32, col: u32, value: Value) {
        self.grids()
            .entry(worksheet.to_string())
            .or_default()
            .insert((row, col), value);
    }

    pub fn cell(&self, worksheet: &str, row: u32, col: u32) -> Option<Value> {
        self.grids()
            .get(worksheet)
            .and_then(|grid| grid.get(&(row, col)).cloned())
    }

    /// Cells `0..width` of a row; blanks are `Value::Null`.
    pub fn row(&self, worksheet: &str, row: u32, width: u32) -> Vec<Value> {
        (0..width)
            .map(|col| self.cell(worksheet, row, col).unwrap_or(Value::Null))
            .collect()
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn validation_copies(&self) -> Vec<ValidationCopy> {
        self.validations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_validation(&self, fail: bool) {
        self.fail_validation.store(fail, Ordering::SeqCst);
    }

    /// Hang every value read and write until cleared.
    pub fn set_stall(&self, stall: bool) {
        let calls = if stall { usize::MAX } else { 0 };
        self.stalls.store(calls, Ordering::SeqCst);
    }

    /// Hang only the next `calls` value reads or writes.
    pub fn stall_next(&self, calls: usize) {
        self.stalls.store(calls, Ordering::SeqCst);
    }

    async fn maybe_stall(&self) {
        let stalled = self
            .stalls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                usize::MAX => Some(usize::MAX),
                n => Some(n - 1),
            })
            .is_ok();
        if stalled {
            std::future::pending::<()>().await;
        }
    }

    fn grids(&self) -> std::sync::MutexGuard<'_, HashMap<String, Grid>> {
        self.sheets.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn is_blank(value: &Value) -> bool {
    cell_text(value).is_empty()
}

#[async_trait]
impl SheetsBackend for MemorySheets {
    async fn get_values(&self, range: &CellRange) -> Result<Vec<Row>> {
        self.maybe_stall().await;
        let sheets = self.grids();
        let grid = sheets
            .get(&range.worksheet)
            .ok_or_else(|| SheetError::UnknownWorksheet(range.worksheet.clone()))?;

        let last_row = match range.last_row {
            Some(row) => row,
            None => grid.keys().map(|(row, _)| *row).max().unwrap_or(0),
        };

        let mut rows: Vec<Row> = Vec::new();
        for r in range.first_row..=last_row {
            let mut row: Row = (range.first_col..=range.last_col)
                .map(|c| grid.get(&(r, c)).cloned().unwrap_or(Value::Null))
                .collect();
            while row.last().map_or(false, is_blank) {
                row.pop();
            }
            rows.push(row);
        }
        while rows.last().map_or(false, |r| r.is_empty()) {
            rows.pop();
        }
        Ok(rows)
    }

    async fn update_values(&self, range: &CellRange, rows: Vec<Row>) -> Result<()> {
        self.maybe_stall().await;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SheetError::Api {
                status: 503,
                message: "backend unavailable".into(),
            });
        }

        let mut sheets = self.grids();
        let grid = sheets
            .get_mut(&range.worksheet)
            .ok_or_else(|| SheetError::UnknownWorksheet(range.worksheet.clone()))?;

        for (dr, row) in rows.into_iter().enumerate() {
            for (dc, value) in row.into_iter().enumerate() {
                grid.insert((range.first_row + dr as u32, range.first_col + dc as u32), value);
            }
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn copy_validation(
        &self,
        worksheet: &str,
        template_row: u32,
        target_row: u32,
        columns: &[Range<u32>],
    ) -> Result<()> {
        if self.fail_validation.load(Ordering::SeqCst) {
            return Err(SheetError::Api {
                status: 400,
                message: "validation copy rejected".into(),
            });
        }
        self.validations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ValidationCopy {
                worksheet: worksheet.to_string(),
                template_row,
                target_row,
                columns: columns.to_vec(),
            });
        Ok(())
    }
}
