//! Fixed A..X column layout of a project worksheet.

use std::ops::Range;

use chrono::NaiveDate;
use serde_json::{json, Value};

use dropwatch_shared::constants::{INITIAL_SHEET_STATUS, REVIEW_STEP_COUNT};

use crate::backend::Row;

pub const COLUMN_COUNT: u32 = 24;

pub const COL_DATE: u32 = 0;
pub const COL_DROP: u32 = 1;
/// Step checkboxes occupy C..P.
pub const STEP_COLUMNS: Range<u32> = 2..2 + REVIEW_STEP_COUNT as u32;
pub const COL_COMPLETED_PHOTOS: u32 = 16;
pub const COL_OUTSTANDING_PHOTOS: u32 = 17;
pub const COL_SUBMITTER: u32 = 18;
pub const COL_STATUS: u32 = 19;
pub const COL_NOTES: u32 = 20;
pub const COL_COMMENT: u32 = 21;
pub const COL_RESUBMITTED: u32 = 22;
pub const COL_EXTRA_NOTES: u32 = 23;

/// Column spans that render as checkboxes and get validation copied from
/// the template row.
pub fn checkbox_spans() -> [Range<u32>; 2] {
    [STEP_COLUMNS, COL_RESUBMITTED..COL_RESUBMITTED + 1]
}

/// Initial values of a freshly allocated row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRow {
    pub date: NaiveDate,
    pub drop_number: String,
    pub submitter: String,
}

impl NewRow {
    pub fn to_values(&self) -> Row {
        let mut row: Row = Vec::with_capacity(COLUMN_COUNT as usize);
        row.push(json!(self.date.format("%Y/%m/%d").to_string()));
        row.push(json!(self.drop_number));
        row.extend(std::iter::repeat(Value::Bool(false)).take(REVIEW_STEP_COUNT));
        row.push(json!(0));
        row.push(json!(REVIEW_STEP_COUNT));
        row.push(json!(self.submitter));
        row.push(json!(INITIAL_SHEET_STATUS));
        row.push(json!(""));
        row.push(json!(""));
        row.push(Value::Bool(false));
        row.push(json!(""));
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_row_is_24_columns_in_order() {
        let row = NewRow {
            date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            drop_number: "DR8888888".into(),
            submitter: "27640000000".into(),
        }
        .to_values();

        assert_eq!(row.len(), COLUMN_COUNT as usize);
        assert_eq!(row[COL_DATE as usize], json!("2026/03/01"));
        assert_eq!(row[COL_DROP as usize], json!("DR8888888"));
        for col in STEP_COLUMNS {
            assert_eq!(row[col as usize], Value::Bool(false));
        }
        assert_eq!(row[COL_COMPLETED_PHOTOS as usize], json!(0));
        assert_eq!(row[COL_OUTSTANDING_PHOTOS as usize], json!(14));
        assert_eq!(row[COL_SUBMITTER as usize], json!("27640000000"));
        assert_eq!(row[COL_STATUS as usize], json!("Processing"));
        assert_eq!(row[COL_RESUBMITTED as usize], Value::Bool(false));
        assert_eq!(row[COL_EXTRA_NOTES as usize], json!(""));
    }
}
