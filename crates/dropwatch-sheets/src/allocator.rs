//! First-free-row discovery.
//!
//! A row is free when its column A cell is blank. The allocator reads
//! `scan_window` rows at a time starting at `data_start_row`. Because reads
//! omit trailing blank rows, a short read means everything past it is free.
//! The scan stops at `max_row`; a worksheet populated all the way to the
//! ceiling is reported as full rather than overwriting a row.

use std::time::Duration;

use tracing::{debug, warn};

use dropwatch_shared::SheetLayout;

use crate::backend::{cell_text, CellRange, SheetsBackend};
use crate::error::{Result, SheetError};
use crate::layout::COL_DATE;

pub async fn allocate_row(
    backend: &dyn SheetsBackend,
    worksheet: &str,
    layout: &SheetLayout,
    timeout: Duration,
) -> Result<u32> {
    let mut start = layout.data_start_row;

    while start <= layout.max_row {
        let end = start
            .saturating_add(layout.scan_window.saturating_sub(1))
            .min(layout.max_row);
        let range = CellRange::new(worksheet, COL_DATE, COL_DATE, start, end);

        let rows = tokio::time::timeout(timeout, backend.get_values(&range))
            .await
            .map_err(|_| SheetError::Timeout(timeout))??;

        if let Some(offset) = rows
            .iter()
            .position(|row| row.first().map_or(true, |v| cell_text(v).is_empty()))
        {
            let row = start + offset as u32;
            debug!(worksheet, row, "found empty row");
            return Ok(row);
        }

        let span = end - start + 1;
        if (rows.len() as u32) < span {
            let row = start + rows.len() as u32;
            debug!(worksheet, row, "found empty row after populated block");
            return Ok(row);
        }

        match end.checked_add(1) {
            Some(next) => start = next,
            None => break,
        }
    }

    warn!(
        worksheet,
        max_row = layout.max_row,
        "worksheet populated up to the row ceiling; refusing to allocate"
    );
    Err(SheetError::WorksheetFull {
        worksheet: worksheet.to_string(),
        max_row: layout.max_row,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySheets;
    use serde_json::json;

    const TAB: &str = "Velo Test";

    fn populate(sheets: &MemorySheets, rows: std::ops::RangeInclusive<u32>) {
        for row in rows {
            sheets.set_cell(TAB, row, 0, json!("2026/03/01"));
            sheets.set_cell(TAB, row, 1, json!(format!("DR{row}")));
        }
    }

    fn timeout() -> Duration {
        Duration::from_secs(5)
    }

    #[tokio::test]
    async fn returns_first_row_after_populated_block() {
        let sheets = MemorySheets::new();
        sheets.add_worksheet(TAB);
        populate(&sheets, 17..=20);

        let row = allocate_row(&sheets, TAB, &SheetLayout::default(), timeout())
            .await
            .unwrap();
        assert_eq!(row, 21);
    }

    #[tokio::test]
    async fn empty_worksheet_starts_at_data_row() {
        let sheets = MemorySheets::new();
        sheets.add_worksheet(TAB);
        let row = allocate_row(&sheets, TAB, &SheetLayout::default(), timeout())
            .await
            .unwrap();
        assert_eq!(row, 17);
    }

    #[tokio::test]
    async fn reuses_gap_inside_window() {
        let sheets = MemorySheets::new();
        sheets.add_worksheet(TAB);
        populate(&sheets, 17..=30);
        sheets.set_cell(TAB, 23, 0, json!("  "));

        let row = allocate_row(&sheets, TAB, &SheetLayout::default(), timeout())
            .await
            .unwrap();
        assert_eq!(row, 23);
    }

    #[tokio::test]
    async fn full_first_window_continues_to_row_101() {
        let sheets = MemorySheets::new();
        sheets.add_worksheet(TAB);
        populate(&sheets, 17..=100);

        let row = allocate_row(&sheets, TAB, &SheetLayout::default(), timeout())
            .await
            .unwrap();
        assert_eq!(row, 101);
    }

    #[tokio::test]
    async fn later_window_is_scanned_not_overwritten() {
        let sheets = MemorySheets::new();
        sheets.add_worksheet(TAB);
        populate(&sheets, 17..=130);

        let row = allocate_row(&sheets, TAB, &SheetLayout::default(), timeout())
            .await
            .unwrap();
        assert_eq!(row, 131);
    }

    #[tokio::test]
    async fn full_worksheet_is_an_error() {
        let sheets = MemorySheets::new();
        sheets.add_worksheet(TAB);
        populate(&sheets, 17..=40);
        let layout = SheetLayout {
            scan_window: 10,
            max_row: 40,
            ..SheetLayout::default()
        };

        let err = allocate_row(&sheets, TAB, &layout, timeout()).await.unwrap_err();
        assert!(matches!(err, SheetError::WorksheetFull { max_row: 40, .. }));
    }

    #[tokio::test]
    async fn ceiling_at_last_representable_row_does_not_wrap() {
        let sheets = MemorySheets::new();
        sheets.add_worksheet(TAB);
        populate(&sheets, (u32::MAX - 1)..=u32::MAX);
        let layout = SheetLayout {
            data_start_row: u32::MAX - 1,
            scan_window: 84,
            max_row: u32::MAX,
            template_row: 17,
            ..SheetLayout::default()
        };

        let err = allocate_row(&sheets, TAB, &layout, timeout()).await.unwrap_err();
        assert!(matches!(err, SheetError::WorksheetFull { max_row: u32::MAX, .. }));
    }
}
