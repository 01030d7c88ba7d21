//! Sheet synchronizer.
//!
//! Two write modes:
//! - [`SheetSynchronizer::write_new_row`]: allocate a row, write the full
//!   A..X record, then copy checkbox validation from the template row
//! - [`SheetSynchronizer::mark_resubmitted`]: find an existing drop by
//!   scanning column B and flip only its resubmitted cell
//!
//! Both run under a per-worksheet lock so an allocation and the write that
//! follows it cannot interleave with another write to the same worksheet.
//! Different worksheets proceed concurrently.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{info, warn};

use dropwatch_shared::SheetLayout;

use crate::allocator::allocate_row;
use crate::backend::{cell_text, CellRange, SheetsBackend};
use crate::error::{Result, SheetError};
use crate::layout::{checkbox_spans, NewRow, COLUMN_COUNT, COL_DROP, COL_RESUBMITTED};

/// Result of a resubmission update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum ResubmitOutcome {
    Updated { row: u32 },
    NotFound,
}

pub struct SheetSynchronizer {
    backend: Arc<dyn SheetsBackend>,
    layout: SheetLayout,
    timeout: Duration,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SheetSynchronizer {
    pub fn new(backend: Arc<dyn SheetsBackend>, layout: SheetLayout, timeout: Duration) -> Self {
        Self {
            backend,
            layout,
            timeout,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn worksheet_lock(&self, worksheet: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(worksheet.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn timed<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| SheetError::Timeout(self.timeout))?
    }

    /// Allocate a row and write the initial record into it.
    ///
    /// Returns the 1-based row number. The validation copy is best-effort:
    /// once the values are written a failed copy is only logged.
    pub async fn write_new_row(&self, worksheet: &str, row: &NewRow) -> Result<u32> {
        let lock = self.worksheet_lock(worksheet).await;
        let _guard = lock.lock().await;

        let row_number =
            allocate_row(self.backend.as_ref(), worksheet, &self.layout, self.timeout).await?;

        let range = CellRange::new(worksheet, 0, COLUMN_COUNT - 1, row_number, row_number);
        self.timed(self.backend.update_values(&range, vec![row.to_values()]))
            .await?;

        info!(
            worksheet,
            row = row_number,
            drop = %row.drop_number,
            "wrote new sheet row"
        );

        let spans = checkbox_spans();
        if let Err(e) = self
            .timed(self.backend.copy_validation(
                worksheet,
                self.layout.template_row,
                row_number,
                &spans,
            ))
            .await
        {
            warn!(
                worksheet,
                row = row_number,
                error = %e,
                "checkbox format copy failed; row data is written"
            );
        }

        Ok(row_number)
    }

    /// Set the resubmitted cell of the row whose column B equals `drop_number`.
    ///
    /// First match wins. Every other cell of the row is left as it is.
    pub async fn mark_resubmitted(
        &self,
        worksheet: &str,
        drop_number: &str,
    ) -> Result<ResubmitOutcome> {
        let lock = self.worksheet_lock(worksheet).await;
        let _guard = lock.lock().await;

        let column = self
            .timed(self.backend.get_values(&CellRange::column(worksheet, COL_DROP)))
            .await?;

        let wanted = drop_number.trim();
        let Some(index) = column
            .iter()
            .position(|row| row.first().map_or(false, |v| cell_text(v) == wanted))
        else {
            warn!(worksheet, drop = wanted, "drop not found in worksheet");
            return Ok(ResubmitOutcome::NotFound);
        };

        let row = index as u32 + 1;
        self.timed(self.backend.update_values(
            &CellRange::cell(worksheet, COL_RESUBMITTED, row),
            vec![vec![Value::Bool(true)]],
        ))
        .await?;

        info!(worksheet, row, drop = wanted, "marked drop as resubmitted");
        Ok(ResubmitOutcome::Updated { row })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{STEP_COLUMNS, COL_DATE};
    use crate::memory::MemorySheets;
    use chrono::NaiveDate;
    use serde_json::json;

    const TAB: &str = "Velo Test";

    fn synchronizer(sheets: Arc<MemorySheets>) -> SheetSynchronizer {
        SheetSynchronizer::new(sheets, SheetLayout::default(), Duration::from_secs(5))
    }

    fn new_row(drop_number: &str) -> NewRow {
        NewRow {
            date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            drop_number: drop_number.into(),
            submitter: "agent1".into(),
        }
    }

    #[tokio::test]
    async fn new_row_lands_on_first_free_row_with_validation() {
        let sheets = Arc::new(MemorySheets::new());
        sheets.add_worksheet(TAB);
        for row in 17..=20 {
            sheets.set_cell(TAB, row, COL_DATE, json!("2026/02/28"));
        }
        let sync = synchronizer(sheets.clone());

        let row = sync.write_new_row(TAB, &new_row("DR8888888")).await.unwrap();
        assert_eq!(row, 21);
        assert_eq!(sheets.cell(TAB, 21, COL_DROP), Some(json!("DR8888888")));
        for col in STEP_COLUMNS {
            assert_eq!(sheets.cell(TAB, 21, col), Some(json!(false)));
        }

        let copies = sheets.validation_copies();
        assert_eq!(copies.len(), 1);
        assert_eq!(copies[0].template_row, 17);
        assert_eq!(copies[0].target_row, 21);
        assert_eq!(copies[0].columns, vec![2..16, 22..23]);
    }

    #[tokio::test]
    async fn validation_failure_does_not_fail_write() {
        let sheets = Arc::new(MemorySheets::new());
        sheets.add_worksheet(TAB);
        sheets.set_fail_validation(true);
        let sync = synchronizer(sheets.clone());

        let row = sync.write_new_row(TAB, &new_row("DR1")).await.unwrap();
        assert_eq!(row, 17);
        assert_eq!(sheets.cell(TAB, 17, COL_DROP), Some(json!("DR1")));
        assert!(sheets.validation_copies().is_empty());
    }

    #[tokio::test]
    async fn write_failure_is_reported() {
        let sheets = Arc::new(MemorySheets::new());
        sheets.add_worksheet(TAB);
        sheets.set_fail_writes(true);
        let sync = synchronizer(sheets.clone());

        let err = sync.write_new_row(TAB, &new_row("DR1")).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn hung_backend_times_out_and_releases_the_worksheet() {
        let sheets = Arc::new(MemorySheets::new());
        sheets.add_worksheet(TAB);
        sheets.set_stall(true);
        let sync = SheetSynchronizer::new(
            sheets.clone(),
            SheetLayout::default(),
            Duration::from_millis(100),
        );

        let started = std::time::Instant::now();
        let err = sync.write_new_row(TAB, &new_row("DR1")).await.unwrap_err();
        assert!(matches!(err, SheetError::Timeout(_)));
        assert!(err.is_transient());
        assert!(started.elapsed() < Duration::from_secs(2));

        let err = sync.mark_resubmitted(TAB, "DR1").await.unwrap_err();
        assert!(matches!(err, SheetError::Timeout(_)));

        sheets.set_stall(false);
        assert_eq!(sync.write_new_row(TAB, &new_row("DR1")).await.unwrap(), 17);
    }

    #[tokio::test]
    async fn concurrent_writes_get_distinct_rows() {
        let sheets = Arc::new(MemorySheets::new());
        sheets.add_worksheet(TAB);
        let sync = Arc::new(synchronizer(sheets.clone()));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let sync = sync.clone();
                tokio::spawn(async move { sync.write_new_row(TAB, &new_row(&format!("DR{i}"))).await })
            })
            .collect();

        let mut rows = Vec::new();
        for handle in handles {
            rows.push(handle.await.unwrap().unwrap());
        }
        rows.sort_unstable();
        assert_eq!(rows, (17..25).collect::<Vec<u32>>());
    }

    #[tokio::test]
    async fn resubmission_flips_only_the_resubmitted_cell() {
        let sheets = Arc::new(MemorySheets::new());
        sheets.add_worksheet(TAB);
        sheets.set_cell(TAB, 1, COL_DROP, json!("Drop Number"));
        sheets.set_cell(TAB, 40, COL_DATE, json!("2026/03/01"));
        sheets.set_cell(TAB, 40, COL_DROP, json!("DR123"));
        for col in STEP_COLUMNS {
            sheets.set_cell(TAB, 40, col, json!(col % 2 == 0));
        }
        sheets.set_cell(TAB, 40, 16, json!(7));
        sheets.set_cell(TAB, 40, 21, json!("QA note"));
        let before = sheets.row(TAB, 40, COLUMN_COUNT);

        let sync = synchronizer(sheets.clone());
        let outcome = sync.mark_resubmitted(TAB, "DR123").await.unwrap();
        assert_eq!(outcome, ResubmitOutcome::Updated { row: 40 });

        let after = sheets.row(TAB, 40, COLUMN_COUNT);
        assert_eq!(after[COL_RESUBMITTED as usize], json!(true));
        assert_eq!(after[..22], before[..22]);
        assert_eq!(after[23], before[23]);
    }

    #[tokio::test]
    async fn resubmission_for_unknown_drop_touches_nothing() {
        let sheets = Arc::new(MemorySheets::new());
        sheets.add_worksheet(TAB);
        sheets.set_cell(TAB, 40, COL_DROP, json!("DR123"));

        let sync = synchronizer(sheets.clone());
        let outcome = sync.mark_resubmitted(TAB, "DR999").await.unwrap();
        assert_eq!(outcome, ResubmitOutcome::NotFound);
        assert_eq!(sheets.write_count(), 0);
    }

    #[tokio::test]
    async fn resubmission_matches_trimmed_values_first_wins() {
        let sheets = Arc::new(MemorySheets::new());
        sheets.add_worksheet(TAB);
        sheets.set_cell(TAB, 18, COL_DROP, json!(" DR5 "));
        sheets.set_cell(TAB, 25, COL_DROP, json!("DR5"));

        let sync = synchronizer(sheets.clone());
        let outcome = sync.mark_resubmitted(TAB, "DR5").await.unwrap();
        assert_eq!(outcome, ResubmitOutcome::Updated { row: 18 });
        assert_eq!(sheets.cell(TAB, 25, COL_RESUBMITTED), None);
    }
}
