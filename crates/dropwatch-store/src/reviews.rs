//! QA review records, one per drop number per calendar day.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use dropwatch_shared::constants::REVIEW_STEP_COUNT;

use crate::database::{decode_date, decode_ts, encode_date, encode_ts, Database};
use crate::error::{Result, StoreError};
use crate::models::{NewReview, ReviewRecord, ReviewUpsert};

/// Step columns in display order. Index `i` here is step `i` of
/// [`ReviewRecord::steps`].
pub const STEP_COLUMNS: [&str; REVIEW_STEP_COUNT] = [
    "step_01_property_frontage",
    "step_02_location_before_install",
    "step_03_outside_cable_span",
    "step_04_home_entry_outside",
    "step_05_home_entry_inside",
    "step_06_fibre_entry_to_ont",
    "step_07_patched_labelled_drop",
    "step_08_work_area_completion",
    "step_09_ont_barcode_scan",
    "step_10_ups_serial_number",
    "step_11_powermeter_reading",
    "step_12_powermeter_at_ont",
    "step_13_active_broadband_light",
    "step_14_customer_signature",
];

const NOTE_TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// id, drop_number, review_date, project, submitter, 14 steps,
// incomplete, feedback_sent, comment, created_at, updated_at
fn select_columns() -> String {
    format!(
        "id, drop_number, review_date, project, submitter, {}, \
         incomplete, feedback_sent, comment, created_at, updated_at",
        STEP_COLUMNS.join(", ")
    )
}

/// Comment written on a freshly created review.
pub fn creation_note(now: DateTime<Utc>) -> String {
    format!("Auto-created from chat on {}", now.format(NOTE_TS_FORMAT))
}

/// Note appended to the comment each time a review is reopened.
pub fn resubmission_note(submitter: &str, now: DateTime<Utc>) -> String {
    format!(
        "\n--- RESUBMITTED {} ---\nPhotos updated by {}. QA can continue review.\n",
        now.format(NOTE_TS_FORMAT),
        submitter
    )
}

impl Database {
    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Create the review for `(drop_number, review_date)` or reopen it if it
    /// already exists.
    ///
    /// Reopening clears `incomplete` and `feedback_sent` and appends a
    /// resubmission note. The insert and the reopen run in one transaction
    /// against the `UNIQUE(drop_number, review_date)` constraint, so calling
    /// this twice never yields two rows.
    pub fn upsert_review(&mut self, review: &NewReview, now: DateTime<Utc>) -> Result<ReviewUpsert> {
        let tx = self.conn_mut().transaction()?;
        let now_str = encode_ts(&now);
        let date_str = encode_date(&review.review_date);

        let inserted = tx.execute(
            "INSERT INTO reviews (drop_number, review_date, project, submitter,
                                  incomplete, feedback_sent, comment, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 0, NULL, ?5, ?6, ?6)
             ON CONFLICT(drop_number, review_date) DO NOTHING",
            params![
                review.drop_number,
                date_str,
                review.project,
                review.submitter,
                creation_note(now),
                now_str,
            ],
        )?;

        let outcome = if inserted == 1 {
            ReviewUpsert::Created
        } else {
            tx.execute(
                "UPDATE reviews SET
                     incomplete = 0,
                     feedback_sent = NULL,
                     comment = comment || ?3,
                     updated_at = ?4
                 WHERE drop_number = ?1 AND review_date = ?2",
                params![
                    review.drop_number,
                    date_str,
                    resubmission_note(&review.submitter, now),
                    now_str,
                ],
            )?;
            ReviewUpsert::Reopened
        };

        tx.commit()?;

        tracing::info!(
            drop = %review.drop_number,
            date = %date_str,
            project = %review.project,
            outcome = ?outcome,
            "review upserted"
        );
        Ok(outcome)
    }

    /// Reopen the most recent review of `drop_number`, whatever its date.
    ///
    /// Returns the updated record, or `None` when the drop has never been
    /// reviewed.
    pub fn reopen_latest_review(
        &self,
        drop_number: &str,
        submitter: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ReviewRecord>> {
        let latest: Option<i64> = self
            .conn()
            .query_row(
                "SELECT id FROM reviews
                 WHERE drop_number = ?1
                 ORDER BY review_date DESC, id DESC
                 LIMIT 1",
                params![drop_number],
                |row| row.get(0),
            )
            .optional()?;

        let Some(id) = latest else {
            return Ok(None);
        };

        self.conn().execute(
            "UPDATE reviews SET
                 incomplete = 0,
                 feedback_sent = NULL,
                 comment = comment || ?2,
                 updated_at = ?3
             WHERE id = ?1",
            params![id, resubmission_note(submitter, now), encode_ts(&now)],
        )?;

        self.get_review_by_id(id).map(Some)
    }

    // ------------------------------------------------------------------
    // QA updates
    // ------------------------------------------------------------------

    /// Flag (or unflag) a review as missing photos.
    pub fn mark_incomplete(&self, id: i64, incomplete: bool, now: DateTime<Utc>) -> Result<()> {
        let changed = self.conn().execute(
            "UPDATE reviews SET incomplete = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, incomplete as i32, encode_ts(&now)],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Tick or untick one of the fixed review steps (0-based).
    pub fn set_step(&self, id: i64, step: usize, done: bool, now: DateTime<Utc>) -> Result<()> {
        let column = STEP_COLUMNS.get(step).ok_or(StoreError::InvalidStep(step))?;
        let sql = format!("UPDATE reviews SET {column} = ?2, updated_at = ?3 WHERE id = ?1");
        let changed = self
            .conn()
            .execute(&sql, params![id, done as i32, encode_ts(&now)])?;
        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    pub fn mark_feedback_sent(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        let changed = self.conn().execute(
            "UPDATE reviews SET feedback_sent = ?2, updated_at = ?2 WHERE id = ?1",
            params![id, encode_ts(&at)],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_review(
        &self,
        drop_number: &str,
        review_date: chrono::NaiveDate,
    ) -> Result<Option<ReviewRecord>> {
        let sql = format!(
            "SELECT {} FROM reviews WHERE drop_number = ?1 AND review_date = ?2",
            select_columns()
        );
        let record = self
            .conn()
            .query_row(
                &sql,
                params![drop_number, encode_date(&review_date)],
                row_to_review,
            )
            .optional()?;
        Ok(record)
    }

    pub fn get_review_by_id(&self, id: i64) -> Result<ReviewRecord> {
        let sql = format!("SELECT {} FROM reviews WHERE id = ?1", select_columns());
        self.conn()
            .query_row(&sql, params![id], row_to_review)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// All reviews of a drop number, newest day first.
    pub fn reviews_for_drop(&self, drop_number: &str) -> Result<Vec<ReviewRecord>> {
        let sql = format!(
            "SELECT {} FROM reviews WHERE drop_number = ?1 ORDER BY review_date DESC, id DESC",
            select_columns()
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params![drop_number], row_to_review)?;

        let mut reviews = Vec::new();
        for row in rows {
            reviews.push(row?);
        }
        Ok(reviews)
    }

    /// Incomplete reviews that have not had feedback sent yet, oldest first.
    pub fn pending_feedback(&self, project: Option<&str>) -> Result<Vec<ReviewRecord>> {
        let sql = format!(
            "SELECT {} FROM reviews
             WHERE incomplete = 1 AND feedback_sent IS NULL
               AND (?1 IS NULL OR project = ?1)
             ORDER BY updated_at ASC, id ASC",
            select_columns()
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params![project], row_to_review)?;

        let mut reviews = Vec::new();
        for row in rows {
            reviews.push(row?);
        }
        Ok(reviews)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn row_to_review(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReviewRecord> {
    let id: i64 = row.get(0)?;
    let drop_number: String = row.get(1)?;
    let date_str: String = row.get(2)?;
    let project: String = row.get(3)?;
    let submitter: String = row.get(4)?;

    let mut steps = [false; REVIEW_STEP_COUNT];
    for (i, step) in steps.iter_mut().enumerate() {
        let raw: i32 = row.get(5 + i)?;
        *step = raw != 0;
    }

    let base = 5 + REVIEW_STEP_COUNT;
    let incomplete: i32 = row.get(base)?;
    let feedback_str: Option<String> = row.get(base + 1)?;
    let comment: String = row.get(base + 2)?;
    let created_str: String = row.get(base + 3)?;
    let updated_str: String = row.get(base + 4)?;

    Ok(ReviewRecord {
        id,
        drop_number,
        review_date: decode_date(2, &date_str)?,
        project,
        submitter,
        steps,
        incomplete: incomplete != 0,
        feedback_sent: feedback_str
            .map(|s| decode_ts(base + 1, &s))
            .transpose()?,
        comment,
        created_at: decode_ts(base + 3, &created_str)?,
        updated_at: decode_ts(base + 4, &updated_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, TimeZone};

    fn test_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("reviews.db")).unwrap();
        (db, dir)
    }

    fn new_review(drop_number: &str, date: NaiveDate) -> NewReview {
        NewReview {
            drop_number: drop_number.into(),
            review_date: date,
            project: "Velo Test".into(),
            submitter: "agent1".into(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    #[test]
    fn upsert_twice_yields_one_reopened_record() {
        let (mut db, _dir) = test_db();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let review = new_review("DR900", today());

        assert_eq!(db.upsert_review(&review, now).unwrap(), ReviewUpsert::Created);
        let created = db.get_review("DR900", today()).unwrap().unwrap();
        assert_eq!(created.steps, [false; REVIEW_STEP_COUNT]);
        assert!(!created.incomplete);
        assert!(created.comment.starts_with("Auto-created"));

        db.mark_incomplete(created.id, true, now).unwrap();
        db.mark_feedback_sent(created.id, now).unwrap();

        let later = now + Duration::minutes(5);
        assert_eq!(db.upsert_review(&review, later).unwrap(), ReviewUpsert::Reopened);

        let all = db.reviews_for_drop("DR900").unwrap();
        assert_eq!(all.len(), 1);
        let reopened = &all[0];
        assert_eq!(reopened.id, created.id);
        assert!(!reopened.incomplete);
        assert!(reopened.feedback_sent.is_none());
        assert!(reopened.comment.contains("--- RESUBMITTED 2026-03-01 09:05:00 ---"));
        assert!(reopened.comment.contains("Photos updated by agent1."));
        assert_eq!(reopened.updated_at, later);
    }

    #[test]
    fn different_day_is_a_distinct_record() {
        let (mut db, _dir) = test_db();
        let now = Utc::now();
        let tomorrow = today().succ_opt().unwrap();
        db.upsert_review(&new_review("DR1", today()), now).unwrap();
        assert_eq!(
            db.upsert_review(&new_review("DR1", tomorrow), now).unwrap(),
            ReviewUpsert::Created
        );
        assert_eq!(db.reviews_for_drop("DR1").unwrap().len(), 2);
    }

    #[test]
    fn reopen_latest_targets_newest_day() {
        let (mut db, _dir) = test_db();
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let tomorrow = today().succ_opt().unwrap();
        db.upsert_review(&new_review("DR7", today()), now).unwrap();
        db.upsert_review(&new_review("DR7", tomorrow), now).unwrap();
        for r in db.reviews_for_drop("DR7").unwrap() {
            db.mark_incomplete(r.id, true, now).unwrap();
        }

        let reopened = db.reopen_latest_review("DR7", "agent2", now).unwrap().unwrap();
        assert_eq!(reopened.review_date, tomorrow);
        assert!(!reopened.incomplete);

        let older = db.get_review("DR7", today()).unwrap().unwrap();
        assert!(older.incomplete);

        assert!(db.reopen_latest_review("DR404", "agent2", now).unwrap().is_none());
    }

    #[test]
    fn pending_feedback_filters_sent_and_project() {
        let (mut db, _dir) = test_db();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        db.upsert_review(&new_review("DR1", today()), now).unwrap();
        db.upsert_review(&new_review("DR2", today()), now).unwrap();
        let mut other = new_review("DR3", today());
        other.project = "Lawley".into();
        db.upsert_review(&other, now).unwrap();

        for drop in ["DR1", "DR2", "DR3"] {
            let r = db.get_review(drop, today()).unwrap().unwrap();
            db.mark_incomplete(r.id, true, now).unwrap();
        }
        let dr2 = db.get_review("DR2", today()).unwrap().unwrap();
        db.mark_feedback_sent(dr2.id, now).unwrap();

        let pending: Vec<_> = db
            .pending_feedback(Some("Velo Test"))
            .unwrap()
            .into_iter()
            .map(|r| r.drop_number)
            .collect();
        assert_eq!(pending, vec!["DR1"]);
        assert_eq!(db.pending_feedback(None).unwrap().len(), 2);
    }

    #[test]
    fn set_step_updates_single_column() {
        let (mut db, _dir) = test_db();
        let now = Utc::now();
        db.upsert_review(&new_review("DR5", today()), now).unwrap();
        let r = db.get_review("DR5", today()).unwrap().unwrap();

        db.set_step(r.id, 3, true, now).unwrap();
        let r = db.get_review_by_id(r.id).unwrap();
        assert!(r.steps[3]);
        assert_eq!(r.completed_steps(), 1);
        assert_eq!(r.missing_steps().len(), REVIEW_STEP_COUNT - 1);
        assert!(!r.missing_steps().contains(&"Home entry outside"));

        assert!(matches!(
            db.set_step(r.id, REVIEW_STEP_COUNT, true, now),
            Err(StoreError::InvalidStep(14))
        ));
    }
}
