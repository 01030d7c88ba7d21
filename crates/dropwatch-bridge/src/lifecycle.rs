//! Review lifecycle for one drop number.
//!
//! A new submission creates (or reopens) the review for the message's day and
//! mirrors it into the project worksheet. A reopened review whose drop has no
//! sheet row yet (an earlier write failed) gets its row written now, so a
//! redelivered message repairs the sheet. A completion reopens the latest
//! review and flips the resubmitted cell of the existing sheet row. The store
//! and the sheet are independent: a sheet failure never rolls back the review.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use dropwatch_shared::ProjectConfig;
use dropwatch_sheets::{NewRow, ResubmitOutcome};
use dropwatch_store::{NewReview, ReviewUpsert};

use crate::context::PipelineContext;

/// What happened to one drop number. `None` fields mean that step failed
/// and was logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum DropAction {
    NewSubmission {
        review: Option<ReviewUpsert>,
        /// Row written for this drop, either for a created review or for a
        /// reopened one that had no row.
        row: Option<u32>,
        /// Sheet update for a same-day repeat, which reopens instead.
        resubmitted: Option<ResubmitOutcome>,
    },
    Completion {
        reopened: bool,
        sheet: Option<ResubmitOutcome>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DropOutcome {
    pub drop_number: String,
    pub action: DropAction,
}

pub async fn handle_new_submission(
    ctx: &PipelineContext,
    project: &ProjectConfig,
    drop_number: &str,
    sender: &str,
    at: DateTime<Utc>,
) -> DropOutcome {
    let submitter = ctx.submitter_label(sender);
    let review = NewReview {
        drop_number: drop_number.to_string(),
        review_date: ctx.review_date(at),
        project: project.name.clone(),
        submitter: submitter.clone(),
    };

    let upsert = {
        let review = review.clone();
        ctx.with_db(move |db| db.upsert_review(&review, Utc::now())).await
    };

    let outcome = match upsert {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(drop = drop_number, project = %project.name, error = %e, "failed to upsert review");
            return DropOutcome {
                drop_number: drop_number.to_string(),
                action: DropAction::NewSubmission {
                    review: None,
                    row: None,
                    resubmitted: None,
                },
            };
        }
    };

    let new_row = NewRow {
        date: review.review_date,
        drop_number: drop_number.to_string(),
        submitter,
    };
    let (row, resubmitted) = match outcome {
        ReviewUpsert::Created => (write_row(ctx, project, &new_row).await, None),
        // One row per drop: flip the existing row, and only write one when
        // the sheet has none.
        ReviewUpsert::Reopened => match flip_resubmitted(ctx, project, drop_number).await {
            Some(ResubmitOutcome::NotFound) => {
                info!(drop = drop_number, "reopened review has no sheet row, writing it");
                (
                    write_row(ctx, project, &new_row).await,
                    Some(ResubmitOutcome::NotFound),
                )
            }
            other => (None, other),
        },
    };

    info!(
        drop = drop_number,
        sender,
        project = %project.name,
        outcome = ?outcome,
        row = ?row,
        "processed drop number"
    );

    DropOutcome {
        drop_number: drop_number.to_string(),
        action: DropAction::NewSubmission {
            review: Some(outcome),
            row,
            resubmitted,
        },
    }
}

pub async fn handle_completion(
    ctx: &PipelineContext,
    project: &ProjectConfig,
    drop_number: &str,
    sender: &str,
    at: DateTime<Utc>,
) -> DropOutcome {
    let submitter = ctx.submitter_label(sender);

    let reopened = {
        let drop = drop_number.to_string();
        ctx.with_db(move |db| db.reopen_latest_review(&drop, &submitter, Utc::now()))
            .await
    };

    let reopened = match reopened {
        Ok(Some(record)) => {
            info!(
                drop = drop_number,
                review_date = %record.review_date,
                message_at = %at,
                "review reopened"
            );
            true
        }
        Ok(None) => {
            warn!(drop = drop_number, "completion for a drop with no review record");
            false
        }
        Err(e) => {
            error!(drop = drop_number, error = %e, "failed to reopen review");
            false
        }
    };

    let sheet = flip_resubmitted(ctx, project, drop_number).await;

    DropOutcome {
        drop_number: drop_number.to_string(),
        action: DropAction::Completion { reopened, sheet },
    }
}

async fn write_row(ctx: &PipelineContext, project: &ProjectConfig, row: &NewRow) -> Option<u32> {
    match ctx.sheets.write_new_row(&project.worksheet, row).await {
        Ok(number) => Some(number),
        Err(e) => {
            error!(
                drop = %row.drop_number,
                worksheet = %project.worksheet,
                transient = e.is_transient(),
                error = %e,
                "failed to write sheet row; review is kept"
            );
            None
        }
    }
}

async fn flip_resubmitted(
    ctx: &PipelineContext,
    project: &ProjectConfig,
    drop_number: &str,
) -> Option<ResubmitOutcome> {
    match ctx.sheets.mark_resubmitted(&project.worksheet, drop_number).await {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            error!(
                drop = drop_number,
                worksheet = %project.worksheet,
                transient = e.is_transient(),
                error = %e,
                "failed to mark resubmission in sheet"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use dropwatch_sheets::layout::{COL_DROP, COL_RESUBMITTED};
    use serde_json::json;

    fn velo(ctx: &PipelineContext) -> ProjectConfig {
        ctx.config.project("Velo Test").unwrap().clone()
    }

    #[tokio::test]
    async fn new_submission_creates_review_and_row() {
        let (ctx, env) = test_context(RecordingTransport::default());
        let project = velo(&ctx);

        let outcome = handle_new_submission(&ctx, &project, "DR1", "27640000000", at(9, 0)).await;
        assert_eq!(
            outcome.action,
            DropAction::NewSubmission {
                review: Some(ReviewUpsert::Created),
                row: Some(17),
                resubmitted: None,
            }
        );
        assert_eq!(env.sheets.cell(VELO_TAB, 17, COL_DROP), Some(json!("DR1")));
    }

    #[tokio::test]
    async fn sheet_failure_keeps_review() {
        let (ctx, env) = test_context(RecordingTransport::default());
        env.sheets.set_fail_writes(true);
        let project = velo(&ctx);

        let outcome = handle_new_submission(&ctx, &project, "DR2", "agent", at(9, 0)).await;
        assert_eq!(
            outcome.action,
            DropAction::NewSubmission {
                review: Some(ReviewUpsert::Created),
                row: None,
                resubmitted: None,
            }
        );
        let reviews = ctx.with_db(|db| db.reviews_for_drop("DR2")).await.unwrap();
        assert_eq!(reviews.len(), 1);
    }

    #[tokio::test]
    async fn same_day_repeat_reopens_without_second_row() {
        let (ctx, env) = test_context(RecordingTransport::default());
        let project = velo(&ctx);

        handle_new_submission(&ctx, &project, "DR3", "agent", at(9, 0)).await;
        let second = handle_new_submission(&ctx, &project, "DR3", "agent", at(9, 5)).await;
        assert_eq!(
            second.action,
            DropAction::NewSubmission {
                review: Some(ReviewUpsert::Reopened),
                row: None,
                resubmitted: Some(ResubmitOutcome::Updated { row: 17 }),
            }
        );
        assert_eq!(env.sheets.cell(VELO_TAB, 18, COL_DROP), None);
        assert_eq!(env.sheets.cell(VELO_TAB, 17, COL_RESUBMITTED), Some(json!(true)));
    }

    #[tokio::test]
    async fn redelivery_writes_row_missed_by_failed_write() {
        let (ctx, env) = test_context(RecordingTransport::default());
        let project = velo(&ctx);

        env.sheets.set_fail_writes(true);
        let first = handle_new_submission(&ctx, &project, "DR8888888", "agent", at(9, 0)).await;
        assert_eq!(
            first.action,
            DropAction::NewSubmission {
                review: Some(ReviewUpsert::Created),
                row: None,
                resubmitted: None,
            }
        );

        env.sheets.set_fail_writes(false);
        let second = handle_new_submission(&ctx, &project, "DR8888888", "agent", at(9, 1)).await;
        assert_eq!(
            second.action,
            DropAction::NewSubmission {
                review: Some(ReviewUpsert::Reopened),
                row: Some(17),
                resubmitted: Some(ResubmitOutcome::NotFound),
            }
        );
        assert_eq!(env.sheets.cell(VELO_TAB, 17, COL_DROP), Some(json!("DR8888888")));

        // A third delivery finds the row and does not write another.
        let third = handle_new_submission(&ctx, &project, "DR8888888", "agent", at(9, 2)).await;
        assert_eq!(
            third.action,
            DropAction::NewSubmission {
                review: Some(ReviewUpsert::Reopened),
                row: None,
                resubmitted: Some(ResubmitOutcome::Updated { row: 17 }),
            }
        );
        assert_eq!(env.sheets.cell(VELO_TAB, 18, COL_DROP), None);
    }

    #[tokio::test]
    async fn completion_without_review_still_updates_sheet() {
        let (ctx, env) = test_context(RecordingTransport::default());
        env.sheets.set_cell(VELO_TAB, 30, COL_DROP, json!("DR4"));
        let project = velo(&ctx);

        let outcome = handle_completion(&ctx, &project, "DR4", "agent", at(10, 0)).await;
        assert_eq!(
            outcome.action,
            DropAction::Completion {
                reopened: false,
                sheet: Some(ResubmitOutcome::Updated { row: 30 }),
            }
        );
    }

    #[test]
    fn submitter_is_truncated() {
        let (ctx, _env) = test_context(RecordingTransport::default());
        assert_eq!(ctx.submitter_label("123456789012345678901234"), "12345678901234567890");
        assert_eq!(ctx.submitter_label("short"), "short");
    }
}
