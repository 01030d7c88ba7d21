//! Drop-number processing for one message.

use chrono::{DateTime, Utc};
use tracing::debug;

use dropwatch_shared::ChatId;

use crate::context::PipelineContext;
use crate::lifecycle::{handle_completion, handle_new_submission, DropOutcome};

/// Route every drop number in `text` to the lifecycle.
///
/// Untracked chats and texts without drop numbers produce nothing. A
/// completion-bearing text takes the completion path for all of its drop
/// numbers and never allocates rows. A drop number repeated within one text
/// is handled once.
pub async fn process_text(
    ctx: &PipelineContext,
    chat: &ChatId,
    sender: &str,
    text: &str,
    at: DateTime<Utc>,
) -> Vec<DropOutcome> {
    let Some(project) = ctx.config.project_for_chat(chat) else {
        debug!(chat = %chat, "chat is not mapped to a project");
        return Vec::new();
    };

    let mut drops = ctx.matcher.extract_identifiers(text);
    if drops.is_empty() {
        return Vec::new();
    }
    let mut seen = std::collections::HashSet::new();
    drops.retain(|d| seen.insert(d.clone()));

    let completion = ctx.matcher.is_completion_message(text);
    debug!(
        chat = %chat,
        project = %project.name,
        drops = ?drops,
        completion,
        "drop numbers detected"
    );

    let mut outcomes = Vec::with_capacity(drops.len());
    for drop_number in &drops {
        let outcome = if completion {
            handle_completion(ctx, project, drop_number, sender, at).await
        } else {
            handle_new_submission(ctx, project, drop_number, sender, at).await
        };
        outcomes.push(outcome);
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::DropAction;
    use crate::testing::*;
    use dropwatch_sheets::layout::COL_DROP;
    use dropwatch_store::ReviewUpsert;

    #[tokio::test]
    async fn untracked_chat_does_nothing() {
        let (ctx, env) = test_context(RecordingTransport::default());
        let outcomes = process_text(&ctx, &ChatId::new("5@g.us"), "a", "DR1", at(9, 0)).await;
        assert!(outcomes.is_empty());
        assert_eq!(env.sheets.write_count(), 0);
    }

    #[tokio::test]
    async fn text_without_drops_does_nothing() {
        let (ctx, env) = test_context(RecordingTransport::default());
        let outcomes =
            process_text(&ctx, &ChatId::new(VELO_CHAT), "a", "all done here", at(9, 0)).await;
        assert!(outcomes.is_empty());
        assert_eq!(env.sheets.write_count(), 0);
    }

    #[tokio::test]
    async fn each_drop_gets_its_own_row_in_order() {
        let (ctx, env) = test_context(RecordingTransport::default());
        let outcomes = process_text(
            &ctx,
            &ChatId::new(VELO_CHAT),
            "agent",
            "dr100 and DR200 and dr100 again",
            at(9, 0),
        )
        .await;

        let drops: Vec<_> = outcomes.iter().map(|o| o.drop_number.as_str()).collect();
        assert_eq!(drops, vec!["DR100", "DR200"]);
        assert!(outcomes.iter().all(|o| matches!(
            o.action,
            DropAction::NewSubmission { review: Some(ReviewUpsert::Created), .. }
        )));
        assert_eq!(env.sheets.cell(VELO_TAB, 17, COL_DROP), Some(serde_json::json!("DR100")));
        assert_eq!(env.sheets.cell(VELO_TAB, 18, COL_DROP), Some(serde_json::json!("DR200")));
    }

    #[tokio::test]
    async fn timed_out_drop_does_not_block_the_next() {
        let (ctx, env) = test_context_with_timeouts(
            RecordingTransport::default(),
            5,
            std::time::Duration::from_millis(100),
        );
        env.sheets.stall_next(1);

        let outcomes =
            process_text(&ctx, &ChatId::new(VELO_CHAT), "agent", "DR100 DR200", at(9, 0)).await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(
            outcomes[0].action,
            DropAction::NewSubmission {
                review: Some(ReviewUpsert::Created),
                row: None,
                resubmitted: None,
            }
        );
        assert_eq!(
            outcomes[1].action,
            DropAction::NewSubmission {
                review: Some(ReviewUpsert::Created),
                row: Some(17),
                resubmitted: None,
            }
        );
        assert_eq!(env.sheets.cell(VELO_TAB, 17, COL_DROP), Some(serde_json::json!("DR200")));
        let kept = ctx.with_db(|db| db.reviews_for_drop("DR100")).await.unwrap();
        assert_eq!(kept.len(), 1);
    }

    #[tokio::test]
    async fn completion_never_allocates() {
        let (ctx, env) = test_context(RecordingTransport::default());
        let outcomes =
            process_text(&ctx, &ChatId::new(VELO_CHAT), "agent", "DR77 done", at(9, 0)).await;

        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0].action, DropAction::Completion { .. }));
        assert_eq!(env.sheets.write_count(), 0);
        let reviews = ctx.with_db(|db| db.reviews_for_drop("DR77")).await.unwrap();
        assert!(reviews.is_empty());
    }
}
