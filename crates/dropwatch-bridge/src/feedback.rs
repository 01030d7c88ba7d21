//! QA feedback for reviews flagged incomplete.
//!
//! Each round lists incomplete reviews that have not had feedback yet, turns
//! the unchecked steps into a message, sends it to the project chat and
//! stamps `feedback_sent`. A resubmission clears the stamp, so a review gets
//! at most one message per round.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use dropwatch_store::ReviewRecord;

use crate::context::PipelineContext;
use crate::error::{BridgeError, Result};
use crate::transport::SendRequest;

/// What the generator is told about one review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QaGapSummary {
    pub drop_number: String,
    pub project: String,
    pub submitter: String,
    pub review_date: NaiveDate,
    pub missing_steps: Vec<String>,
}

impl From<&ReviewRecord> for QaGapSummary {
    fn from(review: &ReviewRecord) -> Self {
        Self {
            drop_number: review.drop_number.clone(),
            project: review.project.clone(),
            submitter: review.submitter.clone(),
            review_date: review.review_date,
            missing_steps: review.missing_steps().into_iter().map(String::from).collect(),
        }
    }
}

#[async_trait]
pub trait FeedbackGenerator: Send + Sync {
    async fn generate(&self, summary: &QaGapSummary) -> Result<String>;
}

/// Fixed wording, used when no external generator is configured.
pub struct TemplateFeedback;

#[async_trait]
impl FeedbackGenerator for TemplateFeedback {
    async fn generate(&self, summary: &QaGapSummary) -> Result<String> {
        let mut text = format!(
            "QA review for {} ({}) is incomplete.",
            summary.drop_number,
            summary.review_date.format("%Y-%m-%d")
        );
        if summary.missing_steps.is_empty() {
            text.push_str("\nPlease check the submitted photos and resubmit.");
        } else {
            text.push_str("\nMissing photos:");
            for step in &summary.missing_steps {
                text.push_str("\n- ");
                text.push_str(step);
            }
            text.push_str(&format!(
                "\nPlease send the missing photos and reply \"{} done\".",
                summary.drop_number
            ));
        }
        Ok(text)
    }
}

/// Posts the summary as JSON to an external text service and reads back
/// `{"text": "..."}`.
pub struct HttpFeedbackGenerator {
    client: Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct GeneratedText {
    text: String,
}

impl HttpFeedbackGenerator {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl FeedbackGenerator for HttpFeedbackGenerator {
    async fn generate(&self, summary: &QaGapSummary) -> Result<String> {
        let resp = self
            .client
            .post(&self.url)
            .json(summary)
            .send()
            .await
            .map_err(|e| BridgeError::Feedback(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(BridgeError::Feedback(format!("generator returned {status}")));
        }

        let body: GeneratedText = resp
            .json()
            .await
            .map_err(|e| BridgeError::Feedback(e.to_string()))?;
        if body.text.trim().is_empty() {
            return Err(BridgeError::Feedback("generator returned empty text".into()));
        }
        Ok(body.text)
    }
}

pub struct FeedbackService {
    ctx: PipelineContext,
    generator: Arc<dyn FeedbackGenerator>,
}

impl FeedbackService {
    pub fn new(ctx: PipelineContext, generator: Arc<dyn FeedbackGenerator>) -> Self {
        Self { ctx, generator }
    }

    /// One feedback round. Returns how many messages went out.
    pub async fn run_once(&self) -> Result<usize> {
        let pending = self.ctx.with_db(|db| db.pending_feedback(None)).await?;
        if pending.is_empty() {
            return Ok(0);
        }
        debug!(count = pending.len(), "reviews awaiting feedback");

        let mut sent = 0;
        for review in &pending {
            match self.send_feedback(review).await {
                Ok(true) => sent += 1,
                Ok(false) => {}
                Err(e) => warn!(
                    drop = %review.drop_number,
                    transient = e.is_transient(),
                    error = %e,
                    "feedback not sent"
                ),
            }
        }
        Ok(sent)
    }

    async fn send_feedback(&self, review: &ReviewRecord) -> Result<bool> {
        let Some(project) = self.ctx.config.project(&review.project) else {
            warn!(drop = %review.drop_number, project = %review.project, "review has no configured project");
            return Ok(false);
        };

        let summary = QaGapSummary::from(review);
        let timeout = self.ctx.timeout();
        let text = tokio::time::timeout(timeout, self.generator.generate(&summary))
            .await
            .map_err(|_| BridgeError::Timeout(timeout))??;

        let request = SendRequest {
            recipient: project.chat_id.to_string(),
            message: text,
            media_path: None,
        };
        let outcome = self.ctx.transport.send_message(&request).await?;
        if !outcome.success {
            warn!(drop = %review.drop_number, reason = %outcome.message, "feedback send refused");
            return Ok(false);
        }

        let id = review.id;
        self.ctx
            .with_db(move |db| db.mark_feedback_sent(id, Utc::now()))
            .await?;
        info!(
            drop = %review.drop_number,
            missing = summary.missing_steps.len(),
            "QA feedback sent"
        );
        Ok(true)
    }

    /// Run a round every `every` until the task is aborted.
    pub fn spawn(self, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.run_once().await {
                    warn!(error = %e, "feedback round failed");
                }
            }
        })
    }
}
