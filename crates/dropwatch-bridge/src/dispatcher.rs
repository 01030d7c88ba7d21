//! Event loop: one task drains the event channel and routes each event to
//! its handler, in arrival order.
//!
//! The protocol client (or the HTTP ingestion endpoint) pushes
//! [`ChatEvent`]s into the sender returned by [`spawn_dispatcher`]; the
//! connection state is published on a watch channel.

use std::collections::HashMap;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use dropwatch_media::extract_descriptor;
use dropwatch_shared::protocol::{Conversation, HistorySync, InboundMessage, Receipt};
use dropwatch_shared::{ChatEvent, ChatId, ConnectionState, HasDisplayName};
use dropwatch_store::StoredMessage;

use crate::context::PipelineContext;
use crate::drops::process_text;
use crate::error::Result;
use crate::names::resolve_chat_name;

pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Start the dispatcher task.
///
/// The task exits when every event sender has been dropped.
pub fn spawn_dispatcher(
    ctx: PipelineContext,
) -> (
    mpsc::Sender<ChatEvent>,
    watch::Receiver<ConnectionState>,
    JoinHandle<()>,
) {
    let (event_tx, mut event_rx) = mpsc::channel::<ChatEvent>(EVENT_CHANNEL_CAPACITY);
    let (state_tx, state_rx) = watch::channel(ConnectionState::default());

    let handle = tokio::spawn(async move {
        let mut dispatcher = Dispatcher::new(ctx, state_tx);
        info!("Dispatcher started");
        while let Some(event) = event_rx.recv().await {
            dispatcher.handle(event).await;
        }
        info!("Event channel closed, dispatcher stopping");
    });

    (event_tx, state_rx, handle)
}

pub struct Dispatcher {
    ctx: PipelineContext,
    state: watch::Sender<ConnectionState>,
}

impl Dispatcher {
    pub fn new(ctx: PipelineContext, state: watch::Sender<ConnectionState>) -> Self {
        Self { ctx, state }
    }

    /// Handle one event. Failures are logged; nothing here stops the loop.
    pub async fn handle(&mut self, event: ChatEvent) {
        debug!(kind = event.kind(), "event received");
        match event {
            ChatEvent::Message(msg) => self.on_message(msg).await,
            ChatEvent::Receipt(receipt) => self.on_receipt(receipt).await,
            ChatEvent::HistorySync(sync) => self.on_history_sync(sync).await,
            ChatEvent::Connecting => self.set_state(ConnectionState::Connecting),
            ChatEvent::Connected => self.set_state(ConnectionState::Connected),
            ChatEvent::Disconnected => self.set_state(ConnectionState::Disconnected),
            ChatEvent::LoggedOut => {
                warn!("Logged out; the protocol client must be paired again");
                self.set_state(ConnectionState::LoggedOut);
            }
            ChatEvent::Unknown => debug!("ignoring unsupported event"),
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            info!(from = previous.as_str(), to = state.as_str(), "connection state changed");
        }
    }

    // ------------------------------------------------------------------
    // Live messages
    // ------------------------------------------------------------------

    async fn on_message(&mut self, msg: InboundMessage) {
        let ctx = &self.ctx;
        if !ctx.config.is_monitored(&msg.chat) {
            debug!(chat = %msg.chat, id = %msg.id, "message from unmonitored chat dropped");
            return;
        }

        let name = resolve_chat_name(ctx, &msg.chat, &msg.sender, None).await;
        let project = ctx
            .config
            .project_for_chat(&msg.chat)
            .map(|p| p.name.clone());
        {
            let chat = msg.chat.clone();
            let at = msg.timestamp;
            if let Err(e) = ctx
                .with_db(move |db| db.upsert_chat(&chat, &name, at, project.as_deref()))
                .await
            {
                error!(chat = %msg.chat, error = %e, "failed to upsert chat");
            }
        }

        let text = msg.message.text().map(str::to_string);
        let media = extract_descriptor(&msg.message, Utc::now());
        if text.is_none() && media.is_none() {
            debug!(chat = %msg.chat, id = %msg.id, "message has no text or media");
            return;
        }

        let stored = StoredMessage {
            id: msg.id.clone(),
            chat_id: msg.chat.clone(),
            sender: msg.sender.clone(),
            content: text.clone(),
            timestamp: msg.timestamp,
            from_me: msg.from_me,
            media,
        };
        match ctx.with_db(move |db| db.store_message(&stored)).await {
            Ok(_) => debug!(chat = %msg.chat, id = %msg.id, "message stored"),
            Err(e) => error!(chat = %msg.chat, id = %msg.id, error = %e, "failed to store message"),
        }

        let Some(text) = text else {
            return;
        };
        // A redelivered completion is applied once. If the message could not
        // be stored there is no marker to check and it is applied anyway.
        if is_completion(ctx, &text) {
            let claim = claim_completion(ctx, &msg.chat, &msg.id).await;
            if matches!(claim, Ok(false)) {
                debug!(chat = %msg.chat, id = %msg.id, "completion already applied");
                return;
            }
        }
        process_text(&self.ctx, &msg.chat, &msg.sender, &text, msg.timestamp).await;
    }

    // ------------------------------------------------------------------
    // Receipts
    // ------------------------------------------------------------------

    /// A receipt carries no content. It is the cue to look back over the
    /// recent window for completion messages that were stored but never
    /// processed.
    async fn on_receipt(&mut self, receipt: Receipt) {
        let ctx = &self.ctx;
        if !ctx.config.is_monitored(&receipt.chat) {
            return;
        }

        let since = ChronoDuration::try_seconds(ctx.config.receipt_rescan_secs)
            .and_then(|window| receipt.timestamp.checked_sub_signed(window));
        let Some(since) = since else {
            warn!(
                chat = %receipt.chat,
                window_secs = ctx.config.receipt_rescan_secs,
                "receipt rescan window out of range"
            );
            return;
        };
        let limit = ctx.config.receipt_rescan_limit;
        let recent = {
            let chat = receipt.chat.clone();
            ctx.with_db(move |db| db.get_messages_since(&chat, since, limit))
                .await
        };
        let recent = match recent {
            Ok(recent) => recent,
            Err(e) => {
                warn!(chat = %receipt.chat, error = %e, "receipt rescan query failed");
                return;
            }
        };

        // Oldest first so notes land in message order.
        for msg in recent.into_iter().rev() {
            let Some(text) = msg.content.as_deref() else {
                continue;
            };
            if !is_completion(&self.ctx, text) {
                continue;
            }
            match claim_completion(&self.ctx, &msg.chat_id, &msg.id).await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    warn!(chat = %msg.chat_id, id = %msg.id, error = %e, "completion marker unavailable, skipping");
                    continue;
                }
            }
            info!(chat = %msg.chat_id, id = %msg.id, "unprocessed completion found on receipt");
            process_text(&self.ctx, &msg.chat_id, &msg.sender, text, msg.timestamp).await;
        }
    }

    // ------------------------------------------------------------------
    // History sync
    // ------------------------------------------------------------------

    /// Bulk-store replayed history. Drop numbers are never processed here;
    /// replaying old submissions would allocate rows twice.
    async fn on_history_sync(&mut self, sync: HistorySync) {
        let pushnames: HashMap<&str, &str> = sync
            .pushnames
            .iter()
            .filter_map(|p| p.display_name().map(|name| (p.id.as_str(), name)))
            .collect();

        let mut total = 0usize;
        for conv in &sync.conversations {
            total += self.sync_conversation(conv, &pushnames).await;
        }
        info!(
            conversations = sync.conversations.len(),
            stored = total,
            "history sync processed"
        );
    }

    async fn sync_conversation(&self, conv: &Conversation, pushnames: &HashMap<&str, &str>) -> usize {
        let ctx = &self.ctx;
        let Some(chat) = conv.id.as_deref().filter(|id| !id.is_empty()).map(ChatId::new) else {
            return 0;
        };
        if !ctx.config.is_monitored(&chat) {
            debug!(chat = %chat, "history for unmonitored chat skipped");
            return 0;
        }

        let own_user = ctx.transport.own_user();
        let mut messages = Vec::with_capacity(conv.messages.len());
        for hist in &conv.messages {
            let Some(key) = hist.key.as_ref() else {
                continue;
            };
            let Some(id) = key.id.as_deref().filter(|id| !id.is_empty()) else {
                continue;
            };
            let Some(timestamp) = hist.timestamp() else {
                continue;
            };
            let Some(payload) = hist.message.as_ref() else {
                continue;
            };

            let from_me = key.from_me.unwrap_or(false);
            let sender = if from_me {
                own_user.clone().unwrap_or_else(|| chat.user().to_string())
            } else {
                key.participant
                    .as_deref()
                    .filter(|p| !p.is_empty())
                    .map(|p| ChatId::new(p).user().to_string())
                    .unwrap_or_else(|| chat.user().to_string())
            };

            messages.push(StoredMessage {
                id: id.to_string(),
                chat_id: chat.clone(),
                sender,
                content: payload.text().map(str::to_string),
                timestamp,
                from_me,
                media: extract_descriptor(payload, timestamp),
            });
        }

        let Some(latest) = messages.iter().map(|m| m.timestamp).max() else {
            debug!(chat = %chat, "history conversation has no usable messages");
            return 0;
        };

        let hint = conv.display_name().or_else(|| {
            if chat.is_group() {
                None
            } else {
                pushnames
                    .get(chat.as_str())
                    .or_else(|| pushnames.get(chat.user()))
                    .copied()
            }
        });
        let name = resolve_chat_name(ctx, &chat, "", hint).await;
        let project = ctx.config.project_for_chat(&chat).map(|p| p.name.clone());

        let lookup = chat.clone();
        let result = ctx
            .with_db(move |db| {
                db.upsert_chat(&lookup, &name, latest, project.as_deref())?;
                let mut stored = 0;
                for msg in &messages {
                    if db.store_message(msg)? {
                        stored += 1;
                    }
                }
                Ok(stored)
            })
            .await;

        match result {
            Ok(stored) => {
                debug!(chat = %chat, stored, "history conversation stored");
                stored
            }
            Err(e) => {
                error!(chat = %chat, error = %e, "failed to store history conversation");
                0
            }
        }
    }
}

fn is_completion(ctx: &PipelineContext, text: &str) -> bool {
    ctx.matcher.is_completion_message(text)
}

/// Marks a stored completion message as applied. `Ok(true)` means the
/// caller owns it and must process it now.
async fn claim_completion(ctx: &PipelineContext, chat: &ChatId, id: &str) -> Result<bool> {
    let chat = chat.clone();
    let id = id.to_string();
    ctx.with_db(move |db| db.mark_completion_handled(&id, &chat, Utc::now()))
        .await
}
