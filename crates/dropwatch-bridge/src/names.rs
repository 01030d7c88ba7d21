//! Chat display-name resolution.
//!
//! Order: a name already stored for the chat, then a hint carried by the
//! event (history display name or push name), then the protocol client's
//! group subject or contact name, then a fallback built from the address.

use tracing::{debug, warn};

use dropwatch_shared::ChatId;

use crate::context::PipelineContext;

pub async fn resolve_chat_name(
    ctx: &PipelineContext,
    chat: &ChatId,
    sender: &str,
    hint: Option<&str>,
) -> String {
    let lookup = chat.clone();
    match ctx.with_db(move |db| db.get_chat_name(&lookup)).await {
        Ok(Some(name)) => return name,
        Ok(None) => {}
        Err(e) => warn!(chat = %chat, error = %e, "chat name lookup failed"),
    }

    if let Some(name) = hint.map(str::trim).filter(|n| !n.is_empty()) {
        debug!(chat = %chat, name, "using name from event");
        return name.to_string();
    }

    if chat.is_group() {
        match ctx.transport.group_name(chat).await {
            Ok(Some(name)) => return name,
            Ok(None) => {}
            Err(e) => warn!(chat = %chat, error = %e, "group info lookup failed"),
        }
        return format!("Group {}", chat.user());
    }

    match ctx.transport.contact_name(chat).await {
        Ok(Some(name)) => return name,
        Ok(None) => {}
        Err(e) => warn!(chat = %chat, error = %e, "contact lookup failed"),
    }

    if !sender.is_empty() {
        return sender.to_string();
    }
    chat.user().to_string()
}
