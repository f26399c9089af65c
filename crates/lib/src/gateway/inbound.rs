//! Handling of one channel event: owner commands, self messages, group filtering, then the reply engine.

use crate::channels::InboundEvent;
use crate::commands;
use crate::conversation::ChannelConvKey;
use crate::engine::{InboundMessage, ReplyDecision};
use crate::gateway::server::GatewayState;
use crate::history::HistoryEntry;

/// Process one inbound channel event.
///
/// - Owner messages starting with `/` are commands; known ones are applied and confirmed in the same chat.
/// - Other owner messages only go into the conversation window.
/// - Group messages are skipped unless `channels.replyToGroups` is set.
/// - Everything else is recorded and handed to the engine; a generated reply is sent back and recorded.
///
/// Engine failures are logged and nothing is sent.
pub async fn process_inbound_event(state: GatewayState, ev: InboundEvent) {
    let key = ChannelConvKey::new(&ev.channel_id, &ev.conversation_id);

    if ev.from_self {
        match commands::parse_chat_command(&ev.text) {
            Some(Some(cmd)) => {
                log::info!("inbound: owner command on {}: {}", ev.channel_id, ev.text.trim());
                if let Some(confirmation) = commands::apply(&state.status, &cmd).await {
                    deliver(&state, &ev, &confirmation).await;
                }
            }
            Some(None) => {
                log::debug!("inbound: ignoring unknown owner command {}", ev.text.trim());
            }
            None => {
                state.conversations.record(&key, HistoryEntry::me(&ev.text)).await;
            }
        }
        return;
    }

    if ev.is_group && !state.config.channels.reply_to_groups {
        log::debug!(
            "inbound: skipping group message in {}/{}",
            ev.channel_id,
            ev.conversation_id
        );
        return;
    }

    let history = state
        .conversations
        .snapshot_and_record(&key, HistoryEntry::them(&ev.text))
        .await;
    let msg = InboundMessage {
        channel: ev.channel_id.clone(),
        sender_label: ev.sender_label.clone(),
        text: ev.text.clone(),
        history,
    };
    let result = match state.reply_deadline {
        Some(deadline) => state.engine.process_message_with_deadline(&msg, deadline).await,
        None => state.engine.process_message(&msg).await,
    };
    match result {
        Ok(ReplyDecision::Suppressed) => {}
        Ok(ReplyDecision::Generated(reply)) => {
            if deliver(&state, &ev, &reply).await {
                state.conversations.record(&key, HistoryEntry::me(reply)).await;
            }
        }
        Err(e) => {
            log::warn!(
                "inbound: no reply to {} on {}: {}",
                ev.sender_label,
                ev.channel_id,
                e
            );
        }
    }
}

/// Send text back to the event's conversation. Returns whether it was delivered.
async fn deliver(state: &GatewayState, ev: &InboundEvent, text: &str) -> bool {
    match state
        .channel_registry
        .send(&ev.channel_id, &ev.conversation_id, text)
        .await
    {
        Ok(()) => true,
        Err(e) => {
            log::warn!("inbound: send to {}/{} failed: {}", ev.channel_id, ev.conversation_id, e);
            false
        }
    }
}
