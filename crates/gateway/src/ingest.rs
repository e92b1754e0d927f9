//! Shared inbound processing: one normalized event in, durable rows and a
//! forwarding decision out.

use {serde_json::json, tracing::{debug, info, warn}};

use {
    courier_channels::{ChannelAdapter, InboundMessage},
    courier_common::{MediaRef, MessageRole},
    courier_media::IngestMeta,
    courier_store::{ChannelRecord, now_ms},
};

use crate::{error::ApiError, events::Event, forward::ForwardPayload, state::AppState};

/// Persist one canonical inbound event and forward it to the automation
/// engine when the gatekeeper allows.
///
/// Media failures degrade to a placeholder message; persistence failures
/// propagate so the webhook returns an error and the provider redelivers
/// (safe — every write here is a natural-key upsert or an append).
pub async fn process_inbound(
    state: &AppState,
    channel: &ChannelRecord,
    adapter: &dyn ChannelAdapter,
    event: InboundMessage,
) -> Result<(), ApiError> {
    // Resolve the attachment first so the message row can carry the
    // canonical reference (or a placeholder) inline.
    let mut stored_media = None;
    let content = match (&event.media, &event.text) {
        (Some(descriptor), _) => {
            let ingested = match adapter
                .media_download(&AppState::adapter_config(channel), descriptor)
                .await
            {
                Ok(request) => {
                    state
                        .media
                        .ingest(request, descriptor.kind, IngestMeta {
                            file_name: descriptor.file_name.clone(),
                            caption: event.text.clone().or_else(|| descriptor.caption.clone()),
                            mime_type: descriptor.mime_type.clone(),
                        })
                        .await
                },
                Err(e) => {
                    warn!(
                        channel_id = %channel.id,
                        file_ref = %descriptor.file_ref,
                        error = %e,
                        "media handle resolution failed"
                    );
                    None
                },
            };
            match ingested {
                Some(stored) => {
                    let media_ref =
                        MediaRef::new(descriptor.kind, &stored.storage_key, stored.caption.clone());
                    stored_media = Some(stored);
                    media_ref.encode()
                },
                None => format!("[{}] (download failed)", descriptor.kind.label()),
            }
        },
        (None, Some(text)) => text.clone(),
        (None, None) => {
            debug!(channel_id = %channel.id, "skipping event with no content");
            return Ok(());
        },
    };

    let (contact_id, _) = state
        .contacts
        .find_or_create(
            &channel.workspace_id,
            &channel.channel_type,
            &event.external_sender_id,
            &event.sender,
        )
        .await?;

    let (conversation_id, is_new_conversation) = state
        .conversations
        .upsert_on_inbound(
            &channel.bot_id,
            &channel.channel_type,
            &event.external_thread_id,
            Some(&contact_id),
        )
        .await?;

    if is_new_conversation {
        state.contacts.link_conversation(&contact_id).await?;
    }

    let raw = json!({
        "message": event.raw,
        "media": stored_media,
    });
    let message = state
        .messages
        .append(&conversation_id, MessageRole::User, &content, &raw)
        .await?;

    let preview = preview_text(&content, &event);
    info!(
        %conversation_id,
        channel_type = %channel.channel_type,
        new = is_new_conversation,
        preview = %truncate(&preview, 100),
        "inbound message persisted"
    );

    state
        .events
        .emit(Event::MessageCreated {
            conversation_id: conversation_id.clone(),
            message_id: message.id.clone(),
            role: message.role.clone(),
            content: content.clone(),
        })
        .await;
    if is_new_conversation {
        state
            .events
            .emit(Event::ConversationCreated {
                conversation_id: conversation_id.clone(),
                workspace_id: channel.workspace_id.clone(),
                channel_type: channel.channel_type.clone(),
                external_thread_id: event.external_thread_id.clone(),
                preview: preview.clone(),
            })
            .await;
    }

    state.channels.mark_activity(&channel.id, "connected").await?;

    let decision = state
        .conversations
        .gate_inbound(
            &conversation_id,
            now_ms(),
            state.handoff.timeout_ms(),
            state.handoff.max_unanswered,
        )
        .await?;

    if decision.should_forward() {
        let payload = ForwardPayload {
            bot_id: channel.bot_id.clone(),
            channel_id: channel.id.clone(),
            conversation_id: conversation_id.clone(),
            channel_type: channel.channel_type.clone(),
            external_thread_id: event.external_thread_id.clone(),
            text: event.text.clone().unwrap_or_else(|| preview.clone()),
            message_type: event.message_type.clone(),
            media: stored_media
                .as_ref()
                .and_then(|m| serde_json::to_value(m).ok()),
            sender: event.sender.clone(),
            raw: event.raw.clone(),
        };
        state
            .forwarder
            .submit(channel.automation_url.clone(), payload);
    } else {
        debug!(%conversation_id, "conversation in human mode, not forwarding");
    }

    Ok(())
}

/// Inbox preview: media messages show their kind label plus caption.
fn preview_text(content: &str, event: &InboundMessage) -> String {
    match &event.media {
        Some(descriptor) if MediaRef::is_media_content(content) => match &event.text {
            Some(text) => format!("[{}] {text}", descriptor.kind.label()),
            None => format!("[{}]", descriptor.kind.label()),
        },
        _ => content.to_string(),
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
