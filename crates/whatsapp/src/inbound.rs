//! Normalization of WhatsApp Cloud API payloads into canonical events.

use std::collections::HashMap;

use {serde_json::Value, tracing::debug};

use {
    courier_channels::{InboundMessage, MediaDescriptor, StatusUpdate},
    courier_common::{DeliveryStatus, MediaKind, SenderProfile},
};

use crate::types::{WaMessage, WebhookPayload};

/// Map a webhook payload to canonical events. One payload may carry several
/// messages across entries and changes; reactions and empty messages are
/// dropped without producing an event.
#[must_use]
pub fn normalize(payload: &Value) -> Vec<InboundMessage> {
    let Ok(parsed) = serde_json::from_value::<WebhookPayload>(payload.clone()) else {
        return Vec::new();
    };
    if parsed.object.as_deref() != Some("whatsapp_business_account") {
        return Vec::new();
    }

    let mut events = Vec::new();
    for entry in &parsed.entry {
        for change in &entry.changes {
            if change.field != "messages" {
                continue;
            }
            let value = &change.value;

            // Profile names keyed by wa_id, delivered next to the messages.
            let names: HashMap<&str, &str> = value
                .contacts
                .iter()
                .filter_map(|c| {
                    Some((c.wa_id.as_deref()?, c.profile.as_ref()?.name.as_deref()?))
                })
                .collect();

            for msg in &value.messages {
                let Some(from) = msg.from.as_deref() else {
                    continue;
                };
                if msg.message_type == "reaction" {
                    debug!(from, "skipping reaction");
                    continue;
                }

                let media = media_descriptor(msg);
                let text = message_text(msg, media.as_ref());
                if text.is_none() && media.is_none() {
                    debug!(from, message_type = %msg.message_type, "skipping empty message");
                    continue;
                }

                events.push(InboundMessage {
                    external_sender_id: from.to_string(),
                    external_thread_id: from.to_string(),
                    text,
                    media,
                    sender: sender_profile(from, names.get(from).copied()),
                    message_type: msg.message_type.clone(),
                    raw: payload.clone(),
                });
            }
        }
    }
    events
}

/// Extract delivery receipts (`sent`/`delivered`/`read`/`failed`).
#[must_use]
pub fn status_updates(payload: &Value) -> Vec<StatusUpdate> {
    let Ok(parsed) = serde_json::from_value::<WebhookPayload>(payload.clone()) else {
        return Vec::new();
    };

    let mut updates = Vec::new();
    for entry in &parsed.entry {
        for change in &entry.changes {
            if change.field != "messages" {
                continue;
            }
            for status in &change.value.statuses {
                let (Some(id), Some(raw_status)) = (status.id.as_deref(), status.status.as_deref())
                else {
                    continue;
                };
                let Ok(status) = raw_status.parse::<DeliveryStatus>() else {
                    debug!(id, raw_status, "ignoring unknown delivery status");
                    continue;
                };
                updates.push(StatusUpdate {
                    provider_message_id: id.to_string(),
                    status,
                });
            }
        }
    }
    updates
}

fn media_descriptor(msg: &WaMessage) -> Option<MediaDescriptor> {
    let obj = msg.media_object()?;
    let file_ref = obj.id.clone()?;
    let kind = match msg.message_type.as_str() {
        "image" => MediaKind::Image,
        "video" => MediaKind::Video,
        "audio" if obj.voice => MediaKind::Voice,
        "audio" => MediaKind::Audio,
        "document" => MediaKind::Document,
        "sticker" => MediaKind::Sticker,
        _ => return None,
    };
    Some(MediaDescriptor {
        file_ref,
        kind,
        mime_type: obj.mime_type.clone(),
        file_name: obj.filename.clone(),
        caption: obj.caption.clone(),
    })
}

fn message_text(msg: &WaMessage, media: Option<&MediaDescriptor>) -> Option<String> {
    if let Some(media) = media {
        return media.caption.clone();
    }
    match msg.message_type.as_str() {
        "text" => msg
            .text
            .as_ref()
            .and_then(|t| t.body.clone())
            .filter(|b| !b.is_empty()),
        // Media message whose object failed to parse: keep a placeholder so
        // the thread stays consistent.
        "image" | "video" | "audio" | "document" | "sticker" => {
            Some(format!("[{}]", msg.message_type.to_uppercase()))
        },
        "location" => msg.location.as_ref().map(|l| {
            format!(
                "[LOCATION] {},{}",
                l.latitude.unwrap_or_default(),
                l.longitude.unwrap_or_default()
            )
        }),
        "contacts" => {
            let name = msg
                .contacts
                .first()
                .and_then(|c| c.name.as_ref())
                .and_then(|n| n.formatted_name.clone())
                .unwrap_or_else(|| "Unknown".to_string());
            Some(format!("[CONTACT] {name}"))
        },
        other if !other.is_empty() => Some(format!("[{}]", other.to_uppercase())),
        _ => None,
    }
}

fn sender_profile(from: &str, name: Option<&str>) -> SenderProfile {
    SenderProfile {
        name: name.map(str::to_string),
        username: None,
        // The WhatsApp external identity is itself a phone number.
        phone: Some(if from.starts_with('+') {
            from.to_string()
        } else {
            format!("+{from}")
        }),
        raw: serde_json::json!({ "wa_id": from, "name": name }),
    }
}
