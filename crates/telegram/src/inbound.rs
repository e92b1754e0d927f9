//! Normalization of Telegram updates into canonical inbound events.

use serde_json::Value;

use {
    courier_channels::{InboundMessage, MediaDescriptor},
    courier_common::{MediaKind, SenderProfile},
};

use crate::types::{Message, Update, User};

/// Map a webhook update to canonical events.
///
/// Updates with no usable content (reactions, service messages, unknown
/// kinds) normalize to nothing and must be acknowledged without persisting.
#[must_use]
pub fn normalize(payload: &Value) -> Vec<InboundMessage> {
    let Ok(update) = serde_json::from_value::<Update>(payload.clone()) else {
        return Vec::new();
    };

    // Callback queries reference the message their button was attached to.
    let (msg, from, callback_data) = match (&update.message, &update.callback_query) {
        (Some(msg), _) => (Some(msg), msg.from.as_ref(), None),
        (None, Some(query)) => (
            query.message.as_ref(),
            query.from.as_ref(),
            query.data.as_deref(),
        ),
        (None, None) => return Vec::new(),
    };
    let Some(msg) = msg else {
        return Vec::new();
    };

    let text = update
        .message
        .as_ref()
        .and_then(message_text)
        .or_else(|| callback_data.map(str::to_string));
    let media = update.message.as_ref().and_then(extract_media);

    let (text, message_type) = match (&media, text) {
        (Some(descriptor), text) => (text, descriptor.kind.as_str().to_string()),
        (None, Some(text)) => (Some(text), "text".to_string()),
        (None, None) => return Vec::new(),
    };

    let thread_id = msg.chat.id.to_string();
    vec![InboundMessage {
        external_sender_id: from.map_or_else(|| thread_id.clone(), |u| u.id.to_string()),
        external_thread_id: thread_id,
        text,
        media,
        sender: sender_profile(from),
        message_type,
        raw: payload.clone(),
    }]
}

/// Text content of a message: body, caption, or a placeholder for
/// location/contact payloads that have no file to download.
fn message_text(msg: &Message) -> Option<String> {
    if let Some(text) = msg.text.clone().or_else(|| msg.caption.clone()) {
        return Some(text);
    }
    if let Some(location) = &msg.location {
        return Some(format!(
            "[LOCATION] {},{}",
            location.latitude, location.longitude
        ));
    }
    if let Some(contact) = &msg.contact {
        let name: Vec<&str> = [contact.first_name.as_deref(), contact.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        let label = if name.is_empty() {
            contact.phone_number.clone().unwrap_or_default()
        } else {
            name.join(" ")
        };
        return Some(format!("[CONTACT] {label}"));
    }
    None
}

/// Pull the downloadable attachment out of a message, if any.
#[must_use]
pub fn extract_media(msg: &Message) -> Option<MediaDescriptor> {
    // Photos arrive as an array of sizes; the last entry is the largest.
    if let Some(largest) = msg.photo.last() {
        return Some(MediaDescriptor {
            file_ref: largest.file_id.clone(),
            kind: MediaKind::Image,
            // Telegram photos are always JPEG.
            mime_type: Some("image/jpeg".into()),
            file_name: None,
            caption: msg.caption.clone(),
        });
    }
    if let Some(video) = &msg.video {
        return Some(MediaDescriptor {
            file_ref: video.file_id.clone(),
            kind: MediaKind::Video,
            mime_type: video.mime_type.clone().or(Some("video/mp4".into())),
            file_name: video.file_name.clone(),
            caption: msg.caption.clone(),
        });
    }
    if let Some(audio) = &msg.audio {
        return Some(MediaDescriptor {
            file_ref: audio.file_id.clone(),
            kind: MediaKind::Audio,
            mime_type: audio.mime_type.clone().or(Some("audio/mpeg".into())),
            file_name: audio.file_name.clone(),
            caption: msg.caption.clone(),
        });
    }
    if let Some(voice) = &msg.voice {
        return Some(MediaDescriptor {
            file_ref: voice.file_id.clone(),
            kind: MediaKind::Voice,
            mime_type: voice.mime_type.clone().or(Some("audio/ogg".into())),
            file_name: None,
            caption: msg.caption.clone(),
        });
    }
    if let Some(document) = &msg.document {
        return Some(MediaDescriptor {
            file_ref: document.file_id.clone(),
            kind: MediaKind::Document,
            mime_type: document
                .mime_type
                .clone()
                .or(Some("application/octet-stream".into())),
            file_name: document.file_name.clone(),
            caption: msg.caption.clone(),
        });
    }
    if let Some(sticker) = &msg.sticker {
        return Some(MediaDescriptor {
            file_ref: sticker.file_id.clone(),
            kind: MediaKind::Sticker,
            mime_type: Some("image/webp".into()),
            file_name: None,
            caption: None,
        });
    }
    // Round video notes download like regular videos.
    if let Some(note) = &msg.video_note {
        return Some(MediaDescriptor {
            file_ref: note.file_id.clone(),
            kind: MediaKind::Video,
            mime_type: Some("video/mp4".into()),
            file_name: None,
            caption: None,
        });
    }
    None
}

fn sender_profile(from: Option<&User>) -> SenderProfile {
    match from {
        Some(user) => SenderProfile {
            name: user.display_name(),
            username: user.username.clone(),
            phone: None,
            raw: serde_json::json!({
                "id": user.id,
                "first_name": user.first_name,
                "last_name": user.last_name,
                "username": user.username,
            }),
        },
        None => SenderProfile::default(),
    }
}
