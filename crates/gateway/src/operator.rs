//! Minimal operator surface: reply into a conversation, toggle ownership,
//! clear the unread badge. The console UI itself lives elsewhere.

use {
    axum::{
        Json,
        extract::{Multipart, Path, State},
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    serde::Deserialize,
    serde_json::json,
    tracing::warn,
};

use {
    courier_channels::{OutboundContent, OutboundMedia},
    courier_common::{ConversationStatus, MediaRef, MessageRole},
    courier_media::Error as MediaError,
};

use crate::{dispatch, error::ApiError, events::Event, state::AppState};

/// POST /conversations/{id}/messages — operator reply, multipart with an
/// optional `file` part next to the `content` text field.
pub async fn post_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut content = String::new();
    let mut upload: Option<(String, String, Vec<u8>)> = None;

    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some("content") => content = field.text().await?,
            Some("file") => {
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| "file".to_string());
                let mime_type = field
                    .content_type()
                    .map(str::to_string)
                    .unwrap_or_else(|| "application/octet-stream".to_string());
                upload = Some((file_name, mime_type, field.bytes().await?.to_vec()));
            },
            _ => {},
        }
    }

    let content = content.trim().to_string();
    if content.is_empty() && upload.is_none() {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "content or file is required" })),
        )
            .into_response());
    }

    let Some(_conversation) = state.conversations.get(&conversation_id).await? else {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "conversation not found" })),
        )
            .into_response());
    };

    // Store the attachment and build the outbound payload. The stored copy
    // is the optimized one; the provider receives the original bytes.
    let (message_content, outbound) = match upload {
        Some((file_name, mime_type, bytes)) => {
            let stored = match state
                .media
                .store_outbound(bytes.clone(), &file_name, &mime_type)
                .await
            {
                Ok(stored) => stored,
                Err(MediaError::TooLarge { limit }) => {
                    return Ok((
                        StatusCode::PAYLOAD_TOO_LARGE,
                        Json(json!({ "error": format!("file exceeds {limit} byte limit") })),
                    )
                        .into_response());
                },
                Err(e) => {
                    warn!(%conversation_id, error = %e, "outbound media processing failed");
                    return Ok((
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({ "error": "failed to store media" })),
                    )
                        .into_response());
                },
            };

            let kind = media_kind_for_mime(&stored.mime_type);
            let media_ref = MediaRef::new(
                kind,
                &stored.storage_key,
                (!content.is_empty()).then(|| content.clone()),
            );
            (
                media_ref.encode(),
                OutboundContent {
                    text: (!content.is_empty()).then(|| content.clone()),
                    media: Some(OutboundMedia {
                        bytes: bytes.into(),
                        mime_type,
                        file_name: Some(file_name),
                    }),
                },
            )
        },
        None => (content.clone(), OutboundContent::text_only(content.clone())),
    };

    let message = state
        .messages
        .append(
            &conversation_id,
            MessageRole::Agent,
            &message_content,
            &json!({ "sender": "operator" }),
        )
        .await?;

    state
        .events
        .emit(Event::MessageCreated {
            conversation_id: conversation_id.clone(),
            message_id: message.id.clone(),
            role: message.role.clone(),
            content: message_content.clone(),
        })
        .await;

    // An operator reply answers the customer: refresh the handoff clock.
    state.conversations.mark_agent_reply(&conversation_id).await?;

    let send_result = dispatch::dispatch(&state, &conversation_id, &outbound).await;
    let delivery = match send_result {
        Ok(receipt) => {
            if let Some(provider_id) = &receipt.provider_message_id {
                state.messages.mark_sent(&message.id, provider_id).await?;
            }
            json!({ "success": true, "provider_message_id": receipt.provider_message_id })
        },
        Err(e) => {
            warn!(%conversation_id, error = %e, "operator send failed");
            state.messages.mark_failed(&message.id).await?;
            json!({ "success": false, "error": e.to_string() })
        },
    };

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message_id": message.id, "channel_delivery": delivery })),
    )
        .into_response())
}

fn media_kind_for_mime(mime_type: &str) -> courier_common::MediaKind {
    use courier_common::MediaKind;
    if mime_type.starts_with("image/") {
        MediaKind::Image
    } else if mime_type.starts_with("video/") {
        MediaKind::Video
    } else if mime_type.starts_with("audio/") {
        MediaKind::Audio
    } else {
        MediaKind::Document
    }
}

#[derive(Deserialize)]
pub struct StatusBody {
    pub status: String,
}

/// PATCH /conversations/{id}/status — bot/human toggle.
pub async fn patch_status(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Json(body): Json<StatusBody>,
) -> Result<Response, ApiError> {
    let Ok(status) = body.status.parse::<ConversationStatus>() else {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid status, use: bot, human" })),
        )
            .into_response());
    };

    if state.conversations.get(&conversation_id).await?.is_none() {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "conversation not found" })),
        )
            .into_response());
    }

    let conversation = match status {
        // Taking over stamps the agent clock for timeout tracking.
        ConversationStatus::Human => state.conversations.take_over(&conversation_id).await?,
        ConversationStatus::Bot => state.conversations.return_to_bot(&conversation_id).await?,
    };

    state
        .events
        .emit(Event::StatusChanged {
            conversation_id: conversation_id.clone(),
            status: status.to_string(),
        })
        .await;

    Ok(Json(json!({
        "conversation": {
            "id": conversation.id,
            "status": conversation.status,
            "unanswered_count": conversation.unanswered_count,
        }
    }))
    .into_response())
}

/// POST /conversations/{id}/read
pub async fn post_read(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Result<Response, ApiError> {
    if state.conversations.get(&conversation_id).await?.is_none() {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "conversation not found" })),
        )
            .into_response());
    }
    state.conversations.mark_read(&conversation_id).await?;
    Ok(Json(json!({ "success": true })).into_response())
}
