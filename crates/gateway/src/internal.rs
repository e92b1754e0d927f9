//! Internal API for the automation engine, protected by a shared key.

use {
    axum::{
        Json,
        extract::{Path, Request, State},
        http::StatusCode,
        middleware::Next,
        response::{IntoResponse, Response},
    },
    serde::Deserialize,
    serde_json::json,
    tracing::{info, warn},
};

use courier_channels::OutboundContent;
use courier_common::{ConversationStatus, MessageRole};

use crate::{dispatch, error::ApiError, events::Event, state::AppState};

/// Marker the automation engine embeds in a reply to request handoff.
/// Stripped from the visible message content before persisting.
const HANDOFF_MARKER: &str = "[HANDOFF]";

/// Require `X-Internal-Key: <key>` or `Authorization: Bearer <key>`.
pub async fn require_internal_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.internal_api_key.as_deref() else {
        warn!("internal api key not configured");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "server configuration error" })),
        )
            .into_response();
    };

    let headers = request.headers();
    let provided = headers
        .get("x-internal-key")
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
        });

    match provided {
        Some(key) if key == expected => next.run(request).await,
        Some(_) => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid api key" })),
        )
            .into_response(),
        None => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "missing authorization" })),
        )
            .into_response(),
    }
}

#[derive(Deserialize)]
pub struct AiResponseBody {
    pub conversation_id: String,
    pub content: String,
    #[serde(default)]
    pub handoff: bool,
    pub handoff_reason: Option<String>,
    pub sender_type: Option<String>,
}

/// POST /internal/ai-response — the automation engine's generated reply.
pub async fn ai_response(
    State(state): State<AppState>,
    Json(body): Json<AiResponseBody>,
) -> Result<Response, ApiError> {
    if body.conversation_id.is_empty() || body.content.is_empty() {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "conversation_id and content are required" })),
        )
            .into_response());
    }

    // Detect and strip the embedded handoff marker.
    let marker_present = body.content.contains(HANDOFF_MARKER);
    let clean_content = body.content.replace(HANDOFF_MARKER, "").trim().to_string();
    let handoff_requested = body.handoff || marker_present;

    let Some(_conversation) = state.conversations.get(&body.conversation_id).await? else {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "conversation not found" })),
        )
            .into_response());
    };

    let message = state
        .messages
        .append(
            &body.conversation_id,
            MessageRole::Assistant,
            &clean_content,
            &json!({
                "handoff": handoff_requested,
                "handoff_reason": body.handoff_reason,
                "sender_type": body.sender_type,
                "ai_handoff": marker_present,
            }),
        )
        .await?;

    state
        .events
        .emit(Event::MessageCreated {
            conversation_id: body.conversation_id.clone(),
            message_id: message.id.clone(),
            role: message.role.clone(),
            content: clean_content.clone(),
        })
        .await;

    if handoff_requested {
        info!(conversation_id = %body.conversation_id, "automation requested handoff");
        state
            .conversations
            .hand_off(&body.conversation_id, body.handoff_reason.as_deref())
            .await?;
        state
            .events
            .emit(Event::StatusChanged {
                conversation_id: body.conversation_id.clone(),
                status: ConversationStatus::Human.to_string(),
            })
            .await;
    }

    // Relay the clean content to the customer's platform.
    let send_result = dispatch::dispatch(
        &state,
        &body.conversation_id,
        &OutboundContent::text_only(clean_content),
    )
    .await;

    let channel_sent = match &send_result {
        Ok(receipt) => {
            if let Some(provider_id) = &receipt.provider_message_id {
                state.messages.mark_sent(&message.id, provider_id).await?;
            }
            true
        },
        Err(e) => {
            warn!(conversation_id = %body.conversation_id, error = %e, "channel send failed");
            state.messages.mark_failed(&message.id).await?;
            false
        },
    };

    Ok(Json(json!({
        "success": true,
        "message_id": message.id,
        "handoff_triggered": handoff_requested,
        "channel_sent": channel_sent,
    }))
    .into_response())
}

#[derive(Deserialize)]
pub struct UpdateStateBody {
    pub conversation_id: String,
    pub status: String,
    pub handoff_reason: Option<String>,
}

/// POST /internal/update-state — explicit ownership change.
pub async fn update_state(
    State(state): State<AppState>,
    Json(body): Json<UpdateStateBody>,
) -> Result<Response, ApiError> {
    let Ok(status) = body.status.parse::<ConversationStatus>() else {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid status, use: bot, human" })),
        )
            .into_response());
    };

    let conversation = match status {
        ConversationStatus::Human => {
            state
                .conversations
                .hand_off(
                    &body.conversation_id,
                    Some(body.handoff_reason.as_deref().unwrap_or("system")),
                )
                .await?
        },
        ConversationStatus::Bot => state.conversations.return_to_bot(&body.conversation_id).await?,
    };

    state
        .events
        .emit(Event::StatusChanged {
            conversation_id: body.conversation_id.clone(),
            status: status.to_string(),
        })
        .await;

    Ok(Json(json!({
        "success": true,
        "conversation": {
            "id": conversation.id,
            "status": conversation.status,
            "unanswered_count": conversation.unanswered_count,
        }
    }))
    .into_response())
}

/// GET /internal/conversation-state/{id} — current ownership for the
/// engine's own gating. Unknown conversations default to `bot`.
pub async fn conversation_state(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    match state.conversations.get(&id).await? {
        Some(conversation) => {
            let ai_active = !conversation.is_human();
            Ok(Json(json!({
                "status": conversation.status,
                "handoff_reason": conversation.handoff_reason,
                "ai_active": ai_active,
            }))
            .into_response())
        },
        None => Ok(Json(json!({ "status": "bot", "ai_active": true })).into_response()),
    }
}
