//! Inbound webhook endpoints, one per channel type.
//!
//! Telegram rejections answer 401. WhatsApp rejections still answer 200
//! with a status body: Meta retries non-success responses and eventually
//! disables the webhook, so a discarded event must look like an ack.

use std::collections::HashMap;

use {
    axum::{
        Json,
        extract::{Path, Query, State},
        http::{HeaderMap, StatusCode},
        response::{IntoResponse, Response},
    },
    bytes::Bytes,
    serde_json::{Value, json},
    tracing::{info, warn},
};

use {
    courier_channels::WebhookRequest,
    courier_common::ChannelType,
    courier_store::StatusUpgrade,
};

use courier_whatsapp::WhatsAppAdapter;

use crate::{error::ApiError, events::Event, ingest::process_inbound, state::AppState};

fn lowercase_headers(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            Some((name.as_str().to_lowercase(), value.to_str().ok()?.to_string()))
        })
        .collect()
}

fn ack(status: &str) -> Json<Value> {
    Json(json!({ "status": status }))
}

/// POST /hooks/telegram/{public_id}
pub async fn telegram_hook(
    State(state): State<AppState>,
    Path(public_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let Some(channel) = state
        .channels
        .find_by_public_id(ChannelType::Telegram.as_str(), &public_id)
        .await?
    else {
        warn!(%public_id, "telegram webhook for unknown channel");
        return Ok((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid channel or secret token" })),
        )
            .into_response());
    };

    let Some(adapter) = state.adapters.get(ChannelType::Telegram) else {
        return Ok(StatusCode::NOT_IMPLEMENTED.into_response());
    };

    let header_map = lowercase_headers(&headers);
    let request = WebhookRequest {
        headers: &header_map,
        body: &body,
    };
    if !adapter.verify(&AppState::adapter_config(&channel), &request) {
        warn!(%public_id, "telegram webhook failed verification");
        return Ok((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid channel or secret token" })),
        )
            .into_response());
    }

    let Ok(payload) = serde_json::from_slice::<Value>(&body) else {
        return Ok((StatusCode::BAD_REQUEST, ack("malformed")).into_response());
    };

    let events = adapter.normalize(&payload);
    if events.is_empty() {
        return Ok(ack("skipped").into_response());
    }
    for event in events {
        process_inbound(&state, &channel, adapter.as_ref(), event).await?;
    }

    Ok(ack("received").into_response())
}

#[derive(serde::Deserialize)]
pub struct SubscriptionQuery {
    #[serde(rename = "hub.mode")]
    hub_mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    hub_verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    hub_challenge: Option<String>,
}

/// GET /hooks/whatsapp/{public_id} — Meta webhook subscription handshake.
pub async fn whatsapp_verify(
    State(state): State<AppState>,
    Path(public_id): Path<String>,
    Query(query): Query<SubscriptionQuery>,
) -> Result<Response, ApiError> {
    let Some(channel) = state
        .channels
        .find_by_public_id(ChannelType::Whatsapp.as_str(), &public_id)
        .await?
    else {
        return Ok((StatusCode::NOT_FOUND, "channel not found").into_response());
    };

    match WhatsAppAdapter::verify_subscription(
        &AppState::adapter_config(&channel),
        query.hub_mode.as_deref(),
        query.hub_verify_token.as_deref(),
        query.hub_challenge.as_deref(),
    ) {
        Some(challenge) => {
            info!(%public_id, "whatsapp webhook verified");
            state.channels.mark_activity(&channel.id, "connected").await?;
            Ok(challenge.into_response())
        },
        None => {
            warn!(%public_id, "whatsapp subscription verification failed");
            Ok((StatusCode::FORBIDDEN, "invalid verify token").into_response())
        },
    }
}

/// POST /hooks/whatsapp/{public_id}
pub async fn whatsapp_hook(
    State(state): State<AppState>,
    Path(public_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    // Everything below answers 200: Meta disables webhooks that keep
    // failing, so even discarded deliveries must look acknowledged.
    let Some(channel) = state
        .channels
        .find_by_public_id(ChannelType::Whatsapp.as_str(), &public_id)
        .await?
    else {
        warn!(%public_id, "whatsapp webhook for unknown channel");
        return Ok(ack("ignored").into_response());
    };

    let Some(adapter) = state.adapters.get(ChannelType::Whatsapp) else {
        return Ok(ack("ignored").into_response());
    };

    let header_map = lowercase_headers(&headers);
    let request = WebhookRequest {
        headers: &header_map,
        body: &body,
    };
    if !adapter.verify(&AppState::adapter_config(&channel), &request) {
        warn!(%public_id, "whatsapp signature verification failed");
        return Ok(ack("invalid_signature").into_response());
    }

    let Ok(payload) = serde_json::from_slice::<Value>(&body) else {
        return Ok(ack("malformed").into_response());
    };

    for event in adapter.normalize(&payload) {
        process_inbound(&state, &channel, adapter.as_ref(), event).await?;
    }

    // Delivery receipts ride the same webhook.
    for update in adapter.status_updates(&payload) {
        match state
            .messages
            .upgrade_delivery_status(&update.provider_message_id, update.status)
            .await?
        {
            StatusUpgrade::Upgraded {
                message_id,
                conversation_id,
            } => {
                state
                    .events
                    .emit(Event::DeliveryUpdated {
                        conversation_id,
                        message_id,
                        status: update.status.to_string(),
                    })
                    .await;
            },
            StatusUpgrade::Stale | StatusUpgrade::Unknown => {},
        }
    }

    Ok(ack("received").into_response())
}
