use std::collections::HashMap;

use {async_trait::async_trait, bytes::Bytes, serde::Serialize};

use courier_common::{ChannelType, DeliveryStatus, MediaKind, SenderProfile};

// ── Adapter-facing channel view ─────────────────────────────────────────────

/// The slice of a persisted channel record an adapter needs: the immutable
/// webhook identity plus the provider credential blob.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Public webhook identifier (path segment of the hook URL).
    pub public_id: String,
    /// Shared webhook secret, when the platform uses one.
    pub secret: Option<String>,
    /// Opaque provider credentials (bot token, access token, ...).
    pub provider: serde_json::Value,
}

/// An inbound webhook request, reduced to what verification needs.
/// Header names are lowercased by the gateway before hand-off.
pub struct WebhookRequest<'a> {
    pub headers: &'a HashMap<String, String>,
    pub body: &'a [u8],
}

impl WebhookRequest<'_> {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

// ── Canonical inbound events ────────────────────────────────────────────────

/// Provider-hosted attachment reference, before the media pipeline runs.
#[derive(Debug, Clone)]
pub struct MediaDescriptor {
    /// Provider file reference (Telegram `file_id`, WhatsApp media id).
    pub file_ref: String,
    pub kind: MediaKind,
    /// Declared MIME type, when the provider reports one.
    pub mime_type: Option<String>,
    /// Original filename (documents only, typically).
    pub file_name: Option<String>,
    pub caption: Option<String>,
}

/// A provider message normalized into the canonical shape.
///
/// Reactions and unsupported payload types produce no event at all; callers
/// skip those deliveries without persisting anything.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Platform-specific user key of the sender.
    pub external_sender_id: String,
    /// Platform-specific thread key (chat id, phone number, ...).
    pub external_thread_id: String,
    pub text: Option<String>,
    pub media: Option<MediaDescriptor>,
    pub sender: SenderProfile,
    /// Short label of the provider message type ("text", "image", ...),
    /// echoed in the automation forwarding payload.
    pub message_type: String,
    /// Raw provider message object, persisted alongside the message row.
    pub raw: serde_json::Value,
}

/// One entry of a provider delivery receipt callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub provider_message_id: String,
    pub status: DeliveryStatus,
}

/// A resolved, directly fetchable location for provider-hosted media.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    /// Bearer token required by the provider's CDN, if any.
    pub bearer: Option<String>,
}

// ── Outbound ────────────────────────────────────────────────────────────────

/// Content handed to an adapter's `send`.
#[derive(Debug, Clone, Default)]
pub struct OutboundContent {
    /// Message text, or the caption when media is present.
    pub text: Option<String>,
    pub media: Option<OutboundMedia>,
}

impl OutboundContent {
    #[must_use]
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            media: None,
        }
    }
}

/// Raw attachment bytes for an outbound send.
#[derive(Debug, Clone)]
pub struct OutboundMedia {
    pub bytes: Bytes,
    pub mime_type: String,
    pub file_name: Option<String>,
}

/// Successful send acknowledgment from the provider.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SendReceipt {
    /// Provider-assigned message id, used to correlate delivery receipts.
    pub provider_message_id: Option<String>,
}

/// Send failure, split into retryable and terminal classes.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The attempt did not complete within the per-attempt budget.
    #[error("send timed out")]
    Timeout,

    /// Transport-level failure (connect/reset/5xx). Retryable.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The provider explicitly rejected the request (bad credentials,
    /// invalid recipient, malformed content). Not retryable.
    #[error("provider rejected send: {message}")]
    Rejected { message: String },

    /// The channel is missing required credentials. Not retryable.
    #[error("channel not configured: {message}")]
    NotConfigured { message: String },
}

impl SendError {
    #[must_use]
    pub fn transport(message: impl std::fmt::Display) -> Self {
        Self::Transport {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn rejected(message: impl std::fmt::Display) -> Self {
        Self::Rejected {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn not_configured(message: impl std::fmt::Display) -> Self {
        Self::NotConfigured {
            message: message.to_string(),
        }
    }

    /// Whether the dispatcher may retry after this error.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::Transport { .. })
    }
}

// ── The adapter trait ───────────────────────────────────────────────────────

/// Everything platform-specific, behind one uniform contract.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    fn channel_type(&self) -> ChannelType;

    /// Verify an inbound webhook request against the channel's credentials.
    ///
    /// A `false` return is terminal for the request; no side effects may have
    /// occurred. How the rejection is answered on the wire is the gateway's
    /// concern (some providers must still see a success-shaped response).
    fn verify(&self, channel: &ChannelConfig, request: &WebhookRequest<'_>) -> bool;

    /// Map a provider webhook payload to canonical inbound events.
    /// An empty vec means there is nothing to persist.
    fn normalize(&self, payload: &serde_json::Value) -> Vec<InboundMessage>;

    /// Extract delivery receipts from a webhook payload, for platforms that
    /// report them. Defaults to none.
    fn status_updates(&self, _payload: &serde_json::Value) -> Vec<StatusUpdate> {
        Vec::new()
    }

    /// Resolve a provider media reference into a fetchable URL.
    async fn media_download(
        &self,
        channel: &ChannelConfig,
        media: &MediaDescriptor,
    ) -> Result<DownloadRequest, SendError>;

    /// Send text and/or media to `target` with provider-correct semantics.
    async fn send(
        &self,
        channel: &ChannelConfig,
        target: &str,
        content: &OutboundContent,
    ) -> Result<SendReceipt, SendError>;
}
