//! Canonical vocabulary for the conversation model: channel types, message
//! roles, the delivery-status lattice, and the encoded media reference that
//! keeps message rows self-describing.

use {
    serde::{Deserialize, Serialize},
    std::{fmt, str::FromStr},
};

use crate::error::Error;

/// Supported messaging platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Telegram,
    Whatsapp,
}

impl ChannelType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Telegram => "telegram",
            Self::Whatsapp => "whatsapp",
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "telegram" => Ok(Self::Telegram),
            "whatsapp" => Ok(Self::Whatsapp),
            other => Err(Error::UnknownChannelType(other.to_string())),
        }
    }
}

/// Author of a persisted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// The customer on the external platform.
    User,
    /// The automation engine.
    Assistant,
    /// A human operator.
    Agent,
    /// Courier itself (handoff notices and similar).
    System,
}

impl MessageRole {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Agent => "agent",
            Self::System => "system",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conversation ownership: either the automation engine answers, or a human
/// operator does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Bot,
    Human,
}

impl ConversationStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bot => "bot",
            Self::Human => "human",
        }
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bot" => Ok(Self::Bot),
            "human" => Ok(Self::Human),
            other => Err(Error::message(format!(
                "unknown conversation status: {other}"
            ))),
        }
    }
}

/// Delivery state of an outbound message.
///
/// States form a lattice ordered `failed < sent < delivered < read`; a stored
/// status may only ever move to a strictly higher rank, so out-of-order
/// provider callbacks cannot downgrade it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Failed,
    Sent,
    Delivered,
    Read,
}

impl DeliveryStatus {
    /// Position in the lattice. Higher wins.
    #[must_use]
    pub fn rank(&self) -> u8 {
        match self {
            Self::Failed => 0,
            Self::Sent => 1,
            Self::Delivered => 2,
            Self::Read => 3,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Failed => "failed",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "failed" => Ok(Self::Failed),
            "sent" => Ok(Self::Sent),
            "delivered" => Ok(Self::Delivered),
            "read" => Ok(Self::Read),
            other => Err(Error::message(format!("unknown delivery status: {other}"))),
        }
    }
}

/// Attachment category, as classified by the channel adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Voice,
    Document,
    Sticker,
}

impl MediaKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Voice => "voice",
            Self::Document => "document",
            Self::Sticker => "sticker",
        }
    }

    /// Label used in placeholder message content, e.g. `[IMAGE]`.
    #[must_use]
    pub fn label(&self) -> String {
        self.as_str().to_uppercase()
    }

    /// Fallback file extension when no MIME type is known.
    #[must_use]
    pub fn fallback_ext(&self) -> &'static str {
        match self {
            Self::Image => "jpg",
            Self::Video => "mp4",
            Self::Audio | Self::Voice => "ogg",
            Self::Document => "bin",
            Self::Sticker => "png",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            "voice" => Ok(Self::Voice),
            "document" => Ok(Self::Document),
            "sticker" => Ok(Self::Sticker),
            other => Err(Error::message(format!("unknown media kind: {other}"))),
        }
    }
}

const MEDIA_PREFIX: &str = "media::";

/// Canonical reference to a stored attachment.
///
/// Encoded as `media::<kind>::<storage_key>[::<caption>]` and stored inline
/// in message content, so rows stay readable without a join against the
/// object store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    pub kind: MediaKind,
    pub storage_key: String,
    pub caption: Option<String>,
}

impl MediaRef {
    #[must_use]
    pub fn new(kind: MediaKind, storage_key: impl Into<String>, caption: Option<String>) -> Self {
        Self {
            kind,
            storage_key: storage_key.into(),
            caption: caption.filter(|c| !c.is_empty()),
        }
    }

    /// Encode into the delimited content string.
    #[must_use]
    pub fn encode(&self) -> String {
        match &self.caption {
            Some(caption) => format!("media::{}::{}::{caption}", self.kind, self.storage_key),
            None => format!("media::{}::{}", self.kind, self.storage_key),
        }
    }

    /// Parse a content string; returns `None` for plain-text content.
    #[must_use]
    pub fn parse(content: &str) -> Option<Self> {
        let rest = content.strip_prefix(MEDIA_PREFIX)?;
        let mut parts = rest.splitn(3, "::");
        let kind = MediaKind::from_str(parts.next()?).ok()?;
        let storage_key = parts.next()?;
        if storage_key.is_empty() {
            return None;
        }
        let caption = parts.next().filter(|c| !c.is_empty()).map(str::to_string);
        Some(Self {
            kind,
            storage_key: storage_key.to_string(),
            caption,
        })
    }

    /// Whether a content string holds an encoded media reference.
    #[must_use]
    pub fn is_media_content(content: &str) -> bool {
        content.starts_with(MEDIA_PREFIX)
    }
}

/// Sender identity details delivered alongside an inbound message.
///
/// Used to refresh the contact record and echoed in the automation-engine
/// forwarding payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SenderProfile {
    /// Display name as reported by the platform, if any.
    pub name: Option<String>,
    /// Platform username/handle, if the platform has one.
    pub username: Option<String>,
    /// Phone number, when the platform identity is phone-based.
    pub phone: Option<String>,
    /// Raw profile object from the provider payload.
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl SenderProfile {
    /// Best-effort display name: explicit name first, then the handle.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or(self.username.as_deref().filter(|u| !u.is_empty()))
    }
}
