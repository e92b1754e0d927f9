//! Webhook payload shapes for the WhatsApp Cloud API.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    /// Object class; messages carry `whatsapp_business_account`.
    pub object: Option<String>,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Change {
    #[serde(default)]
    pub field: String,
    pub value: ChangeValue,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangeValue {
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub contacts: Vec<WaContact>,
    #[serde(default)]
    pub messages: Vec<WaMessage>,
    #[serde(default)]
    pub statuses: Vec<WaStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Metadata {
    pub phone_number_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaContact {
    pub wa_id: Option<String>,
    pub profile: Option<Profile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaMessage {
    pub from: Option<String>,
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub message_type: String,
    pub text: Option<TextBody>,
    pub image: Option<MediaObject>,
    pub video: Option<MediaObject>,
    pub audio: Option<MediaObject>,
    pub document: Option<MediaObject>,
    pub sticker: Option<MediaObject>,
    pub location: Option<Location>,
    #[serde(default)]
    pub contacts: Vec<ContactCard>,
}

impl WaMessage {
    /// The media object matching the declared message type, if any.
    #[must_use]
    pub fn media_object(&self) -> Option<&MediaObject> {
        match self.message_type.as_str() {
            "image" => self.image.as_ref(),
            "video" => self.video.as_ref(),
            "audio" => self.audio.as_ref(),
            "document" => self.document.as_ref(),
            "sticker" => self.sticker.as_ref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextBody {
    pub body: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaObject {
    pub id: Option<String>,
    pub mime_type: Option<String>,
    pub caption: Option<String>,
    /// Documents only.
    pub filename: Option<String>,
    /// Audio messages set this for push-to-talk voice notes.
    #[serde(default)]
    pub voice: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Location {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContactCard {
    pub name: Option<ContactName>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContactName {
    pub formatted_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaStatus {
    pub id: Option<String>,
    pub status: Option<String>,
}
