//! Outbound sends through the Graph API.
//!
//! Text goes out as a single JSON call. Media is two-step: upload the binary
//! to `/{phone_number_id}/media`, then reference the returned media id in
//! the message payload.

use {
    reqwest::multipart::{Form, Part},
    serde_json::{Value, json},
    tracing::debug,
};

use courier_channels::{OutboundMedia, SendError, SendReceipt};

use crate::config::WhatsAppCredentials;

pub(crate) const DEFAULT_GRAPH_BASE: &str = "https://graph.facebook.com/v18.0";

/// Thin Graph API client. The base URL is swappable so tests can point it at
/// a local mock server.
pub(crate) struct GraphClient {
    http: reqwest::Client,
    base: String,
}

impl GraphClient {
    pub(crate) fn new(base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: base.into(),
        }
    }

    fn sending_identity<'a>(
        creds: &'a WhatsAppCredentials,
    ) -> Result<(&'a str, &'a str), SendError> {
        let phone_number_id = creds
            .phone_number_id
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| SendError::not_configured("whatsapp phone_number_id missing"))?;
        let token = creds
            .access_token()
            .ok_or_else(|| SendError::not_configured("whatsapp access_token missing"))?;
        Ok((phone_number_id, token))
    }

    pub(crate) async fn send_text(
        &self,
        creds: &WhatsAppCredentials,
        to: &str,
        text: &str,
    ) -> Result<SendReceipt, SendError> {
        let payload = json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "text",
            "text": { "body": text }
        });
        self.send_message(creds, payload).await
    }

    pub(crate) async fn send_media(
        &self,
        creds: &WhatsAppCredentials,
        to: &str,
        media: &OutboundMedia,
        caption: Option<&str>,
    ) -> Result<SendReceipt, SendError> {
        let media_id = self.upload_media(creds, media).await?;
        let media_type = graph_media_type(&media.mime_type);

        let mut media_payload = json!({ "id": media_id });
        if let Some(caption) = caption.filter(|c| !c.is_empty()) {
            match media_type {
                // Audio payloads do not support captions.
                "image" | "video" => {
                    media_payload["caption"] = json!(caption);
                },
                "document" => {
                    media_payload["caption"] = json!(caption);
                    media_payload["filename"] =
                        json!(media.file_name.clone().unwrap_or_else(|| "file".to_string()));
                },
                _ => {},
            }
        } else if media_type == "document" {
            media_payload["filename"] =
                json!(media.file_name.clone().unwrap_or_else(|| "file".to_string()));
        }

        let mut payload = json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": media_type,
        });
        payload[media_type] = media_payload;
        self.send_message(creds, payload).await
    }

    async fn send_message(
        &self,
        creds: &WhatsAppCredentials,
        payload: Value,
    ) -> Result<SendReceipt, SendError> {
        let (phone_number_id, token) = Self::sending_identity(creds)?;

        let response = self
            .http
            .post(format!("{}/{phone_number_id}/messages", self.base))
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .map_err(map_transport_error)?;

        let body = read_graph_body(response).await?;
        let provider_message_id = body["messages"][0]["id"].as_str().map(str::to_string);
        debug!(?provider_message_id, "whatsapp message accepted");
        Ok(SendReceipt {
            provider_message_id,
        })
    }

    /// Step one of a media send: push the binary to Meta, get a media id.
    pub(crate) async fn upload_media(
        &self,
        creds: &WhatsAppCredentials,
        media: &OutboundMedia,
    ) -> Result<String, SendError> {
        let (phone_number_id, token) = Self::sending_identity(creds)?;

        let part = Part::bytes(media.bytes.to_vec())
            .file_name(media.file_name.clone().unwrap_or_else(|| "file".to_string()))
            .mime_str(&media.mime_type)
            .map_err(|e| SendError::rejected(format!("invalid mime type: {e}")))?;
        let form = Form::new()
            .text("messaging_product", "whatsapp")
            .text("type", media.mime_type.clone())
            .part("file", part);

        let response = self
            .http
            .post(format!("{}/{phone_number_id}/media", self.base))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .map_err(map_transport_error)?;

        let body = read_graph_body(response).await?;
        body["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| SendError::rejected("media upload returned no media id"))
    }

    /// Resolve a media id into its temporary CDN download URL.
    pub(crate) async fn media_url(
        &self,
        creds: &WhatsAppCredentials,
        media_id: &str,
    ) -> Result<String, SendError> {
        let token = creds
            .access_token()
            .ok_or_else(|| SendError::not_configured("whatsapp access_token missing"))?;

        let response = self
            .http
            .get(format!("{}/{media_id}", self.base))
            .bearer_auth(token)
            .send()
            .await
            .map_err(map_transport_error)?;

        let body = read_graph_body(response).await?;
        body["url"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| SendError::rejected("media lookup returned no url"))
    }
}

/// WhatsApp message type for an outbound MIME type.
pub(crate) fn graph_media_type(mime_type: &str) -> &'static str {
    if mime_type.starts_with("image/") {
        "image"
    } else if mime_type.starts_with("video/") {
        "video"
    } else if mime_type.starts_with("audio/") {
        "audio"
    } else {
        "document"
    }
}

fn map_transport_error(e: reqwest::Error) -> SendError {
    if e.is_timeout() {
        SendError::Timeout
    } else {
        SendError::transport(e)
    }
}

/// Interpret a Graph API response: 5xx is transient, an `error` object is a
/// provider rejection.
async fn read_graph_body(response: reqwest::Response) -> Result<Value, SendError> {
    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);

    if status.is_server_error() {
        return Err(SendError::transport(format!("graph api returned {status}")));
    }
    if let Some(error) = body.get("error") {
        let message = error["message"].as_str().unwrap_or("unknown graph error");
        return Err(SendError::rejected(message));
    }
    if !status.is_success() {
        return Err(SendError::rejected(format!("graph api returned {status}")));
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_media_type_mapping() {
        assert_eq!(graph_media_type("image/jpeg"), "image");
        assert_eq!(graph_media_type("video/mp4"), "video");
        assert_eq!(graph_media_type("audio/ogg"), "audio");
        assert_eq!(graph_media_type("application/pdf"), "document");
    }
}
