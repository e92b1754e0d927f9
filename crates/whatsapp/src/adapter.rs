use async_trait::async_trait;

use {
    courier_channels::{
        ChannelAdapter, ChannelConfig, DownloadRequest, InboundMessage, MediaDescriptor,
        OutboundContent, SendError, SendReceipt, StatusUpdate, WebhookRequest,
    },
    courier_common::ChannelType,
};

use crate::{
    config::WhatsAppCredentials,
    inbound,
    outbound::{DEFAULT_GRAPH_BASE, GraphClient},
    webhook,
};

/// Header Meta puts the body signature in.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// The WhatsApp Cloud API channel adapter.
pub struct WhatsAppAdapter {
    graph: GraphClient,
}

impl Default for WhatsAppAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl WhatsAppAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            graph: GraphClient::new(DEFAULT_GRAPH_BASE),
        }
    }

    /// Point the adapter at a different Graph API root (tests).
    #[must_use]
    pub fn with_base_url(base: impl Into<String>) -> Self {
        Self {
            graph: GraphClient::new(base),
        }
    }

    fn credentials(channel: &ChannelConfig) -> Result<WhatsAppCredentials, SendError> {
        serde_json::from_value(channel.provider.clone())
            .map_err(|_| SendError::not_configured("whatsapp credentials missing"))
    }

    /// Verify the GET subscription handshake, returning the challenge to echo.
    #[must_use]
    pub fn verify_subscription(
        channel: &ChannelConfig,
        mode: Option<&str>,
        token: Option<&str>,
        challenge: Option<&str>,
    ) -> Option<String> {
        let creds = Self::credentials(channel).ok()?;
        let expected = creds.verify_token.as_deref().filter(|t| !t.is_empty())?;
        webhook::verify_subscription(mode, token, challenge, expected)
    }
}

#[async_trait]
impl ChannelAdapter for WhatsAppAdapter {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Whatsapp
    }

    /// HMAC-SHA256 over the exact raw body, compared in constant time. A
    /// channel with no app secret configured rejects everything; the gateway
    /// still answers those with a success-shaped ack so Meta does not
    /// disable the webhook.
    fn verify(&self, channel: &ChannelConfig, request: &WebhookRequest<'_>) -> bool {
        let Ok(creds) = Self::credentials(channel) else {
            return false;
        };
        let Some(app_secret) = creds.app_secret() else {
            return false;
        };
        let Some(signature) = request.header(SIGNATURE_HEADER) else {
            return false;
        };
        webhook::verify_signature(request.body, signature, app_secret)
    }

    fn normalize(&self, payload: &serde_json::Value) -> Vec<InboundMessage> {
        inbound::normalize(payload)
    }

    fn status_updates(&self, payload: &serde_json::Value) -> Vec<StatusUpdate> {
        inbound::status_updates(payload)
    }

    async fn media_download(
        &self,
        channel: &ChannelConfig,
        media: &MediaDescriptor,
    ) -> Result<DownloadRequest, SendError> {
        let creds = Self::credentials(channel)?;
        let url = self.graph.media_url(&creds, &media.file_ref).await?;
        Ok(DownloadRequest {
            url,
            bearer: creds.access_token().map(str::to_string),
        })
    }

    async fn send(
        &self,
        channel: &ChannelConfig,
        target: &str,
        content: &OutboundContent,
    ) -> Result<SendReceipt, SendError> {
        let creds = Self::credentials(channel)?;
        match &content.media {
            Some(media) => {
                self.graph
                    .send_media(&creds, target, media, content.text.as_deref())
                    .await
            },
            None => {
                let text = content
                    .text
                    .as_deref()
                    .ok_or_else(|| SendError::rejected("empty outbound content"))?;
                self.graph.send_text(&creds, target, text).await
            },
        }
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use {
        hmac::{Hmac, Mac},
        serde_json::json,
        sha2::Sha256,
    };

    use {super::*, courier_common::MediaKind};

    fn channel(config: serde_json::Value) -> ChannelConfig {
        ChannelConfig {
            public_id: "wa-pub".into(),
            secret: None,
            provider: config,
        }
    }

    fn signed_headers(body: &[u8], secret: &str) -> HashMap<String, String> {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        HashMap::from([(
            SIGNATURE_HEADER.to_string(),
            format!("sha256={}", hex::encode(mac.finalize().into_bytes())),
        )])
    }

    #[test]
    fn verify_accepts_correctly_signed_body() {
        let adapter = WhatsAppAdapter::new();
        let body = br#"{"object":"whatsapp_business_account"}"#;
        let headers = signed_headers(body, "app-secret");
        let channel = channel(json!({"app_secret": "app-secret"}));

        assert!(adapter.verify(&channel, &WebhookRequest {
            headers: &headers,
            body,
        }));
    }

    #[test]
    fn verify_rejects_without_app_secret() {
        let adapter = WhatsAppAdapter::new();
        let body = b"{}";
        let headers = signed_headers(body, "anything");
        let channel = channel(json!({}));

        assert!(!adapter.verify(&channel, &WebhookRequest {
            headers: &headers,
            body,
        }));
    }

    #[test]
    fn verify_rejects_tampered_body() {
        let adapter = WhatsAppAdapter::new();
        let headers = signed_headers(b"original", "app-secret");
        let channel = channel(json!({"app_secret": "app-secret"}));

        assert!(!adapter.verify(&channel, &WebhookRequest {
            headers: &headers,
            body: b"tampered",
        }));
    }

    #[test]
    fn subscription_handshake_roundtrip() {
        let channel = channel(json!({"verify_token": "vt-1"}));
        assert_eq!(
            WhatsAppAdapter::verify_subscription(
                &channel,
                Some("subscribe"),
                Some("vt-1"),
                Some("ch")
            ),
            Some("ch".to_string())
        );
        assert_eq!(
            WhatsAppAdapter::verify_subscription(
                &channel,
                Some("subscribe"),
                Some("wrong"),
                Some("ch")
            ),
            None
        );
    }

    #[tokio::test]
    async fn send_text_roundtrip_against_mock() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/15551234/messages")
            .with_body(r#"{"messages":[{"id":"wamid.OUT1"}]}"#)
            .create_async()
            .await;

        let adapter = WhatsAppAdapter::with_base_url(server.url());
        let channel = channel(json!({
            "access_token": "tok",
            "phone_number_id": "15551234"
        }));

        let receipt = adapter
            .send(&channel, "628123", &OutboundContent::text_only("halo"))
            .await
            .unwrap();
        assert_eq!(receipt.provider_message_id.as_deref(), Some("wamid.OUT1"));
    }

    #[tokio::test]
    async fn send_surfaces_graph_rejection() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/15551234/messages")
            .with_status(400)
            .with_body(r#"{"error":{"message":"invalid recipient"}}"#)
            .create_async()
            .await;

        let adapter = WhatsAppAdapter::with_base_url(server.url());
        let channel = channel(json!({
            "access_token": "tok",
            "phone_number_id": "15551234"
        }));

        let err = adapter
            .send(&channel, "bad", &OutboundContent::text_only("halo"))
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::Rejected { .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn media_send_uploads_then_references_handle() {
        let mut server = mockito::Server::new_async().await;
        let upload = server
            .mock("POST", "/15551234/media")
            .with_body(r#"{"id":"media-77"}"#)
            .create_async()
            .await;
        let send = server
            .mock("POST", "/15551234/messages")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"type":"image","image":{"id":"media-77","caption":"struk"}}"#.to_string(),
            ))
            .with_body(r#"{"messages":[{"id":"wamid.OUT2"}]}"#)
            .create_async()
            .await;

        let adapter = WhatsAppAdapter::with_base_url(server.url());
        let channel = channel(json!({
            "access_token": "tok",
            "phone_number_id": "15551234"
        }));

        let content = OutboundContent {
            text: Some("struk".into()),
            media: Some(courier_channels::OutboundMedia {
                bytes: bytes::Bytes::from_static(&[0xFF, 0xD8, 0xFF]),
                mime_type: "image/jpeg".into(),
                file_name: Some("struk.jpg".into()),
            }),
        };

        let receipt = adapter.send(&channel, "628123", &content).await.unwrap();
        assert_eq!(receipt.provider_message_id.as_deref(), Some("wamid.OUT2"));
        upload.assert_async().await;
        send.assert_async().await;
    }

    #[tokio::test]
    async fn media_download_resolves_cdn_url() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/media-9")
            .with_body(r#"{"url":"https://cdn.example/media-9.jpg"}"#)
            .create_async()
            .await;

        let adapter = WhatsAppAdapter::with_base_url(server.url());
        let channel = channel(json!({"access_token": "tok"}));

        let request = adapter
            .media_download(&channel, &MediaDescriptor {
                file_ref: "media-9".into(),
                kind: MediaKind::Image,
                mime_type: Some("image/jpeg".into()),
                file_name: None,
                caption: None,
            })
            .await
            .unwrap();

        assert_eq!(request.url, "https://cdn.example/media-9.jpg");
        assert_eq!(request.bearer.as_deref(), Some("tok"));
    }
}
