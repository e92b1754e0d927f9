use {async_trait::async_trait, teloxide::prelude::Requester, tracing::debug};

use {
    courier_channels::{
        ChannelAdapter, ChannelConfig, DownloadRequest, InboundMessage, MediaDescriptor,
        OutboundContent, SendError, SendReceipt, WebhookRequest,
    },
    courier_common::ChannelType,
};

use crate::{
    config::TelegramCredentials,
    inbound,
    outbound::{BotCache, map_error, send_once},
};

/// Header Telegram echoes the webhook secret in.
pub const SECRET_TOKEN_HEADER: &str = "x-telegram-bot-api-secret-token";

/// The Telegram channel adapter.
#[derive(Default)]
pub struct TelegramAdapter {
    bots: BotCache,
}

impl TelegramAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn credentials(channel: &ChannelConfig) -> Result<TelegramCredentials, SendError> {
        let creds: TelegramCredentials = serde_json::from_value(channel.provider.clone())
            .map_err(|_| SendError::not_configured("telegram bot_token missing"))?;
        if creds.token().is_none() {
            return Err(SendError::not_configured("telegram bot_token empty"));
        }
        Ok(creds)
    }
}

#[async_trait]
impl ChannelAdapter for TelegramAdapter {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Telegram
    }

    /// Exact match of the secret-token header against the stored channel
    /// secret. The header is required; a missing or mismatched value rejects
    /// unconditionally.
    fn verify(&self, channel: &ChannelConfig, request: &WebhookRequest<'_>) -> bool {
        let Some(expected) = channel.secret.as_deref().filter(|s| !s.is_empty()) else {
            return false;
        };
        request.header(SECRET_TOKEN_HEADER) == Some(expected)
    }

    fn normalize(&self, payload: &serde_json::Value) -> Vec<InboundMessage> {
        inbound::normalize(payload)
    }

    async fn media_download(
        &self,
        channel: &ChannelConfig,
        media: &MediaDescriptor,
    ) -> Result<DownloadRequest, SendError> {
        let creds = Self::credentials(channel)?;
        let token = creds.token().unwrap_or_default();
        let bot = self.bots.bot_for(&channel.public_id, token);

        let file = bot
            .get_file(media.file_ref.clone())
            .await
            .map_err(map_error)?;
        debug!(file_ref = %media.file_ref, path = %file.path, "resolved telegram file");

        Ok(DownloadRequest {
            url: format!("https://api.telegram.org/file/bot{token}/{}", file.path),
            bearer: None,
        })
    }

    async fn send(
        &self,
        channel: &ChannelConfig,
        target: &str,
        content: &OutboundContent,
    ) -> Result<SendReceipt, SendError> {
        let creds = Self::credentials(channel)?;
        let bot = self
            .bots
            .bot_for(&channel.public_id, creds.token().unwrap_or_default());

        let chat_id: i64 = target
            .parse()
            .map_err(|_| SendError::rejected(format!("invalid telegram chat id: {target}")))?;

        send_once(&bot, chat_id, content.text.as_deref(), content.media.as_ref()).await
    }
}
