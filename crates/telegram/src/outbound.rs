//! Outbound sends over the Telegram Bot API.

use std::{collections::HashMap, sync::RwLock};

use {
    teloxide::{
        Bot, RequestError,
        payloads::{
            SendAudioSetters, SendDocumentSetters, SendMessageSetters, SendPhotoSetters,
            SendVideoSetters,
        },
        prelude::Requester,
        types::{ChatId, InputFile, ParseMode},
    },
    tracing::warn,
};

use courier_channels::{OutboundMedia, SendError, SendReceipt};

/// Which Bot API method an attachment goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MediaMethod {
    Photo,
    Video,
    Audio,
    Document,
}

pub(crate) fn media_method_for_mime(mime_type: &str) -> MediaMethod {
    if mime_type.starts_with("image/") {
        MediaMethod::Photo
    } else if mime_type.starts_with("video/") {
        MediaMethod::Video
    } else if mime_type.starts_with("audio/") {
        MediaMethod::Audio
    } else {
        MediaMethod::Document
    }
}

/// Bot handles cached per channel so each send does not rebuild an HTTP
/// client. Keyed by public id; rebuilt when the stored token changes.
#[derive(Default)]
pub(crate) struct BotCache {
    bots: RwLock<HashMap<String, (String, Bot)>>,
}

impl BotCache {
    pub(crate) fn bot_for(&self, public_id: &str, token: &str) -> Bot {
        if let Ok(cache) = self.bots.read()
            && let Some((cached_token, bot)) = cache.get(public_id)
            && cached_token == token
        {
            return bot.clone();
        }
        let bot = Bot::new(token);
        if let Ok(mut cache) = self.bots.write() {
            cache.insert(public_id.to_string(), (token.to_string(), bot.clone()));
        }
        bot
    }
}

/// One send attempt. Retry policy lives in the dispatcher, not here.
pub(crate) async fn send_once(
    bot: &Bot,
    chat_id: i64,
    text: Option<&str>,
    media: Option<&OutboundMedia>,
) -> Result<SendReceipt, SendError> {
    let chat = ChatId(chat_id);

    let message = match media {
        None => {
            let body = text.unwrap_or_default();
            // HTML first; on a parse rejection fall back to plain text so a
            // stray angle bracket cannot lose the message.
            match bot
                .send_message(chat, body)
                .parse_mode(ParseMode::Html)
                .await
            {
                Ok(message) => message,
                Err(RequestError::Api(api_err)) => {
                    warn!(chat_id, error = %api_err, "html send failed, retrying plain");
                    bot.send_message(chat, body).await.map_err(map_error)?
                },
                Err(e) => return Err(map_error(e)),
            }
        },
        Some(media) => {
            let mut file = InputFile::memory(media.bytes.clone());
            if let Some(name) = &media.file_name {
                file = file.file_name(name.clone());
            }
            let caption = text.unwrap_or_default().to_string();
            match media_method_for_mime(&media.mime_type) {
                MediaMethod::Photo => {
                    let mut req = bot.send_photo(chat, file);
                    if !caption.is_empty() {
                        req = req.caption(caption);
                    }
                    req.await.map_err(map_error)?
                },
                MediaMethod::Video => {
                    let mut req = bot.send_video(chat, file);
                    if !caption.is_empty() {
                        req = req.caption(caption);
                    }
                    req.await.map_err(map_error)?
                },
                MediaMethod::Audio => {
                    let mut req = bot.send_audio(chat, file);
                    if !caption.is_empty() {
                        req = req.caption(caption);
                    }
                    req.await.map_err(map_error)?
                },
                MediaMethod::Document => {
                    let mut req = bot.send_document(chat, file);
                    if !caption.is_empty() {
                        req = req.caption(caption);
                    }
                    req.await.map_err(map_error)?
                },
            }
        },
    };

    Ok(SendReceipt {
        provider_message_id: Some(message.id.0.to_string()),
    })
}

/// Classify Bot API failures into the dispatcher's retry taxonomy.
pub(crate) fn map_error(error: RequestError) -> SendError {
    match error {
        RequestError::Api(api_err) => SendError::rejected(api_err),
        RequestError::RetryAfter(wait) => SendError::transport(format!(
            "rate limited, retry after {}s",
            wait.duration().as_secs()
        )),
        RequestError::Network(e) if e.is_timeout() => SendError::Timeout,
        other => SendError::transport(other),
    }
}
