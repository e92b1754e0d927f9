//! Outbound dispatcher: resolve the conversation's channel, call the
//! adapter, and retry transient failures with backoff.
//!
//! Each attempt is bounded by its own timeout. Provider rejections are
//! terminal; only timeouts and transport errors retry. Media sends are a
//! single attempt — re-uploading a binary on a hung multipart call is the
//! provider's job to dedupe, not ours. Nothing holds a store lock while an
//! attempt or a backoff sleep is in flight.

use std::time::Duration;

use tracing::warn;

use {
    courier_channels::{OutboundContent, SendError, SendReceipt},
    courier_common::ChannelType,
};

use crate::state::AppState;

/// Per-attempt and retry budget for a dispatch.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub attempt_timeout: Duration,
    /// Sleep between attempts is `base_delay * attempt` (linear multiplier).
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            attempt_timeout: Duration::from_secs(15),
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Send text and/or media to the conversation's platform.
pub async fn dispatch(
    state: &AppState,
    conversation_id: &str,
    content: &OutboundContent,
) -> Result<SendReceipt, SendError> {
    dispatch_with_policy(state, conversation_id, content, &RetryPolicy::default()).await
}

pub async fn dispatch_with_policy(
    state: &AppState,
    conversation_id: &str,
    content: &OutboundContent,
    policy: &RetryPolicy,
) -> Result<SendReceipt, SendError> {
    let conversation = state
        .conversations
        .get(conversation_id)
        .await
        .map_err(|e| SendError::transport(e))?
        .ok_or_else(|| SendError::rejected(format!("unknown conversation {conversation_id}")))?;

    let channel = state
        .channels
        .find_for_conversation(&conversation.bot_id, &conversation.channel_type)
        .await
        .map_err(|e| SendError::transport(e))?
        .ok_or_else(|| {
            SendError::not_configured(format!(
                "no enabled {} channel for bot {}",
                conversation.channel_type, conversation.bot_id
            ))
        })?;

    let channel_type: ChannelType = conversation
        .channel_type
        .parse()
        .map_err(|_| SendError::rejected(format!("unsupported channel {}", conversation.channel_type)))?;
    let adapter = state
        .adapters
        .get(channel_type)
        .ok_or_else(|| SendError::not_configured(format!("no adapter for {channel_type}")))?;

    let config = AppState::adapter_config(&channel);
    let target = conversation.external_thread_id.as_str();

    // Text-only sends retry; media sends get exactly one attempt.
    let attempts = if content.media.is_none() {
        policy.attempts.max(1)
    } else {
        1
    };

    let mut attempt = 0;
    loop {
        attempt += 1;
        let error = match tokio::time::timeout(
            policy.attempt_timeout,
            adapter.send(&config, target, content),
        )
        .await
        {
            Ok(Ok(receipt)) => return Ok(receipt),
            Ok(Err(e)) => e,
            Err(_) => SendError::Timeout,
        };

        warn!(
            conversation_id,
            channel_type = %channel_type,
            attempt,
            error = %error,
            "send attempt failed"
        );

        if !error.is_transient() || attempt >= attempts {
            return Err(error);
        }
        tokio::time::sleep(policy.base_delay * attempt).await;
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };

    use {async_trait::async_trait, sqlx::SqlitePool};

    use {
        courier_channels::{
            AdapterRegistry, ChannelAdapter, ChannelConfig, DownloadRequest, InboundMessage,
            MediaDescriptor, WebhookRequest,
        },
        courier_config::HandoffConfig,
        courier_media::{FsObjectStore, MediaLimits, MediaPipeline},
        courier_store::{
            ChannelStore, ContactStore, ConversationStore, MessageStore, NewChannel, init_schema,
        },
    };

    use {
        super::*,
        crate::{events::NoopEventSink, forward::Forwarder},
    };

    /// Adapter whose outcomes are scripted per attempt.
    struct ScriptedAdapter {
        calls: AtomicU32,
        script: Vec<Result<SendReceipt, fn() -> SendError>>,
    }

    impl ScriptedAdapter {
        fn new(script: Vec<Result<SendReceipt, fn() -> SendError>>) -> Self {
            Self {
                calls: AtomicU32::new(0),
                script,
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChannelAdapter for ScriptedAdapter {
        fn channel_type(&self) -> ChannelType {
            ChannelType::Telegram
        }

        fn verify(&self, _channel: &ChannelConfig, _request: &WebhookRequest<'_>) -> bool {
            true
        }

        fn normalize(&self, _payload: &serde_json::Value) -> Vec<InboundMessage> {
            Vec::new()
        }

        async fn media_download(
            &self,
            _channel: &ChannelConfig,
            _media: &MediaDescriptor,
        ) -> Result<DownloadRequest, SendError> {
            Err(SendError::rejected("not scripted"))
        }

        async fn send(
            &self,
            _channel: &ChannelConfig,
            _target: &str,
            _content: &OutboundContent,
        ) -> Result<SendReceipt, SendError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            match self.script.get(call.min(self.script.len() - 1)) {
                Some(Ok(receipt)) => Ok(receipt.clone()),
                Some(Err(make_err)) => Err(make_err()),
                None => Err(SendError::rejected("script exhausted")),
            }
        }
    }

    async fn state_with(adapter: Arc<ScriptedAdapter>) -> (AppState, String) {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        init_schema(&pool).await.unwrap();

        let channels = ChannelStore::new(pool.clone());
        let bot = channels.create_bot("ws-1", "bot", None).await.unwrap();
        channels
            .create(NewChannel {
                bot_id: bot.id.clone(),
                workspace_id: "ws-1".into(),
                channel_type: "telegram".into(),
                public_id: "pub".into(),
                secret: Some("s".into()),
                config: serde_json::json!({"bot_token": "t"}),
            })
            .await
            .unwrap();

        let conversations = ConversationStore::new(pool.clone());
        let (conversation_id, _) = conversations
            .upsert_on_inbound(&bot.id, "telegram", "42", None)
            .await
            .unwrap();

        let mut registry = AdapterRegistry::new();
        registry.register(adapter);

        let dir = tempfile::tempdir().unwrap();
        let state = AppState {
            channels,
            contacts: ContactStore::new(pool.clone()),
            conversations,
            messages: MessageStore::new(pool.clone()),
            adapters: Arc::new(registry),
            media: Arc::new(MediaPipeline::new(
                Arc::new(FsObjectStore::new(dir.keep())),
                MediaLimits::default(),
                2,
            )),
            events: Arc::new(NoopEventSink),
            forwarder: Arc::new(Forwarder::new(None)),
            handoff: HandoffConfig::default(),
            internal_api_key: Some("key".into()),
        };
        (state, conversation_id)
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            attempt_timeout: Duration::from_secs(1),
            base_delay: Duration::from_millis(5),
        }
    }

    fn receipt() -> SendReceipt {
        SendReceipt {
            provider_message_id: Some("prov-1".into()),
        }
    }

    #[tokio::test]
    async fn transient_failures_then_success() {
        let adapter = Arc::new(ScriptedAdapter::new(vec![
            Err(|| SendError::Timeout),
            Err(|| SendError::transport("reset")),
            Ok(receipt()),
        ]));
        let (state, conversation_id) = state_with(Arc::clone(&adapter)).await;

        let got = dispatch_with_policy(
            &state,
            &conversation_id,
            &OutboundContent::text_only("hi"),
            &fast_policy(),
        )
        .await
        .unwrap();

        assert_eq!(got.provider_message_id.as_deref(), Some("prov-1"));
        assert_eq!(adapter.calls(), 3);
    }

    #[tokio::test]
    async fn exhausted_attempts_return_last_error() {
        let adapter = Arc::new(ScriptedAdapter::new(vec![
            Err(|| SendError::Timeout),
            Err(|| SendError::Timeout),
            Err(|| SendError::transport("still down")),
        ]));
        let (state, conversation_id) = state_with(Arc::clone(&adapter)).await;

        let err = dispatch_with_policy(
            &state,
            &conversation_id,
            &OutboundContent::text_only("hi"),
            &fast_policy(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, SendError::Transport { .. }));
        assert_eq!(adapter.calls(), 3);
    }

    #[tokio::test]
    async fn provider_rejection_is_not_retried() {
        let adapter = Arc::new(ScriptedAdapter::new(vec![Err(|| {
            SendError::rejected("invalid recipient")
        })]));
        let (state, conversation_id) = state_with(Arc::clone(&adapter)).await;

        let err = dispatch_with_policy(
            &state,
            &conversation_id,
            &OutboundContent::text_only("hi"),
            &fast_policy(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, SendError::Rejected { .. }));
        assert_eq!(adapter.calls(), 1);
    }

    #[tokio::test]
    async fn media_sends_do_not_retry() {
        let adapter = Arc::new(ScriptedAdapter::new(vec![
            Err(|| SendError::Timeout),
            Ok(receipt()),
        ]));
        let (state, conversation_id) = state_with(Arc::clone(&adapter)).await;

        let content = OutboundContent {
            text: None,
            media: Some(courier_channels::OutboundMedia {
                bytes: bytes::Bytes::from_static(b"img"),
                mime_type: "image/jpeg".into(),
                file_name: None,
            }),
        };
        let err = dispatch_with_policy(&state, &conversation_id, &content, &fast_policy())
            .await
            .unwrap_err();

        assert!(matches!(err, SendError::Timeout));
        assert_eq!(adapter.calls(), 1);
    }

    #[tokio::test]
    async fn unknown_conversation_is_terminal() {
        let adapter = Arc::new(ScriptedAdapter::new(vec![Ok(receipt())]));
        let (state, _) = state_with(adapter).await;

        let err = dispatch(&state, "no-such-conv", &OutboundContent::text_only("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::Rejected { .. }));
    }
}
