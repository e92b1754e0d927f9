//! End-to-end webhook tests against the assembled router.

#![allow(clippy::unwrap_used)]

use std::{sync::Arc, time::Duration};

use {
    axum::{
        Router,
        body::Body,
        http::{Request, StatusCode},
    },
    hmac::{Hmac, Mac},
    serde_json::json,
    sha2::Sha256,
    sqlx::SqlitePool,
    tower::ServiceExt,
};

use {
    courier_channels::AdapterRegistry,
    courier_common::{DeliveryStatus, MessageRole},
    courier_config::HandoffConfig,
    courier_gateway::{
        AppState, build_router,
        events::NoopEventSink,
        forward::Forwarder,
    },
    courier_media::{FsObjectStore, MediaLimits, MediaPipeline},
    courier_store::{
        ChannelStore, ContactStore, ConversationStore, MessageStore, NewChannel, init_schema,
    },
    courier_telegram::TelegramAdapter,
    courier_whatsapp::WhatsAppAdapter,
};

struct Harness {
    app: Router,
    state: AppState,
    bot_id: String,
}

async fn harness(automation_base: Option<String>) -> Harness {
    let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
    init_schema(&pool).await.unwrap();

    let channels = ChannelStore::new(pool.clone());
    let bot = channels
        .create_bot("ws-1", "support-bot", automation_base.as_deref())
        .await
        .unwrap();
    channels
        .create(NewChannel {
            bot_id: bot.id.clone(),
            workspace_id: "ws-1".into(),
            channel_type: "telegram".into(),
            public_id: "tg-pub".into(),
            secret: Some("tg-secret".into()),
            config: json!({"bot_token": "123:abc"}),
        })
        .await
        .unwrap();
    channels
        .create(NewChannel {
            bot_id: bot.id.clone(),
            workspace_id: "ws-1".into(),
            channel_type: "whatsapp".into(),
            public_id: "wa-pub".into(),
            secret: None,
            config: json!({
                "app_secret": "wa-app-secret",
                "verify_token": "vt-1",
                "access_token": "tok",
                "phone_number_id": "15551234"
            }),
        })
        .await
        .unwrap();

    let mut registry = AdapterRegistry::new();
    registry.register(Arc::new(TelegramAdapter::new()));
    registry.register(Arc::new(WhatsAppAdapter::new()));

    let dir = tempfile::tempdir().unwrap();
    let state = AppState {
        channels,
        contacts: ContactStore::new(pool.clone()),
        conversations: ConversationStore::new(pool.clone()),
        messages: MessageStore::new(pool.clone()),
        adapters: Arc::new(registry),
        media: Arc::new(MediaPipeline::new(
            Arc::new(FsObjectStore::new(dir.keep())),
            MediaLimits::default(),
            2,
        )),
        events: Arc::new(NoopEventSink),
        forwarder: Arc::new(Forwarder::new(None).with_retry(1, Duration::from_millis(1))),
        handoff: HandoffConfig::default(),
        internal_api_key: Some("internal-key".into()),
    };

    Harness {
        app: build_router(state.clone()),
        state,
        bot_id: bot.id,
    }
}

fn telegram_update(text: &str) -> serde_json::Value {
    json!({
        "update_id": 1,
        "message": {
            "message_id": 10,
            "date": 0,
            "chat": {"id": 42, "type": "private"},
            "from": {"id": 7, "is_bot": false, "first_name": "Ana", "username": "anaw"},
            "text": text
        }
    })
}

async fn post_json(app: &Router, uri: &str, headers: &[(&str, String)], body: String) -> StatusCode {
    let mut request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    for (name, value) in headers {
        request = request.header(*name, value);
    }
    let response = app
        .clone()
        .oneshot(request.body(Body::from(body)).unwrap())
        .await
        .unwrap();
    response.status()
}

fn wa_signature(body: &str, secret: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body.as_bytes());
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

fn wa_payload(value: serde_json::Value) -> String {
    json!({
        "object": "whatsapp_business_account",
        "entry": [{"changes": [{"field": "messages", "value": value}]}]
    })
    .to_string()
}

#[tokio::test]
async fn telegram_inbound_creates_contact_conversation_message() {
    let mut automation = mockito::Server::new_async().await;
    let forward_mock = automation.mock("POST", "/chat-message").create_async().await;

    let h = harness(Some(automation.url())).await;
    let status = post_json(
        &h.app,
        "/hooks/telegram/tg-pub",
        &[("x-telegram-bot-api-secret-token", "tg-secret".to_string())],
        telegram_update("halo, saya mau tanya").to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // one conversation in bot state with one unread message
    let (conversation_id, created) = h
        .state
        .conversations
        .upsert_on_inbound(&h.bot_id, "telegram", "42", None)
        .await
        .unwrap();
    assert!(!created, "conversation should already exist");
    let conversation = h.state.conversations.get(&conversation_id).await.unwrap().unwrap();
    assert_eq!(conversation.status, "bot");
    assert!(conversation.contact_id.is_some());

    // exactly one persisted user message with the original text
    let messages = h.state.messages.list(&conversation_id).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, MessageRole::User.as_str());
    assert_eq!(messages[0].content, "halo, saya mau tanya");

    // contact carries the sender profile
    let contact = h
        .state
        .contacts
        .get(conversation.contact_id.as_deref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(contact.name.as_deref(), Some("Ana"));

    // the event reached the automation engine
    tokio::time::sleep(Duration::from_millis(300)).await;
    forward_mock.assert_async().await;
}

#[tokio::test]
async fn telegram_wrong_secret_is_rejected_without_side_effects() {
    let h = harness(None).await;
    let status = post_json(
        &h.app,
        "/hooks/telegram/tg-pub",
        &[("x-telegram-bot-api-secret-token", "wrong".to_string())],
        telegram_update("ignored").to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, created) = h
        .state
        .conversations
        .upsert_on_inbound(&h.bot_id, "telegram", "42", None)
        .await
        .unwrap();
    assert!(created, "no conversation should have been created");
}

#[tokio::test]
async fn telegram_duplicate_delivery_is_idempotent_on_the_thread() {
    let h = harness(None).await;
    for _ in 0..3 {
        let status = post_json(
            &h.app,
            "/hooks/telegram/tg-pub",
            &[("x-telegram-bot-api-secret-token", "tg-secret".to_string())],
            telegram_update("halo").to_string(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (conversation_id, created) = h
        .state
        .conversations
        .upsert_on_inbound(&h.bot_id, "telegram", "42", None)
        .await
        .unwrap();
    assert!(!created);
    let conversation = h.state.conversations.get(&conversation_id).await.unwrap().unwrap();
    // 3 webhook deliveries + the probe upsert above
    assert_eq!(conversation.unread_count, 4);
    assert_eq!(conversation.message_count, 3);
}

#[tokio::test]
async fn whatsapp_bad_signature_acks_with_zero_writes() {
    let h = harness(None).await;
    let body = wa_payload(json!({
        "messages": [{"from": "628123", "id": "wamid.X", "type": "text",
                      "text": {"body": "halo"}}]
    }));

    let status = post_json(
        &h.app,
        "/hooks/whatsapp/wa-pub",
        &[("x-hub-signature-256", wa_signature(&body, "not-the-secret"))],
        body,
    )
    .await;
    // success-shaped ack even though the event is discarded
    assert_eq!(status, StatusCode::OK);

    let (_, created) = h
        .state
        .conversations
        .upsert_on_inbound(&h.bot_id, "whatsapp", "628123", None)
        .await
        .unwrap();
    assert!(created, "no rows should exist after a rejected delivery");
}

#[tokio::test]
async fn whatsapp_signed_inbound_persists() {
    let h = harness(None).await;
    let body = wa_payload(json!({
        "contacts": [{"wa_id": "628123", "profile": {"name": "Budi"}}],
        "messages": [{"from": "628123", "id": "wamid.1", "type": "text",
                      "text": {"body": "permisi"}}]
    }));

    let status = post_json(
        &h.app,
        "/hooks/whatsapp/wa-pub",
        &[("x-hub-signature-256", wa_signature(&body, "wa-app-secret"))],
        body,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (conversation_id, created) = h
        .state
        .conversations
        .upsert_on_inbound(&h.bot_id, "whatsapp", "628123", None)
        .await
        .unwrap();
    assert!(!created);
    let messages = h.state.messages.list(&conversation_id).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "permisi");
}

#[tokio::test]
async fn whatsapp_delivery_receipts_upgrade_monotonically() {
    let h = harness(None).await;

    // an outbound message already marked read
    let (conversation_id, _) = h
        .state
        .conversations
        .upsert_on_inbound(&h.bot_id, "whatsapp", "628123", None)
        .await
        .unwrap();
    let message = h
        .state
        .messages
        .append(&conversation_id, MessageRole::Agent, "hi", &json!({}))
        .await
        .unwrap();
    h.state.messages.mark_sent(&message.id, "wamid.OUT").await.unwrap();
    h.state
        .messages
        .upgrade_delivery_status("wamid.OUT", DeliveryStatus::Read)
        .await
        .unwrap();

    // a late `delivered` receipt plus one for an unknown message
    let body = wa_payload(json!({
        "statuses": [
            {"id": "wamid.OUT", "status": "delivered"},
            {"id": "wamid.GHOST", "status": "read"}
        ]
    }));
    let status = post_json(
        &h.app,
        "/hooks/whatsapp/wa-pub",
        &[("x-hub-signature-256", wa_signature(&body, "wa-app-secret"))],
        body,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let stored = h.state.messages.get(&message.id).await.unwrap().unwrap();
    assert_eq!(stored.status.as_deref(), Some("read"));
}

#[tokio::test]
async fn whatsapp_subscription_handshake_echoes_challenge() {
    let h = harness(None).await;
    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/hooks/whatsapp/wa-pub?hub.mode=subscribe&hub.verify_token=vt-1&hub.challenge=ch-99")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    assert_eq!(&body[..], b"ch-99");
}

#[tokio::test]
async fn whatsapp_reaction_is_acked_without_rows() {
    let h = harness(None).await;
    let body = wa_payload(json!({
        "messages": [{"from": "628123", "type": "reaction",
                      "reaction": {"emoji": "👍", "message_id": "wamid.1"}}]
    }));

    let status = post_json(
        &h.app,
        "/hooks/whatsapp/wa-pub",
        &[("x-hub-signature-256", wa_signature(&body, "wa-app-secret"))],
        body,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, created) = h
        .state
        .conversations
        .upsert_on_inbound(&h.bot_id, "whatsapp", "628123", None)
        .await
        .unwrap();
    assert!(created);
}
