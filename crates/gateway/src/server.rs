//! Router assembly and gateway startup.

use std::sync::Arc;

use {
    axum::{
        Json, Router, middleware,
        routing::{get, patch, post},
    },
    tower_http::cors::{Any, CorsLayer},
    tracing::info,
};

use {
    courier_channels::AdapterRegistry,
    courier_config::CourierConfig,
    courier_media::{FsObjectStore, MediaLimits, MediaPipeline},
    courier_store::{ChannelStore, ContactStore, ConversationStore, MessageStore},
    courier_telegram::TelegramAdapter,
    courier_whatsapp::WhatsAppAdapter,
};

use crate::{
    events::BroadcastEventSink,
    forward::Forwarder,
    hooks, internal, operator,
    state::AppState,
};

/// Build the gateway router (shared between production startup and tests).
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let internal_routes = Router::new()
        .route("/internal/ai-response", post(internal::ai_response))
        .route("/internal/update-state", post(internal::update_state))
        .route(
            "/internal/conversation-state/{id}",
            get(internal::conversation_state),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            internal::require_internal_key,
        ));

    Router::new()
        .route("/health", get(health_handler))
        .route("/hooks/telegram/{public_id}", post(hooks::telegram_hook))
        .route(
            "/hooks/whatsapp/{public_id}",
            get(hooks::whatsapp_verify).post(hooks::whatsapp_hook),
        )
        .route("/conversations/{id}/messages", post(operator::post_message))
        .route("/conversations/{id}/status", patch(operator::patch_status))
        .route("/conversations/{id}/read", post(operator::post_read))
        .merge(internal_routes)
        .layer(cors)
        .with_state(state)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Wire all components from config and start serving.
pub async fn start_gateway(config: CourierConfig) -> anyhow::Result<()> {
    let data_dir = courier_config::data_dir();
    std::fs::create_dir_all(&data_dir).ok();

    let db_url = courier_config::database_url(&config);
    let pool = sqlx::SqlitePool::connect(&db_url).await?;
    courier_store::init_schema(&pool).await?;

    let mut registry = AdapterRegistry::new();
    registry.register(Arc::new(TelegramAdapter::new()));
    registry.register(Arc::new(WhatsAppAdapter::new()));

    let media = MediaPipeline::new(
        Arc::new(FsObjectStore::new(data_dir)),
        MediaLimits {
            max_bytes: config.media.max_download_bytes,
            max_image_width: config.media.max_image_width,
            jpeg_quality: config.media.jpeg_quality,
            download_timeout: std::time::Duration::from_secs(config.media.download_timeout_secs),
        },
        config.media.transcode_concurrency,
    );

    let state = AppState {
        channels: ChannelStore::new(pool.clone()),
        contacts: ContactStore::new(pool.clone()),
        conversations: ConversationStore::new(pool.clone()),
        messages: MessageStore::new(pool),
        adapters: Arc::new(registry),
        media: Arc::new(media),
        events: Arc::new(BroadcastEventSink::new(256)),
        forwarder: Arc::new(Forwarder::new(config.automation.webhook_base.clone())),
        handoff: config.handoff.clone(),
        internal_api_key: config.automation.internal_api_key.clone(),
    };

    let app = build_router(state);
    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "courier gateway listening");
    axum::serve(listener, app).await?;
    Ok(())
}
