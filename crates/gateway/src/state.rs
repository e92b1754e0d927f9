use std::sync::Arc;

use {
    courier_channels::{AdapterRegistry, ChannelConfig},
    courier_config::HandoffConfig,
    courier_media::MediaPipeline,
    courier_store::{
        ChannelRecord, ChannelStore, ContactStore, ConversationStore, MessageStore,
    },
};

use crate::{events::EventSink, forward::Forwarder};

/// Everything a request handler needs, constructed once at startup and
/// passed in explicitly so tests can swap any collaborator for a fake.
#[derive(Clone)]
pub struct AppState {
    pub channels: ChannelStore,
    pub contacts: ContactStore,
    pub conversations: ConversationStore,
    pub messages: MessageStore,
    pub adapters: Arc<AdapterRegistry>,
    pub media: Arc<MediaPipeline>,
    pub events: Arc<dyn EventSink>,
    pub forwarder: Arc<Forwarder>,
    pub handoff: HandoffConfig,
    /// Shared key required on `/internal/*` routes.
    pub internal_api_key: Option<String>,
}

impl AppState {
    /// The adapter-facing slice of a channel row.
    #[must_use]
    pub fn adapter_config(channel: &ChannelRecord) -> ChannelConfig {
        ChannelConfig {
            public_id: channel.public_id.clone(),
            secret: channel.secret.clone(),
            provider: channel.config.clone(),
        }
    }
}
