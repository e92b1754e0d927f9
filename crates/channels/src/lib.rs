//! Channel adapter contract.
//!
//! Each messaging platform (Telegram, WhatsApp, ...) implements the
//! [`ChannelAdapter`] trait: webhook verification, payload normalization
//! into canonical inbound events, provider-correct sends, and delivery
//! status callbacks. The gateway holds an [`AdapterRegistry`] keyed by
//! channel type instead of branching on the platform at each call site.

pub mod adapter;
pub mod error;
pub mod registry;

pub use {
    adapter::{
        ChannelAdapter, ChannelConfig, DownloadRequest, InboundMessage, MediaDescriptor,
        OutboundContent, OutboundMedia, SendError, SendReceipt, StatusUpdate, WebhookRequest,
    },
    error::{Error, Result},
    registry::AdapterRegistry,
};
