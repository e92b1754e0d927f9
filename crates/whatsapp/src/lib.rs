//! WhatsApp Cloud API channel adapter.
//!
//! Inbound traffic arrives on a Meta webhook: a GET subscription handshake
//! plus POSTed message/status payloads signed with HMAC-SHA256 over the raw
//! body. Outbound media uses Meta's two-step protocol (upload the binary,
//! then reference the returned media id).

pub mod adapter;
pub mod config;
pub mod inbound;
pub mod outbound;
pub mod types;
pub mod webhook;

pub use {adapter::WhatsAppAdapter, config::WhatsAppCredentials};
