//! Telegram Bot API channel adapter.
//!
//! Inbound updates arrive over a webhook verified by the
//! `X-Telegram-Bot-Api-Secret-Token` header; outbound messages go through
//! the Bot API, with media uploaded inline as multipart.

pub mod adapter;
pub mod config;
pub mod inbound;
pub mod outbound;
pub mod types;

pub use {adapter::TelegramAdapter, config::TelegramCredentials};
