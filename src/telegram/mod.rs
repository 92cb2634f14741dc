//! Telegram transport
//!
//! Decodes Bot API updates into inbound events and delivers outbound
//! messages through the Bot API.

pub mod client;
pub mod types;

pub use client::{TelegramClient, POLL_TIMEOUT_SECS};
pub use types::Update;
