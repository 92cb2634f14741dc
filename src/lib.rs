//! Optimal Lot Size Bot
//!
//! A Telegram bot that walks a trader through a short questionnaire and
//! returns the position size that keeps the loss at the stop within a chosen
//! share of the account balance.
//!
//! FLOW:
//! UPDATE → DECODE → LOCK CONVERSATION → LOAD → DIALOGUE → SAVE → REPLY

pub mod api;
pub mod bot;
pub mod calculator;
pub mod config;
pub mod dialogue;
pub mod error;
pub mod models;
pub mod polling;
pub mod state;
pub mod telegram;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use bot::{Bot, InboundEnvelope, Messenger};
pub use calculator::{CalculatorConfig, LotSizeCalculator, TradeInputs};
pub use config::BotConfig;
pub use dialogue::{DialogueEngine, Turn};
