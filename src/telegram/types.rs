//! Telegram Bot API wire types (the subset this bot uses)

use crate::bot::InboundEnvelope;
use crate::models::{ConversationId, InboundEvent, OutboundMessage, TextFormat};
use serde::{Deserialize, Serialize};

//
// ================= Inbound =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

impl Update {
    /// Decode into a transport-neutral event.
    ///
    /// Returns `None` for update kinds the bot does not handle (edited
    /// messages, channel posts, ...). Messages without text and button
    /// presses without data become `InboundEvent::Unsupported`.
    pub fn into_envelope(self) -> Option<InboundEnvelope> {
        if let Some(query) = self.callback_query {
            let chat_id = query
                .message
                .as_ref()
                .map(|m| m.chat.id)
                .unwrap_or(query.from.id);

            let event = match query.data {
                Some(data) if !data.is_empty() => InboundEvent::Selection(data),
                _ => InboundEvent::Unsupported,
            };

            return Some(InboundEnvelope {
                conversation: ConversationId::from(chat_id),
                event,
                callback_id: Some(query.id),
            });
        }

        let message = self.message?;
        let event = match message.text {
            Some(text) => InboundEvent::Text(text),
            None => InboundEvent::Unsupported,
        };

        Some(InboundEnvelope {
            conversation: ConversationId::from(message.chat.id),
            event,
            callback_id: None,
        })
    }
}

//
// ================= Outbound =================
//

#[derive(Debug, Clone, Serialize)]
pub struct SendMessage {
    pub chat_id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_markup: Option<InlineKeyboardMarkup>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InlineKeyboardButton {
    pub text: String,
    pub callback_data: String,
}

impl SendMessage {
    pub fn from_outbound(conversation: &ConversationId, message: &OutboundMessage) -> Self {
        let parse_mode = match message.format {
            TextFormat::Markdown => Some("Markdown"),
            TextFormat::Plain => None,
        };

        let reply_markup = (!message.options.is_empty()).then(|| InlineKeyboardMarkup {
            inline_keyboard: message
                .options
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|option| InlineKeyboardButton {
                            text: option.label.clone(),
                            callback_data: option.tag.clone(),
                        })
                        .collect()
                })
                .collect(),
        });

        Self {
            chat_id: conversation.0.clone(),
            text: message.text.clone(),
            parse_mode,
            reply_markup,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GetUpdates {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    pub timeout: u64,
    pub allowed_updates: Vec<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SetWebhook {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_token: Option<String>,
    pub allowed_updates: Vec<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerCallbackQuery {
    pub callback_query_id: String,
}

/// Envelope every Bot API method responds with
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    #[serde(default)]
    pub description: Option<String>,
}

pub const ALLOWED_UPDATES: [&str; 2] = ["message", "callback_query"];
