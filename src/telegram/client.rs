//! Telegram Bot API client
//!
//! Uses a long-lived reqwest::Client for connection pooling. Errors are
//! stripped of their URL before logging because the URL embeds the token.

use super::types::{
    AnswerCallbackQuery, ApiResponse, GetUpdates, SendMessage, SetWebhook, Update, ALLOWED_UPDATES,
};
use crate::bot::Messenger;
use crate::error::BotError;
use crate::models::{ConversationId, OutboundMessage};
use crate::Result;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info};

/// Long-poll window requested from `getUpdates`.
pub const POLL_TIMEOUT_SECS: u64 = 30;

/// Reusable Telegram client (connection-pooled)
pub struct TelegramClient {
    client: Client,
    base_url: String,
}

impl TelegramClient {
    pub fn new(api_url: &str, token: &str) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            // must outlast the long-poll window
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 30))
            .build()?;

        Ok(Self {
            client,
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
        })
    }

    async fn call<B, T>(&self, method: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, method);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                let e = e.without_url();
                error!(method, "Telegram request failed: {}", e);
                BotError::Transport(format!("Telegram {} request failed: {}", method, e))
            })?;

        let status = response.status();
        let body: ApiResponse<T> = response.json().await.map_err(|e| {
            BotError::TelegramApi(format!(
                "Invalid {} response ({}): {}",
                method,
                status,
                e.without_url()
            ))
        })?;

        if !body.ok {
            let description = body.description.unwrap_or_else(|| status.to_string());
            error!(method, %status, "Telegram API error: {}", description);
            return Err(BotError::TelegramApi(format!("{} failed: {}", method, description)));
        }

        body.result
            .ok_or_else(|| BotError::TelegramApi(format!("{} returned no result", method)))
    }

    pub async fn send_message(&self, request: &SendMessage) -> Result<()> {
        let _: serde_json::Value = self.call("sendMessage", request).await?;
        debug!(chat_id = %request.chat_id, "Message sent");
        Ok(())
    }

    pub async fn answer_callback_query(&self, callback_query_id: &str) -> Result<()> {
        let _: bool = self
            .call(
                "answerCallbackQuery",
                &AnswerCallbackQuery {
                    callback_query_id: callback_query_id.to_string(),
                },
            )
            .await?;
        Ok(())
    }

    pub async fn get_updates(&self, offset: Option<i64>, timeout_secs: u64) -> Result<Vec<Update>> {
        self.call(
            "getUpdates",
            &GetUpdates {
                offset,
                timeout: timeout_secs,
                allowed_updates: ALLOWED_UPDATES.to_vec(),
            },
        )
        .await
    }

    pub async fn set_webhook(&self, url: &str, secret_token: Option<&str>) -> Result<()> {
        let _: bool = self
            .call(
                "setWebhook",
                &SetWebhook {
                    url: url.to_string(),
                    secret_token: secret_token.map(str::to_string),
                    allowed_updates: ALLOWED_UPDATES.to_vec(),
                },
            )
            .await?;
        info!(%url, "Webhook registered");
        Ok(())
    }

    pub async fn delete_webhook(&self) -> Result<()> {
        let _: bool = self.call("deleteWebhook", &serde_json::json!({})).await?;
        info!("Webhook removed");
        Ok(())
    }
}

#[async_trait::async_trait]
impl Messenger for TelegramClient {
    async fn send(&self, conversation: &ConversationId, message: &OutboundMessage) -> Result<()> {
        self.send_message(&SendMessage::from_outbound(conversation, message))
            .await
    }

    async fn acknowledge(&self, callback_id: &str) -> Result<()> {
        self.answer_callback_query(callback_id).await
    }
}
