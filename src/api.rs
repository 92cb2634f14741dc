//! Webhook HTTP server
//!
//! Telegram pushes updates to `POST /api/webhook`. Each update is handled to
//! completion before responding, so a 500 lets Telegram redeliver it.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::bot::Bot;
use crate::telegram::Update;

/// Header Telegram echoes the registered secret token in
pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub bot: Arc<Bot>,
    pub webhook_secret: Option<Arc<str>>,
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Webhook Endpoints
/// =============================

async fn webhook_status() -> &'static str {
    "Telegram Bot Webhook is active!"
}

async fn receive_update(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    if let Some(secret) = &state.webhook_secret {
        let presented = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if presented != Some(secret.as_ref()) {
            warn!("Rejected webhook call with missing or wrong secret token");
            return (StatusCode::UNAUTHORIZED, "Unauthorized");
        }
    }

    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            // Redelivery would fail the same way
            warn!("Ignoring undecodable update: {}", e);
            return (StatusCode::OK, "OK");
        }
    };

    let update_id = update.update_id;
    let Some(envelope) = update.into_envelope() else {
        return (StatusCode::OK, "OK");
    };

    match state.bot.dispatch(envelope).await {
        Ok(()) => (StatusCode::OK, "OK"),
        Err(e) => {
            error!(update_id, "Error processing webhook: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Error processing webhook")
        }
    }
}

/// =============================
/// Router Setup
/// =============================

pub fn create_router(bot: Arc<Bot>, webhook_secret: Option<String>) -> Router {
    let state = ApiState {
        bot,
        webhook_secret: webhook_secret.map(Arc::from),
    };

    Router::new()
        .route("/health", get(health))
        .route("/api/webhook", get(webhook_status).post(receive_update))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(bot: Arc<Bot>, webhook_secret: Option<String>, port: u16) -> crate::Result<()> {
    let router = create_router(bot, webhook_secret);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("Webhook server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down webhook server");
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::Messenger;
    use crate::calculator::{CalculatorConfig, LotSizeCalculator};
    use crate::dialogue::DialogueEngine;
    use crate::error::BotError;
    use crate::models::{ConversationId, OutboundMessage};
    use crate::state::InMemorySessionStore;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;
    use tower::ServiceExt;

    #[derive(Default)]
    struct Outbox {
        sent: Mutex<Vec<(ConversationId, String)>>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl Messenger for Outbox {
        async fn send(&self, conversation: &ConversationId, message: &OutboundMessage) -> crate::Result<()> {
            if self.fail {
                return Err(BotError::Transport("connection reset".to_string()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((conversation.clone(), message.text.clone()));
            Ok(())
        }
    }

    fn bot(outbox: Arc<Outbox>) -> Arc<Bot> {
        Arc::new(Bot::new(
            DialogueEngine::new(LotSizeCalculator::new(CalculatorConfig::default())),
            Arc::new(InMemorySessionStore::new(Duration::from_secs(60))),
            outbox,
            Duration::ZERO,
        ))
    }

    fn post_update(body: String, secret: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/webhook")
            .header("content-type", "application/json");
        if let Some(secret) = secret {
            builder = builder.header(SECRET_HEADER, secret);
        }
        builder.body(Body::from(body)).unwrap()
    }

    fn start_update() -> String {
        json!({
            "update_id": 1,
            "message": { "message_id": 1, "chat": { "id": 555 }, "text": "/start" }
        })
        .to_string()
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_webhook_handles_update() {
        let outbox = Arc::new(Outbox::default());
        let router = create_router(bot(outbox.clone()), None);

        let response = router.oneshot(post_update(start_update(), None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "OK");
        let sent = outbox.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, ConversationId::from(555_i64));
    }

    #[tokio::test]
    async fn test_webhook_secret_mismatch() {
        let outbox = Arc::new(Outbox::default());
        let router = create_router(bot(outbox.clone()), Some("s3cret".to_string()));

        let response = router
            .clone()
            .oneshot(post_update(start_update(), Some("wrong")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(outbox.sent.lock().unwrap().is_empty());

        let response = router
            .oneshot(post_update(start_update(), Some("s3cret")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_webhook_processing_failure() {
        let outbox = Arc::new(Outbox {
            fail: true,
            ..Default::default()
        });
        let router = create_router(bot(outbox), None);

        let response = router.oneshot(post_update(start_update(), None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, "Error processing webhook");
    }

    #[tokio::test]
    async fn test_undecodable_body_is_acknowledged() {
        let outbox = Arc::new(Outbox::default());
        let router = create_router(bot(outbox.clone()), None);

        let response = router
            .oneshot(post_update("{not json".to_string(), None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(outbox.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_status_and_health() {
        let router = create_router(bot(Arc::new(Outbox::default())), None);

        let response = router
            .clone()
            .oneshot(Request::builder().uri("/api/webhook").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "Telegram Bot Webhook is active!");

        let response = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let health: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(health["status"], "healthy");
    }
}
