//! Postgres-backed session store

use super::{is_expired, SessionStore};
use crate::error::BotError;
use crate::models::{ConversationId, Session};
use crate::Result;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;

/// Sessions serialized as JSON text, one row per conversation.
pub struct PostgresSessionStore {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
    ttl: Duration,
}

impl PostgresSessionStore {
    pub fn new(pool: PgPool, ttl: Duration) -> Self {
        Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
            ttl,
        }
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS conversation_sessions (
                      conversation_id TEXT PRIMARY KEY,
                      session TEXT NOT NULL,
                      updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                BotError::Database(format!("Failed to initialize session schema: {}", e))
            })?;

        Ok(())
    }

    /// Delete every row older than the TTL.
    async fn sweep_expired(&self) -> Result<()> {
        let Some(cutoff) = chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_sub_signed(ttl))
        else {
            return Ok(());
        };

        let swept = sqlx::query("DELETE FROM conversation_sessions WHERE updated_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| BotError::Database(format!("Failed to sweep sessions: {}", e)))?
            .rows_affected();

        if swept > 0 {
            debug!(swept, "Swept expired sessions");
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl SessionStore for PostgresSessionStore {
    async fn load(&self, id: &ConversationId) -> Result<Option<Session>> {
        self.ensure_schema().await?;

        let row = sqlx::query(
            "SELECT session, updated_at FROM conversation_sessions WHERE conversation_id = $1",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| BotError::Database(format!("Failed to load session: {}", e)))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let updated_at: DateTime<Utc> = row
            .try_get("updated_at")
            .map_err(|e| BotError::Database(format!("Invalid session timestamp: {}", e)))?;

        if is_expired(updated_at, self.ttl) {
            debug!(conversation = %id, "Session expired");
            self.clear(id).await?;
            return Ok(None);
        }

        let raw: String = row
            .try_get("session")
            .map_err(|e| BotError::Database(format!("Invalid session row: {}", e)))?;

        let session = serde_json::from_str(&raw)
            .map_err(|e| BotError::Session(format!("Corrupt session for {}: {}", id, e)))?;

        Ok(Some(session))
    }

    async fn save(&self, id: &ConversationId, session: &Session) -> Result<()> {
        self.ensure_schema().await?;

        let raw = serde_json::to_string(session)?;

        sqlx::query(
            r#"
            INSERT INTO conversation_sessions (conversation_id, session, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (conversation_id)
            DO UPDATE SET session = EXCLUDED.session, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&id.0)
        .bind(raw)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| BotError::Database(format!("Failed to save session: {}", e)))?;

        self.sweep_expired().await
    }

    async fn clear(&self, id: &ConversationId) -> Result<()> {
        self.ensure_schema().await?;

        sqlx::query("DELETE FROM conversation_sessions WHERE conversation_id = $1")
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(|e| BotError::Database(format!("Failed to clear session: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Step;
    use sqlx::postgres::PgPoolOptions;

    async fn live_store(ttl: Duration) -> PostgresSessionStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(&url)
            .await
            .expect("database reachable");
        PostgresSessionStore::new(pool, ttl)
    }

    fn unique_id(label: &str) -> ConversationId {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        ConversationId(format!("test-{}-{}", label, nanos))
    }

    #[tokio::test]
    #[ignore = "needs DATABASE_URL pointing at a Postgres instance"]
    async fn test_save_load_clear() {
        let store = live_store(Duration::from_secs(3600)).await;
        let id = unique_id("roundtrip");

        assert!(store.load(&id).await.unwrap().is_none());

        let mut session = Session::start();
        session.step = Step::StopLoss;
        session.state.symbol = Some("GBPUSD".to_string());
        store.save(&id, &session).await.unwrap();
        assert_eq!(store.load(&id).await.unwrap(), Some(session));

        store.save(&id, &Session::complete()).await.unwrap();
        assert_eq!(store.load(&id).await.unwrap(), Some(Session::complete()));

        store.clear(&id).await.unwrap();
        assert!(store.load(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    #[ignore = "needs DATABASE_URL pointing at a Postgres instance"]
    async fn test_expired_rows_are_dropped() {
        let store = live_store(Duration::from_secs(60)).await;
        let stale = unique_id("stale");
        let other = unique_id("other");

        store.save(&stale, &Session::start()).await.unwrap();
        sqlx::query(
            "UPDATE conversation_sessions SET updated_at = NOW() - INTERVAL '2 hours' \
             WHERE conversation_id = $1",
        )
        .bind(&stale.0)
        .execute(&store.pool)
        .await
        .unwrap();

        // Saving any conversation sweeps the stale row
        store.save(&other, &Session::start()).await.unwrap();
        let remaining: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM conversation_sessions WHERE conversation_id = $1",
        )
        .bind(&stale.0)
        .fetch_one(&store.pool)
        .await
        .unwrap();
        assert_eq!(remaining, 0);
        assert!(store.load(&stale).await.unwrap().is_none());

        store.clear(&other).await.unwrap();
    }
}
