//! Session persistence layer
//!
//! Stores one `Session` per conversation. Idle sessions expire after a
//! configurable TTL; expiry is checked on load.

use crate::models::{ConversationId, Session};
use crate::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub mod postgres;

pub use postgres::PostgresSessionStore;

/// Trait for per-conversation session persistence
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, id: &ConversationId) -> Result<Option<Session>>;
    async fn save(&self, id: &ConversationId, session: &Session) -> Result<()>;
    async fn clear(&self, id: &ConversationId) -> Result<()>;
}

/// True when a session last written at `updated_at` has outlived `ttl`.
pub(crate) fn is_expired(updated_at: DateTime<Utc>, ttl: Duration) -> bool {
    Utc::now()
        .signed_duration_since(updated_at)
        .to_std()
        .map(|age| age > ttl)
        .unwrap_or(false)
}

#[derive(Debug, Clone)]
struct StoredSession {
    session: Session,
    updated_at: DateTime<Utc>,
}

/// In-memory session store for development and single-process hosting
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<ConversationId, StoredSession>>>,
    ttl: Duration,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, id: &ConversationId) -> Result<Option<Session>> {
        {
            let sessions = self.sessions.read().await;
            match sessions.get(id) {
                None => return Ok(None),
                Some(stored) if !is_expired(stored.updated_at, self.ttl) => {
                    return Ok(Some(stored.session.clone()));
                }
                Some(_) => {}
            }
        }

        debug!(conversation = %id, "Session expired");
        self.sessions.write().await.remove(id);
        Ok(None)
    }

    async fn save(&self, id: &ConversationId, session: &Session) -> Result<()> {
        let mut sessions = self.sessions.write().await;

        let before = sessions.len();
        sessions.retain(|_, stored| !is_expired(stored.updated_at, self.ttl));
        if sessions.len() < before {
            debug!(removed = before - sessions.len(), "Swept expired sessions");
        }

        sessions.insert(
            id.clone(),
            StoredSession {
                session: session.clone(),
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn clear(&self, id: &ConversationId) -> Result<()> {
        self.sessions.write().await.remove(id);
        Ok(())
    }
}

/// Pick Postgres when a database URL is configured, in-memory otherwise.
pub fn build_session_store(database_url: Option<&str>, ttl: Duration) -> Arc<dyn SessionStore> {
    if let Some(url) = database_url {
        match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(url)
        {
            Ok(pool) => {
                info!("Session store backend: postgres");
                return Arc::new(PostgresSessionStore::new(pool, ttl));
            }
            Err(error) => {
                warn!(
                    "Failed to initialize postgres session store, falling back to in-memory: {}",
                    error
                );
            }
        }
    }

    info!("Session store backend: in-memory");
    Arc::new(InMemorySessionStore::new(ttl))
}
