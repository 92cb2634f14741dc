//! Bot dispatcher
//!
//! Glues the pure dialogue engine to its two side-effecting boundaries:
//! the session store and the messenger. Each inbound event for a
//! conversation is processed under that conversation's lock, so
//! load → decide → save → send is a single unit per conversation while
//! different conversations proceed concurrently.

use crate::dialogue::DialogueEngine;
use crate::models::{ConversationId, InboundEvent, OutboundMessage};
use crate::state::SessionStore;
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Outbound side of the messaging transport
#[async_trait::async_trait]
pub trait Messenger: Send + Sync {
    async fn send(&self, conversation: &ConversationId, message: &OutboundMessage) -> Result<()>;

    /// Confirm receipt of a button press (clears the client's spinner).
    async fn acknowledge(&self, _callback_id: &str) -> Result<()> {
        Ok(())
    }
}

/// One decoded inbound event plus its routing data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEnvelope {
    pub conversation: ConversationId,
    pub event: InboundEvent,
    /// Transport token to acknowledge, present for button presses
    pub callback_id: Option<String>,
}

pub struct Bot {
    engine: DialogueEngine,
    store: Arc<dyn SessionStore>,
    messenger: Arc<dyn Messenger>,
    follow_up_delay: Duration,
    locks: Mutex<HashMap<ConversationId, Arc<Mutex<()>>>>,
}

impl Bot {
    pub fn new(
        engine: DialogueEngine,
        store: Arc<dyn SessionStore>,
        messenger: Arc<dyn Messenger>,
        follow_up_delay: Duration,
    ) -> Self {
        Self {
            engine,
            store,
            messenger,
            follow_up_delay,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Process one inbound event to completion, including the follow-up.
    ///
    /// Store and send failures are returned to the caller; no retries.
    pub async fn dispatch(&self, inbound: InboundEnvelope) -> Result<()> {
        if let Some(callback_id) = &inbound.callback_id {
            if let Err(error) = self.messenger.acknowledge(callback_id).await {
                warn!(conversation = %inbound.conversation, %error, "Failed to acknowledge selection");
            }
        }

        let lock = self.conversation_lock(&inbound.conversation).await;
        let result = {
            let _guard = lock.lock().await;
            self.process(&inbound).await
        };
        drop(lock);
        self.release_lock(&inbound.conversation).await;

        result
    }

    async fn process(&self, inbound: &InboundEnvelope) -> Result<()> {
        let id = &inbound.conversation;

        let session = match self.store.load(id).await {
            Ok(session) => session,
            Err(error) => {
                warn!(conversation = %id, %error, "Session load failed, continuing with a fresh session");
                None
            }
        };
        let step_before = session.as_ref().map(|s| s.step);

        let turn = self.engine.handle(session, &inbound.event);

        debug!(
            conversation = %id,
            from = ?step_before,
            to = ?turn.session.as_ref().map(|s| s.step),
            "Turn decided"
        );

        match &turn.session {
            Some(session) => self.store.save(id, session).await?,
            None => self.store.clear(id).await?,
        }

        for reply in &turn.replies {
            self.messenger.send(id, reply).await?;
        }

        if let Some(follow_up) = &turn.follow_up {
            if !self.follow_up_delay.is_zero() {
                tokio::time::sleep(self.follow_up_delay).await;
            }
            self.messenger.send(id, follow_up).await?;
        }

        Ok(())
    }

    async fn conversation_lock(&self, id: &ConversationId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the lock entry once no task holds or awaits it.
    async fn release_lock(&self, id: &ConversationId) {
        let mut locks = self.locks.lock().await;
        if locks
            .get(id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(id);
        }
    }

    #[cfg(test)]
    async fn tracked_locks(&self) -> usize {
        self.locks.lock().await.len()
    }
}
