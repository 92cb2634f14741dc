//! Long-polling host
//!
//! Pulls update batches with `getUpdates`. Each batch is split per
//! conversation; conversations run concurrently while updates within one
//! conversation keep their arrival order.

use crate::bot::{Bot, InboundEnvelope};
use crate::models::ConversationId;
use crate::telegram::{TelegramClient, Update, POLL_TIMEOUT_SECS};
use crate::Result;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

const RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// Poll until `shutdown` resolves.
pub async fn run_polling<F>(bot: Arc<Bot>, client: Arc<TelegramClient>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    // getUpdates is refused while a webhook is registered
    client.delete_webhook().await?;
    info!("Long polling started");

    tokio::pin!(shutdown);
    let mut offset: Option<i64> = None;

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping polling");
                return Ok(());
            }
            polled = client.get_updates(offset, POLL_TIMEOUT_SECS) => match polled {
                Ok(updates) => {
                    if let Some(last) = updates.last() {
                        offset = Some(last.update_id + 1);
                    }
                    if !updates.is_empty() {
                        debug!(count = updates.len(), "Received updates");
                        dispatch_batch(&bot, updates).await;
                    }
                }
                Err(error) => {
                    warn!(%error, "getUpdates failed, backing off");
                    tokio::time::sleep(RETRY_BACKOFF).await;
                }
            }
        }
    }
}

async fn dispatch_batch(bot: &Arc<Bot>, updates: Vec<Update>) {
    let mut tasks = JoinSet::new();

    for (conversation, envelopes) in group_by_conversation(updates) {
        let bot = Arc::clone(bot);
        tasks.spawn(async move {
            for envelope in envelopes {
                if let Err(error) = bot.dispatch(envelope).await {
                    error!(%conversation, %error, "Failed to handle update");
                }
            }
        });
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(error) = joined {
            error!(%error, "Update task aborted");
        }
    }
}

/// Group decodable updates by conversation, keeping first-seen conversation
/// order and per-conversation arrival order.
pub fn group_by_conversation(updates: Vec<Update>) -> Vec<(ConversationId, Vec<InboundEnvelope>)> {
    let mut groups: Vec<(ConversationId, Vec<InboundEnvelope>)> = Vec::new();
    let mut index: HashMap<ConversationId, usize> = HashMap::new();

    for update in updates {
        let update_id = update.update_id;
        let Some(envelope) = update.into_envelope() else {
            debug!(update_id, "Ignoring update without message or callback");
            continue;
        };

        match index.get(&envelope.conversation) {
            Some(&position) => groups[position].1.push(envelope),
            None => {
                index.insert(envelope.conversation.clone(), groups.len());
                groups.push((envelope.conversation.clone(), vec![envelope]));
            }
        }
    }

    groups
}
