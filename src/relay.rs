use log::{ error, info };
use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::cli::Args;
use crate::history::{ create_snapshot_store, ConversationStore, HistoryPolicy, StoreError };
use crate::llm::LlmConfig;
use crate::llm::chat::{ ChatClient, new_client as new_chat_client };

/// Reply used when the completion response carries no message content.
pub const FALLBACK_REPLY: &str = "Sorry, I didn't understand.";

/// Runs one user turn against the completion endpoint and records it in the
/// conversation store.
///
/// Turns of the same user are serialized by a per-user lock; turns of
/// different users run concurrently and only contend on the table lock inside
/// [`ConversationStore`], which is never held across the remote call.
pub struct ChatRelay {
    chat_client: Arc<dyn ChatClient>,
    store: Arc<ConversationStore>,
    turn_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ChatRelay {
    pub fn new(chat_client: Arc<dyn ChatClient>, store: Arc<ConversationStore>) -> Self {
        Self {
            chat_client,
            store,
            turn_locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn from_args(args: &Args) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let llm_config = LlmConfig::from_args(args);
        let chat_client = new_chat_client(&llm_config)?;
        info!(
            "Chat client configured: Model={}, URL={}",
            chat_client.get_model(),
            chat_client.get_base_url().as_deref().unwrap_or("adapter default")
        );

        let policy = HistoryPolicy::from_args(args)?;
        let snapshots = create_snapshot_store(args)?;
        let store = ConversationStore::open(snapshots, policy).await?;

        Ok(Self::new(chat_client, Arc::new(store)))
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    async fn turn_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.turn_locks.lock().await;
        locks.entry(user_id.to_string()).or_default().clone()
    }

    /// Drops the user's lock once no other turn holds or waits on it. Clones
    /// are only taken under the map lock, so a count of two (map + `lock`)
    /// means nobody else can reach it.
    async fn release_turn_lock(&self, user_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.turn_locks.lock().await;
        if Arc::strong_count(&lock) == 2 {
            locks.remove(user_id);
        }
    }

    /// Never fails: any error is logged and returned to the user as
    /// `Error: <details>`. The user entry stays in history even when the turn
    /// fails.
    pub async fn converse(&self, user_id: &str, user_message: &str) -> String {
        let lock = self.turn_lock(user_id).await;
        let turn = lock.lock().await;

        let reply = match self.run_turn(user_id, user_message).await {
            Ok(reply) => {
                info!("User {} - API response: {}", user_id, reply);
                reply
            }
            Err(e) => {
                error!("Error for user {}: {}", user_id, e);
                format!("Error: {}", e)
            }
        };

        drop(turn);
        self.release_turn_lock(user_id, lock).await;
        reply
    }

    async fn run_turn(
        &self,
        user_id: &str,
        user_message: &str
    ) -> Result<String, Box<dyn Error + Send + Sync>> {
        let history = self.store.record_user_message(user_id, user_message).await;
        let completion = self.chat_client.complete(&history).await?;
        let reply = completion.response.unwrap_or_else(|| FALLBACK_REPLY.to_string());
        self.store.record_reply(user_id, &reply).await?;
        Ok(reply)
    }

    /// Starts the user over from the system entry and persists the table.
    pub async fn reset(&self, user_id: &str) -> Result<(), StoreError> {
        let lock = self.turn_lock(user_id).await;
        let turn = lock.lock().await;
        let result = self.store.reset(user_id).await;

        drop(turn);
        self.release_turn_lock(user_id, lock).await;
        result
    }
}
