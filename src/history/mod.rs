mod file;
mod memory;

pub use file::{ AtomicFileStore, OverwriteFileStore };
pub use memory::MemorySnapshotStore;

use async_trait::async_trait;
use log::info;
use serde::{ Deserialize, Serialize };
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::cli::Args;
use crate::models::chat::{ ChatMessage, Conversation, Role };

pub const DEFAULT_MAX_HISTORY: usize = 30;
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("conversation store is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unsupported persistence strategy: {0}")]
    UnsupportedStrategy(String),
}

/// What happens to the oldest entries once a conversation grows past
/// `max_history`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrimPolicy {
    /// Keep the most recent `max_history` entries, whatever their role.
    #[default]
    Window,
    /// Keep a leading system entry, plus the most recent `max_history - 1` entries.
    PinSystem,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseTrimPolicyError {
    message: String,
}

impl fmt::Display for ParseTrimPolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseTrimPolicyError {}

impl FromStr for TrimPolicy {
    type Err = ParseTrimPolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "window" => Ok(TrimPolicy::Window),
            "pin-system" | "pin_system" => Ok(TrimPolicy::PinSystem),
            _ =>
                Err(ParseTrimPolicyError {
                    message: format!("Invalid trim policy: '{}'", s),
                }),
        }
    }
}

impl fmt::Display for TrimPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrimPolicy::Window => write!(f, "window"),
            TrimPolicy::PinSystem => write!(f, "pin-system"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HistoryPolicy {
    pub max_history: usize,
    pub system_prompt: String,
    pub trim: TrimPolicy,
}

impl Default for HistoryPolicy {
    fn default() -> Self {
        Self {
            max_history: DEFAULT_MAX_HISTORY,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            trim: TrimPolicy::Window,
        }
    }
}

impl HistoryPolicy {
    pub fn from_args(args: &Args) -> Result<Self, ParseTrimPolicyError> {
        Ok(Self {
            max_history: usize::try_from(args.max_history).unwrap_or(usize::MAX),
            system_prompt: args.system_prompt.clone(),
            trim: args.trim_policy.parse()?,
        })
    }

    fn seed(&self) -> Conversation {
        vec![ChatMessage::system(self.system_prompt.clone())]
    }

    fn trim(&self, conversation: &mut Conversation) {
        let max = self.max_history.max(1);
        if conversation.len() <= max {
            return;
        }
        let excess = conversation.len() - max;
        // A pinned preamble needs room for at least one more entry, or the
        // newest entry would be the one dropped.
        let pinned = self.trim == TrimPolicy::PinSystem &&
            max > 1 &&
            conversation.first().map_or(false, |m| m.role == Role::System);
        if pinned {
            conversation.drain(1..1 + excess);
        } else {
            conversation.drain(..excess);
        }
    }
}

/// Every user's conversation, keyed by the platform user id. Serializes as a
/// plain JSON object of `user id -> [{role, content}, ...]`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationTable {
    conversations: BTreeMap<String, Conversation>,
}

impl ConversationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user_id: &str) -> Option<&Conversation> {
        self.conversations.get(user_id)
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    pub fn get_or_init(&mut self, user_id: &str, policy: &HistoryPolicy) -> &mut Conversation {
        self.conversations.entry(user_id.to_string()).or_insert_with(|| policy.seed())
    }

    pub fn append(&mut self, user_id: &str, entry: ChatMessage, policy: &HistoryPolicy) {
        let conversation = self.get_or_init(user_id, policy);
        conversation.push(entry);
        policy.trim(conversation);
    }

    pub fn reset(&mut self, user_id: &str, policy: &HistoryPolicy) {
        self.conversations.insert(user_id.to_string(), policy.seed());
    }
}

/// Durability strategy for the conversation table. Implementations always
/// receive the whole table.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Returns an empty table when nothing has been persisted yet.
    async fn load(&self) -> Result<ConversationTable, StoreError>;

    async fn save(&self, table: &ConversationTable) -> Result<(), StoreError>;

    fn describe(&self) -> String;
}

pub fn create_snapshot_store(args: &Args) -> Result<Arc<dyn SnapshotStore>, StoreError> {
    match args.persist_strategy.to_lowercase().as_str() {
        "overwrite" => Ok(Arc::new(OverwriteFileStore::new(&args.conversations_path))),
        "atomic" => Ok(Arc::new(AtomicFileStore::new(&args.conversations_path))),
        "memory" => Ok(Arc::new(MemorySnapshotStore::new())),
        other => Err(StoreError::UnsupportedStrategy(other.to_string())),
    }
}

/// Sole owner of the in-memory conversation table. Every mutation that must be
/// durable is followed by a full snapshot save while the table lock is held, so
/// snapshots reach storage in mutation order.
pub struct ConversationStore {
    table: Mutex<ConversationTable>,
    snapshots: Arc<dyn SnapshotStore>,
    policy: HistoryPolicy,
}

impl ConversationStore {
    pub fn new(
        table: ConversationTable,
        snapshots: Arc<dyn SnapshotStore>,
        policy: HistoryPolicy
    ) -> Self {
        Self {
            table: Mutex::new(table),
            snapshots,
            policy,
        }
    }

    /// Loads the persisted table. A malformed snapshot is returned as an error.
    pub async fn open(
        snapshots: Arc<dyn SnapshotStore>,
        policy: HistoryPolicy
    ) -> Result<Self, StoreError> {
        let table = snapshots.load().await?;
        info!("Conversation store ready: {} user(s) via {}", table.len(), snapshots.describe());
        Ok(Self::new(table, snapshots, policy))
    }

    pub async fn conversation(&self, user_id: &str) -> Option<Conversation> {
        self.table.lock().await.get(user_id).cloned()
    }

    pub async fn snapshot(&self) -> ConversationTable {
        self.table.lock().await.clone()
    }

    /// Seeds the conversation if needed, appends the user entry and returns the
    /// trimmed history to send upstream. Nothing is persisted here.
    pub async fn record_user_message(&self, user_id: &str, content: &str) -> Conversation {
        let mut table = self.table.lock().await;
        table.get_or_init(user_id, &self.policy);
        table.append(user_id, ChatMessage::user(content), &self.policy);
        table.get(user_id).cloned().unwrap_or_default()
    }

    pub async fn record_reply(&self, user_id: &str, content: &str) -> Result<(), StoreError> {
        let mut table = self.table.lock().await;
        table.append(user_id, ChatMessage::assistant(content), &self.policy);
        self.snapshots.save(&table).await
    }

    pub async fn reset(&self, user_id: &str) -> Result<(), StoreError> {
        let mut table = self.table.lock().await;
        table.reset(user_id, &self.policy);
        self.snapshots.save(&table).await
    }

    pub async fn save(&self) -> Result<(), StoreError> {
        let table = self.table.lock().await;
        self.snapshots.save(&table).await
    }
}
