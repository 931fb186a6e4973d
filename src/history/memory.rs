use async_trait::async_trait;
use log::debug;
use std::sync::atomic::{ AtomicUsize, Ordering };
use std::sync::Mutex;

use super::{ ConversationTable, SnapshotStore, StoreError };

/// Keeps the last snapshot in memory only. History is lost on restart.
#[derive(Default)]
pub struct MemorySnapshotStore {
    snapshot: Mutex<ConversationTable>,
    saves: AtomicUsize,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of completed saves.
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn load(&self) -> Result<ConversationTable, StoreError> {
        let snapshot = self.snapshot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(snapshot.clone())
    }

    async fn save(&self, table: &ConversationTable) -> Result<(), StoreError> {
        let mut snapshot = self.snapshot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *snapshot = table.clone();
        let count = self.saves.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("In-memory snapshot #{} holds {} user(s)", count, table.len());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
