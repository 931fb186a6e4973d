use async_trait::async_trait;
use log::{ debug, info };
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{ Path, PathBuf };
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{ ConversationTable, SnapshotStore, StoreError };

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Pretty-printed with four-space indentation; serde_json leaves non-ASCII text
/// unescaped.
fn encode(table: &ConversationTable) -> Result<Vec<u8>, StoreError> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    table.serialize(&mut serializer)?;
    Ok(buf)
}

async fn read_table(path: &Path) -> Result<ConversationTable, StoreError> {
    match fs::read(path).await {
        Ok(bytes) => {
            let table: ConversationTable = serde_json::from_slice(&bytes)?;
            info!("Loaded existing conversations from {}.", path.display());
            Ok(table)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("No existing conversations found at {}. Starting fresh.", path.display());
            Ok(ConversationTable::new())
        }
        Err(e) => Err(io_error(path, e)),
    }
}

/// Rewrites the snapshot file in place. A crash mid-write can leave a
/// truncated file behind.
pub struct OverwriteFileStore {
    path: PathBuf,
}

impl OverwriteFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SnapshotStore for OverwriteFileStore {
    async fn load(&self) -> Result<ConversationTable, StoreError> {
        read_table(&self.path).await
    }

    async fn save(&self, table: &ConversationTable) -> Result<(), StoreError> {
        let bytes = encode(table)?;
        fs::write(&self.path, bytes).await.map_err(|e| io_error(&self.path, e))?;
        info!("Conversations saved to {}.", self.path.display());
        Ok(())
    }

    fn describe(&self) -> String {
        format!("overwrite:{}", self.path.display())
    }
}

/// Writes the snapshot to a sibling temp file, syncs it, then renames it over
/// the target so readers only ever see a complete snapshot.
pub struct AtomicFileStore {
    path: PathBuf,
    tmp_path: PathBuf,
}

impl AtomicFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        Self {
            path,
            tmp_path: PathBuf::from(tmp),
        }
    }
}

#[async_trait]
impl SnapshotStore for AtomicFileStore {
    async fn load(&self) -> Result<ConversationTable, StoreError> {
        read_table(&self.path).await
    }

    async fn save(&self, table: &ConversationTable) -> Result<(), StoreError> {
        let bytes = encode(table)?;
        let mut file = fs::File::create(&self.tmp_path).await.map_err(|e| io_error(&self.tmp_path, e))?;
        file.write_all(&bytes).await.map_err(|e| io_error(&self.tmp_path, e))?;
        file.sync_all().await.map_err(|e| io_error(&self.tmp_path, e))?;
        drop(file);
        debug!("Snapshot staged at {}", self.tmp_path.display());
        fs::rename(&self.tmp_path, &self.path).await.map_err(|e| io_error(&self.path, e))?;
        info!("Conversations saved to {}.", self.path.display());
        Ok(())
    }

    fn describe(&self) -> String {
        format!("atomic:{}", self.path.display())
    }
}
