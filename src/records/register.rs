use std::sync::Arc;

use serde::Deserialize;

use super::sqlite::{DatabaseConfig, SqliteRecordStore};
use super::{MemoryRecordStore, UploadRecordStore};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type", content = "config")]
pub enum RecordBackendConfig {
    Memory,
    Sqlite(DatabaseConfig),
}

impl Default for RecordBackendConfig {
    fn default() -> Self {
        Self::Memory
    }
}

impl RecordBackendConfig {
    pub async fn connect(&self) -> anyhow::Result<Arc<dyn UploadRecordStore>> {
        match self {
            Self::Memory => {
                warn!("using the in-memory record store, uploads will not survive a restart");
                Ok(Arc::new(MemoryRecordStore::new()))
            },
            Self::Sqlite(cfg) => {
                let store = SqliteRecordStore::connect(cfg).await?;
                store.ensure_tables().await?;
                Ok(Arc::new(store))
            },
        }
    }
}
