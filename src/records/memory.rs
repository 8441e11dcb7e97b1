use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use hashbrown::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{UploadRecord, UploadRecordStore};

#[derive(Default)]
struct Records {
    next_seq: u64,
    by_id: HashMap<Uuid, (u64, UploadRecord)>,
}

/// A process local record store.
///
/// Nothing survives a restart, this is meant for tests and
/// throwaway deployments.
#[derive(Default)]
pub struct MemoryRecordStore {
    inner: RwLock<Records>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UploadRecordStore for MemoryRecordStore {
    async fn create(&self, record: UploadRecord) -> Result<()> {
        let mut lock = self.inner.write().await;
        if lock.by_id.contains_key(&record.id) {
            bail!("upload {} already exists", record.id);
        }

        let seq = lock.next_seq;
        lock.next_seq += 1;
        lock.by_id.insert(record.id, (seq, record));

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UploadRecord>> {
        let lock = self.inner.read().await;
        Ok(lock
            .by_id
            .get(&id)
            .map(|(_, record)| record)
            .filter(|record| record.is_live())
            .cloned())
    }

    async fn find_by_owner(&self, owner_id: Uuid) -> Result<Vec<UploadRecord>> {
        let lock = self.inner.read().await;
        let mut found: Vec<&(u64, UploadRecord)> = lock
            .by_id
            .values()
            .filter(|(_, record)| record.owner_id == owner_id && record.is_live())
            .collect();

        found.sort_by_key(|(seq, _)| *seq);

        Ok(found.into_iter().map(|(_, record)| record.clone()).collect())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let mut lock = self.inner.write().await;
        match lock.by_id.get_mut(&id) {
            Some((_, record)) if record.is_live() => {
                let now = Utc::now();
                record.deleted_at = Some(now);
                record.updated_at = now;
                Ok(())
            },
            _ => bail!("upload {} not found", id),
        }
    }
}
