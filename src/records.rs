use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub mod memory;
pub mod register;
pub mod sqlite;

pub use memory::MemoryRecordStore;
pub use register::RecordBackendConfig;

/// The metadata kept for one stored blob.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub file_path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Set once the upload has been soft deleted.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl UploadRecord {
    pub fn new(owner_id: Uuid, file_path: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            file_path,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[inline]
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Persistent metadata for uploads keyed by id and owner.
///
/// Implementations are expected to make each call atomic on its own,
/// no cross-call transactions are required.
#[async_trait]
pub trait UploadRecordStore: Sync + Send + 'static {
    async fn create(&self, record: UploadRecord) -> Result<()>;

    /// Fetches a live record, soft deleted ones are treated as missing.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<UploadRecord>>;

    /// All live records of `owner_id` in creation order.
    async fn find_by_owner(&self, owner_id: Uuid) -> Result<Vec<UploadRecord>>;

    /// Soft deletes a live record, erroring if there is none.
    async fn delete(&self, id: Uuid) -> Result<()>;
}
