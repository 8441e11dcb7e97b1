use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use mime::Mime;
use uuid::Uuid;

use crate::error::{StorageError, UploadError, UploadResult};
use crate::processor::{ImageTransformer, RawImageParams, TransformedImage};
use crate::records::{UploadRecord, UploadRecordStore};
use crate::resolver::FileResolver;
use crate::storage::BlobStore;

/// Uploads larger than this are refused before anything touches the disk.
pub const MAX_UPLOAD_SIZE: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct UploadInfo {
    pub record: UploadRecord,

    /// The crc32 checksum of the stored bytes.
    pub checksum: u32,
}

/// A file as handed over by the caller.
#[derive(Debug, Clone, Copy)]
pub struct NewUpload<'a> {
    pub content: &'a [u8],
    pub file_name: &'a str,
    pub folder: &'a str,

    /// The size the client announced, checked before the content is.
    pub declared_size: usize,
}

pub struct UploadCoordinator {
    max_upload_size: usize,
    blobs: BlobStore,
    records: Arc<dyn UploadRecordStore>,
    resolver: FileResolver,
    transformer: ImageTransformer,
}

impl UploadCoordinator {
    pub fn new(
        blobs: BlobStore,
        records: Arc<dyn UploadRecordStore>,
        transformer: ImageTransformer,
    ) -> Self {
        Self {
            max_upload_size: MAX_UPLOAD_SIZE,
            resolver: FileResolver::new(records.clone()),
            blobs,
            records,
            transformer,
        }
    }

    pub fn with_max_upload_size(mut self, limit: usize) -> Self {
        self.max_upload_size = limit;
        self
    }

    #[inline]
    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    /// Stores a new upload for `owner_id`.
    ///
    /// The blob is written first and the record second. Should the record
    /// fail to persist the blob is removed again on a best effort basis.
    pub async fn create_upload(&self, owner_id: Uuid, upload: NewUpload<'_>) -> UploadResult<UploadInfo> {
        if upload.content.is_empty() || upload.file_name.is_empty() {
            return Err(UploadError::FileRequired);
        }

        if upload.declared_size > self.max_upload_size || upload.content.len() > self.max_upload_size {
            warn!(
                "rejecting upload of {} bytes for {}, limit is {}",
                upload.declared_size.max(upload.content.len()),
                owner_id,
                self.max_upload_size,
            );
            return Err(UploadError::FileTooLarge {
                limit: self.max_upload_size,
            });
        }

        let path = self
            .blobs
            .save(upload.content, owner_id, upload.folder, upload.file_name)
            .await
            .map_err(|e| {
                warn!("failed to store blob for {}: {}", owner_id, e);
                UploadError::from(e)
            })?;

        let record = UploadRecord::new(owner_id, path.to_string_lossy().into_owned());
        if let Err(e) = self.records.create(record.clone()).await {
            error!("failed to persist upload record {}: {:?}", record.id, e);
            if let Err(cleanup) = self.blobs.delete(&path).await {
                error!("orphaned blob left @ {:?}: {}", &path, cleanup);
            }
            return Err(UploadError::StoreFailure(e));
        }

        let checksum = crc32fast::hash(upload.content);
        info!("stored upload {} for {} @ {:?}", record.id, owner_id, &path);

        Ok(UploadInfo { record, checksum })
    }

    /// Every live upload of `owner_id`, oldest first.
    pub async fn list_uploads(&self, owner_id: Uuid) -> UploadResult<Vec<UploadRecord>> {
        let records = self
            .records
            .find_by_owner(owner_id)
            .await
            .map_err(UploadError::StoreFailure)?;

        // The store is an external collaborator, the owner filter is enforced here as well.
        Ok(records
            .into_iter()
            .filter(|record| record.owner_id == owner_id)
            .collect())
    }

    pub async fn get_upload(&self, id: Uuid, owner_id: Uuid) -> UploadResult<UploadRecord> {
        let record = self
            .records
            .find_by_id(id)
            .await
            .map_err(UploadError::StoreFailure)?
            .ok_or(UploadError::NotFound)?;

        if record.owner_id != owner_id {
            warn!("{} attempted to access upload {} owned by someone else", owner_id, id);
            return Err(UploadError::Forbidden);
        }

        Ok(record)
    }

    /// Removes the blob and then soft deletes the record.
    ///
    /// If the blob cannot be removed the record is left untouched. If the
    /// record cannot be deleted after the blob is gone, the record points
    /// at a missing file until it is reconciled externally.
    pub async fn delete_upload(&self, id: Uuid, owner_id: Uuid) -> UploadResult<()> {
        let record = self.get_upload(id, owner_id).await?;
        let path = Path::new(&record.file_path);

        if let Err(e) = self.blobs.delete(path).await {
            error!("failed to delete blob for upload {} @ {:?}: {}", id, path, e);
            return Err(UploadError::DeleteFailed(e));
        }

        if let Err(e) = self.records.delete(id).await {
            error!(
                "blob for upload {} was removed but its record was not, needs reconciliation: {:?}",
                id, e,
            );
            return Err(UploadError::StoreFailure(e));
        }

        info!("deleted upload {} for {}", id, owner_id);
        Ok(())
    }

    /// The stored bytes of an upload together with their MIME type.
    pub async fn get_raw(&self, id: Uuid, owner_id: Uuid) -> UploadResult<(Bytes, Mime)> {
        self.get_upload(id, owner_id).await?;
        let file = self.resolver.get_file(id).await?;

        match self.blobs.read(&file.path).await {
            Ok(data) => Ok((data, file.mime)),
            Err(StorageError::NotFound) => Err(UploadError::NotFound),
            Err(other) => Err(UploadError::StoreFailure(other.into())),
        }
    }

    /// Derives an image variant of an upload owned by `owner_id`.
    pub async fn get_image(
        &self,
        id: Uuid,
        owner_id: Uuid,
        params: RawImageParams,
    ) -> UploadResult<TransformedImage> {
        let params = params.validate()?;
        self.get_upload(id, owner_id).await?;

        self.transformer.transform(id, params).await
    }
}
