use std::path::{Path, PathBuf};
use std::sync::Arc;

use mime::Mime;
use uuid::Uuid;

use crate::error::{UploadError, UploadResult};
use crate::records::UploadRecordStore;

/// Where an upload lives and what it claims to be.
#[derive(Debug, Clone)]
pub struct ResolvedFile {
    pub path: PathBuf,
    pub mime: Mime,
}

/// Maps upload ids to their blob path and MIME type.
///
/// This is a pure read path: it never checks ownership and never
/// touches the filesystem.
#[derive(Clone)]
pub struct FileResolver {
    records: Arc<dyn UploadRecordStore>,
}

impl FileResolver {
    pub fn new(records: Arc<dyn UploadRecordStore>) -> Self {
        Self { records }
    }

    pub async fn get_file(&self, id: Uuid) -> UploadResult<ResolvedFile> {
        let record = self
            .records
            .find_by_id(id)
            .await
            .map_err(UploadError::StoreFailure)?
            .ok_or(UploadError::NotFound)?;

        let path = PathBuf::from(record.file_path);
        let mime = mime_for_path(&path);

        Ok(ResolvedFile { path, mime })
    }
}

/// Looks the MIME type up from the file extension alone.
pub fn mime_for_path(path: &Path) -> Mime {
    mime_guess::from_path(path).first_or_octet_stream()
}
