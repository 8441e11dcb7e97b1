use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::paths;
use crate::error::StorageError;

/// Owner-partitioned blob storage on the local filesystem.
///
/// Every blob lives at `<root>/<owner_id>/<folder>/<file_name>` and every
/// path handed to this store is checked to be lexically inside `root`.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Relative roots are anchored to the working directory so that
    /// every stored path compares against the same absolute prefix.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let root = if root.is_absolute() {
            root.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(root))
                .unwrap_or_else(|_| root.to_path_buf())
        };

        Self {
            root: paths::clean(&root),
        }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes `content` as a new blob and returns where it ended up.
    ///
    /// If `file_name` is already taken in the target directory a unique
    /// suffix is inserted before its extension. The bytes go to a temporary
    /// file next to the destination first and are renamed into place once
    /// fully synced, so readers never see a partial file.
    pub async fn save(
        &self,
        content: &[u8],
        owner_id: Uuid,
        folder: &str,
        file_name: &str,
    ) -> Result<PathBuf, StorageError> {
        let folder = paths::normalize_folder(Path::new(folder))
            .ok_or(StorageError::InvalidFolder)?;
        let name = paths::file_name(file_name)?;

        let directory = self.root.join(owner_id.to_string()).join(folder);
        fs::create_dir_all(&directory).await?;

        let mut target = directory.join(&name);
        if fs::metadata(&target).await.is_ok() {
            target = directory.join(paths::with_unique_suffix(&name, Uuid::new_v4()));
        }

        let staging = directory.join(format!(".{}.tmp", Uuid::new_v4().to_simple()));

        debug!("Storing blob @ {:?}", &target);
        if let Err(e) = write_synced(&staging, content).await {
            let _ = fs::remove_file(&staging).await;
            return Err(e.into());
        }

        if let Err(e) = fs::rename(&staging, &target).await {
            let _ = fs::remove_file(&staging).await;
            return Err(e.into());
        }

        Ok(target)
    }

    pub async fn read(&self, path: &Path) -> Result<Bytes, StorageError> {
        let path = self.contain(path)?;

        debug!("Reading blob @ {:?}", &path);
        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(ref e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound),
            Err(other) => Err(other.into()),
        }
    }

    pub async fn delete(&self, path: &Path) -> Result<(), StorageError> {
        let path = self.contain(path)?;

        debug!("Purging blob @ {:?}", &path);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(ref e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound),
            Err(other) => Err(other.into()),
        }
    }

    pub async fn exists(&self, path: &Path) -> bool {
        let path = match self.contain(path) {
            Ok(path) => path,
            Err(_) => return false,
        };

        fs::metadata(&path)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false)
    }

    /// Rejects any path that does not lexically sit below the root.
    fn contain(&self, path: &Path) -> Result<PathBuf, StorageError> {
        let cleaned = paths::clean(path);
        if cleaned != self.root && cleaned.starts_with(&self.root) {
            Ok(cleaned)
        } else {
            Err(StorageError::OutsideRoot)
        }
    }
}

async fn write_synced(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(content).await?;
    file.sync_all().await?;
    Ok(())
}
