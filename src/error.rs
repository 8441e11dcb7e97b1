use std::io;

use thiserror::Error;

/// Failures raised by the filesystem blob store.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("folder escapes the owner directory")]
    InvalidFolder,

    #[error("file name is not a single path component")]
    InvalidFileName,

    #[error("path is outside of the storage root")]
    OutsideRoot,

    #[error("blob does not exist")]
    NotFound,

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

/// The coarse error classes callers are allowed to see.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Forbidden,
    Storage,
    Processing,
}

/// Every failure an upload or image operation can surface.
///
/// The displayed message of each variant is fixed, any lower level cause is
/// only reachable through `source()` so it can be logged without ever being
/// sent back to the caller.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("file is required")]
    FileRequired,

    #[error("file size exceeds the maximum allowed ({limit} bytes)")]
    FileTooLarge { limit: usize },

    #[error("invalid folder")]
    InvalidFolder,

    #[error("invalid file name")]
    InvalidFileName,

    #[error("file upload failed")]
    UploadFailed(#[source] StorageError),

    #[error("storage operation failed")]
    StoreFailure(#[source] anyhow::Error),

    #[error("upload not found")]
    NotFound,

    #[error("you do not have permission to access this resource")]
    Forbidden,

    #[error("file deletion failed")]
    DeleteFailed(#[source] StorageError),

    #[error("file is not an image")]
    NotAnImage,

    #[error("invalid image parameters")]
    InvalidParams,

    #[error("invalid image format")]
    InvalidFormat,

    #[error("image processing failed")]
    ProcessingFailed(#[source] anyhow::Error),
}

impl UploadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::FileRequired
            | Self::FileTooLarge { .. }
            | Self::InvalidFolder
            | Self::InvalidFileName
            | Self::NotAnImage
            | Self::InvalidParams
            | Self::InvalidFormat => ErrorKind::Validation,
            Self::NotFound => ErrorKind::NotFound,
            Self::Forbidden => ErrorKind::Forbidden,
            Self::UploadFailed(_) | Self::StoreFailure(_) | Self::DeleteFailed(_) => {
                ErrorKind::Storage
            },
            Self::ProcessingFailed(_) => ErrorKind::Processing,
        }
    }

    pub(crate) fn processing<E>(err: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        Self::ProcessingFailed(err.into())
    }
}

impl From<StorageError> for UploadError {
    /// Translation used on the write path, validation problems keep their
    /// own variant while everything else collapses into `UploadFailed`.
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidFolder | StorageError::OutsideRoot => Self::InvalidFolder,
            StorageError::InvalidFileName => Self::InvalidFileName,
            other => Self::UploadFailed(other),
        }
    }
}

pub type UploadResult<T> = Result<T, UploadError>;
