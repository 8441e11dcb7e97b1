use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use bytes::Bytes;
use image::ImageFormat;
use mime::Mime;
use tokio::sync::{oneshot, Semaphore};
use uuid::Uuid;

use super::params::{extension_for_mime, ImageParams, OutputFormat};
use super::{encoder, resizer, ResizeFilter};
use crate::error::{StorageError, UploadError, UploadResult};
use crate::resolver::FileResolver;
use crate::storage::BlobStore;

#[derive(Debug, Copy, Clone)]
pub struct TransformSettings {
    pub filter: ResizeFilter,

    /// AVIF encoder speed, 1 (slowest) to 10 (fastest).
    pub avif_speed: u8,
}

impl Default for TransformSettings {
    fn default() -> Self {
        Self {
            filter: ResizeFilter::default(),
            avif_speed: 8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransformedImage {
    pub data: Bytes,
    pub mime: String,
}

impl TransformedImage {
    /// The download name offered for the variant, `image_<id>.<ext>`.
    pub fn suggested_filename(&self, id: Uuid) -> String {
        format!("image_{}.{}", id, extension_for_mime(&self.mime))
    }
}

/// Derives resized and re-encoded variants of stored images.
///
/// Nothing produced here is persisted. Decoding and encoding run on the
/// rayon pool so they never stall the async workers.
pub struct ImageTransformer {
    resolver: FileResolver,
    blobs: BlobStore,
    settings: TransformSettings,
    limiter: Option<Arc<Semaphore>>,
}

impl ImageTransformer {
    pub fn new(
        resolver: FileResolver,
        blobs: BlobStore,
        settings: TransformSettings,
        limiter: Option<Arc<Semaphore>>,
    ) -> Self {
        Self {
            resolver,
            blobs,
            settings,
            limiter,
        }
    }

    pub async fn transform(&self, id: Uuid, params: ImageParams) -> UploadResult<TransformedImage> {
        let file = self.resolver.get_file(id).await?;
        if file.mime.type_() != mime::IMAGE {
            return Err(UploadError::NotAnImage);
        }

        let data = match self.blobs.read(&file.path).await {
            Ok(data) => data,
            // The record was resolved but a concurrent delete removed the blob.
            Err(StorageError::NotFound) => return Err(UploadError::NotFound),
            Err(other) => return Err(UploadError::processing(other)),
        };

        let _permit = match self.limiter.as_ref() {
            Some(limiter) => Some(
                limiter
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(UploadError::processing)?,
            ),
            None => None,
        };

        let settings = self.settings;
        let source = file.mime;
        let instant = Instant::now();
        let (tx, rx) = oneshot::channel();
        rayon::spawn(move || {
            let _ = tx.send(render(data, &source, params, settings));
        });

        let result = rx.await.map_err(UploadError::processing)?;
        debug!("Transformed image {} in {:?}", id, instant.elapsed());

        result
    }
}

fn render(
    data: Bytes,
    source: &Mime,
    params: ImageParams,
    settings: TransformSettings,
) -> UploadResult<TransformedImage> {
    let img = image::load_from_memory(&data).map_err(UploadError::processing)?;
    let img = resizer::fit_width(img, params.width(), settings.filter);

    let source_mime = source.essence_str();
    let (data, mime) = match params.format().or_else(|| OutputFormat::from_mime_type(source_mime)) {
        Some(format) => {
            let data = encoder::encode_to(&img, format, params.quality(), settings.avif_speed)
                .map_err(UploadError::processing)?;
            (data, format.mime_type().to_string())
        },
        None => {
            let format = ImageFormat::from_mime_type(source_mime).ok_or_else(|| {
                UploadError::processing(anyhow!("no codec registered for {}", source_mime))
            })?;
            let data = encoder::encode_as(&img, format).map_err(UploadError::processing)?;
            (data, source_mime.to_string())
        },
    };

    if data.is_empty() {
        return Err(UploadError::processing(anyhow!("encoder produced no output")));
    }

    Ok(TransformedImage { data, mime })
}
