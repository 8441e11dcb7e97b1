use std::str::FromStr;

use strum::EnumString;

use crate::error::{UploadError, UploadResult};

pub const DEFAULT_QUALITY: u8 = 80;
pub const MAX_QUALITY: i64 = 100;

/// The formats a variant can be re-encoded into.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum OutputFormat {
    #[strum(serialize = "jpeg", serialize = "jpg")]
    Jpeg,
    Png,
    WebP,
    Avif,
}

impl OutputFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::WebP => "image/webp",
            Self::Avif => "image/avif",
        }
    }

    pub fn from_mime_type(mime: &str) -> Option<Self> {
        match mime {
            "image/jpeg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/webp" => Some(Self::WebP),
            "image/avif" => Some(Self::Avif),
            _ => None,
        }
    }
}

/// Maps an output MIME type to the extension used in download names.
pub fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/webp" => "webp",
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/avif" => "avif",
        _ => "jpg",
    }
}

/// Image options exactly as the caller sent them.
#[derive(Debug, Default, Clone)]
pub struct RawImageParams {
    pub width: Option<i64>,
    pub quality: Option<i64>,
    pub format: Option<String>,
}

impl RawImageParams {
    pub fn width(mut self, width: i64) -> Self {
        self.width = Some(width);
        self
    }

    pub fn quality(mut self, quality: i64) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Checks every option and fills in the defaults.
    ///
    /// A quality of `0` or no quality at all means the default of 80,
    /// a width of `0` means no resize and a format of `original` keeps
    /// the source encoding.
    pub fn validate(self) -> UploadResult<ImageParams> {
        let quality = match self.quality.unwrap_or(0) {
            0 => DEFAULT_QUALITY,
            q if (1..=MAX_QUALITY).contains(&q) => q as u8,
            _ => return Err(UploadError::InvalidParams),
        };

        let width = match self.width.unwrap_or(0) {
            w if w < 0 => return Err(UploadError::InvalidParams),
            w => u32::try_from(w).map_err(|_| UploadError::InvalidParams)?,
        };

        let format = match self.format.as_deref() {
            None | Some("") | Some("original") => None,
            Some(other) => {
                Some(OutputFormat::from_str(other).map_err(|_| UploadError::InvalidFormat)?)
            },
        };

        Ok(ImageParams {
            width,
            quality,
            format,
        })
    }
}

/// Validated, immutable image options.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ImageParams {
    width: u32,
    quality: u8,
    format: Option<OutputFormat>,
}

impl ImageParams {
    /// Target width in pixels, `0` keeps the source size.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// `None` when the source format should be kept.
    #[inline]
    pub fn format(&self) -> Option<OutputFormat> {
        self.format
    }
}

impl Default for ImageParams {
    fn default() -> Self {
        Self {
            width: 0,
            quality: DEFAULT_QUALITY,
            format: None,
        }
    }
}
