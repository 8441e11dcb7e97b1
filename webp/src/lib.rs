use std::borrow::Cow;
use std::fmt::{Debug, Display, Formatter};
use std::ops::Deref;

use image::DynamicImage;
use libwebp_sys::*;

#[derive(Copy, Clone)]
pub enum PixelLayout {
    RGB,
    RGBA,
}

impl PixelLayout {
    #[inline]
    fn channels(self) -> u32 {
        match self {
            Self::RGB => 3,
            Self::RGBA => 4,
        }
    }
}

/// Returned when libwebp refuses to encode the given buffer.
#[derive(Debug)]
pub struct EncodingError;

impl Display for EncodingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "libwebp produced no output for the given image")
    }
}

impl std::error::Error for EncodingError {}

pub struct Encoder<'a> {
    layout: PixelLayout,
    image: Cow<'a, [u8]>,
    width: u32,
    height: u32,
}

impl<'a> Encoder<'a> {
    /// Creates a new encoder from the given image.
    ///
    /// 8 bit RGB and RGBA images are borrowed as-is, every other
    /// pixel type is converted first, keeping the alpha channel
    /// when the source has one.
    pub fn from_image(image: &'a DynamicImage) -> Self {
        match image {
            DynamicImage::ImageRgb8(buf) => Self::from_rgb(buf.as_raw(), buf.width(), buf.height()),
            DynamicImage::ImageRgba8(buf) => {
                Self::from_rgba(buf.as_raw(), buf.width(), buf.height())
            },
            other if other.color().has_alpha() => {
                let buf = other.to_rgba8();
                let (width, height) = buf.dimensions();
                Self {
                    image: Cow::Owned(buf.into_raw()),
                    width,
                    height,
                    layout: PixelLayout::RGBA,
                }
            },
            other => {
                let buf = other.to_rgb8();
                let (width, height) = buf.dimensions();
                Self {
                    image: Cow::Owned(buf.into_raw()),
                    width,
                    height,
                    layout: PixelLayout::RGB,
                }
            },
        }
    }

    /// Creates a new encoder from the given image data in the RGB pixel layout.
    pub fn from_rgb(image: &'a [u8], width: u32, height: u32) -> Self {
        Self { image: Cow::Borrowed(image), width, height, layout: PixelLayout::RGB }
    }

    /// Creates a new encoder from the given image data in the RGBA pixel layout.
    pub fn from_rgba(image: &'a [u8], width: u32, height: u32) -> Self {
        Self { image: Cow::Borrowed(image), width, height, layout: PixelLayout::RGBA }
    }

    /// Encode the image with the given quality.
    /// The image quality must be between 0.0 and 100.0 inclusive for minimal
    /// and maximal quality respectively.
    pub fn encode(&self, quality: f32) -> Result<WebPMemory, EncodingError> {
        let quality = quality.clamp(0.0, 100.0);
        unsafe { encode(&self.image, self.layout, self.width, self.height, Some(quality)) }
    }

    /// Encode the image losslessly.
    pub fn encode_lossless(&self) -> Result<WebPMemory, EncodingError> {
        unsafe { encode(&self.image, self.layout, self.width, self.height, None) }
    }
}

unsafe fn encode(
    image: &[u8],
    layout: PixelLayout,
    width: u32,
    height: u32,
    quality: Option<f32>,
) -> Result<WebPMemory, EncodingError> {
    let stride = (width * layout.channels()) as _;
    let width = width as _;
    let height = height as _;
    let mut buffer = std::ptr::null_mut::<u8>();

    let len = match (layout, quality) {
        (PixelLayout::RGB, None) => {
            WebPEncodeLosslessRGB(image.as_ptr(), width, height, stride, &mut buffer as *mut _)
        },
        (PixelLayout::RGB, Some(quality)) => {
            WebPEncodeRGB(image.as_ptr(), width, height, stride, quality, &mut buffer as *mut _)
        },
        (PixelLayout::RGBA, None) => {
            WebPEncodeLosslessRGBA(image.as_ptr(), width, height, stride, &mut buffer as *mut _)
        },
        (PixelLayout::RGBA, Some(quality)) => {
            WebPEncodeRGBA(image.as_ptr(), width, height, stride, quality, &mut buffer as *mut _)
        },
    };

    if len == 0 || buffer.is_null() {
        if !buffer.is_null() {
            WebPFree(buffer as _);
        }
        return Err(EncodingError);
    }

    Ok(WebPMemory(buffer, len))
}

/// This struct represents a safe wrapper around memory owned by libwebp.
/// Its data contents can be accessed through the Deref trait.
pub struct WebPMemory(pub(crate) *mut u8, pub(crate) usize);

// The buffer is uniquely owned and only freed on drop.
unsafe impl Send for WebPMemory {}

impl Debug for WebPMemory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebPMemory").field("len", &self.1).finish()
    }
}

impl Drop for WebPMemory {
    fn drop(&mut self) {
        unsafe { WebPFree(self.0 as _) }
    }
}

impl Deref for WebPMemory {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        unsafe { std::slice::from_raw_parts(self.0, self.1) }
    }
}
