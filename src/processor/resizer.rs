use image::imageops::FilterType;
use image::DynamicImage;
use serde::Deserialize;

#[derive(Debug, Copy, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeFilter {
    Nearest,
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl Default for ResizeFilter {
    fn default() -> Self {
        Self::Lanczos3
    }
}

impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Gaussian => FilterType::Gaussian,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Scales `img` down to `width` keeping its aspect ratio.
///
/// A width of `0`, or one at least as wide as the source, returns the
/// image untouched; images are never enlarged or cropped.
pub fn fit_width(img: DynamicImage, width: u32, filter: ResizeFilter) -> DynamicImage {
    let (src_width, src_height) = (img.width(), img.height());
    if width == 0 || width >= src_width {
        return img;
    }

    let height = (src_height as u64 * width as u64 + src_width as u64 / 2) / src_width as u64;
    let height = height.max(1) as u32;

    img.resize(width, height, filter.into())
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};

    use super::*;

    fn image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([10, 20, 30])))
    }

    #[test]
    fn keeps_aspect_ratio() {
        let out = fit_width(image(200, 100), 100, ResizeFilter::default());
        assert_eq!((out.width(), out.height()), (100, 50));
    }

    #[test]
    fn never_upscales() {
        let out = fit_width(image(200, 100), 5000, ResizeFilter::Nearest);
        assert_eq!((out.width(), out.height()), (200, 100));

        let out = fit_width(image(200, 100), 0, ResizeFilter::Nearest);
        assert_eq!((out.width(), out.height()), (200, 100));
    }

    #[test]
    fn thin_images_keep_a_row() {
        let out = fit_width(image(1000, 1), 10, ResizeFilter::Triangle);
        assert_eq!((out.width(), out.height()), (10, 1));
    }
}
