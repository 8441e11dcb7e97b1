use std::borrow::Cow;
use std::io::Cursor;

use anyhow::Result;
use bytes::Bytes;
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::{ColorType, DynamicImage, ImageFormat};

use super::params::OutputFormat;

/// Encodes `img` as `format`.
///
/// `quality` is honoured by the lossy encoders (JPEG, WebP, AVIF), for PNG it
/// only picks how hard the compressor works. WebP at 100 is lossless.
pub fn encode_to(img: &DynamicImage, format: OutputFormat, quality: u8, avif_speed: u8) -> Result<Bytes> {
    let mut buff = Vec::new();

    match format {
        OutputFormat::WebP => {
            let encoder = webp::Encoder::from_image(img);
            let encoded = if quality >= 100 {
                encoder.encode_lossless()?
            } else {
                encoder.encode(quality as f32)?
            };
            return Ok(Bytes::from(encoded.to_vec()));
        },
        OutputFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buff, quality);
            without_alpha(img).write_with_encoder(encoder)?;
        },
        OutputFormat::Png => {
            let encoder = PngEncoder::new_with_quality(
                &mut buff,
                png_compression(quality),
                PngFilter::Adaptive,
            );
            img.write_with_encoder(encoder)?;
        },
        OutputFormat::Avif => {
            let encoder = AvifEncoder::new_with_speed_quality(&mut buff, avif_speed, quality);
            img.write_with_encoder(encoder)?;
        },
    }

    Ok(Bytes::from(buff))
}

/// Re-encodes into a format outside of the output set using the codec's
/// own defaults.
pub fn encode_as(img: &DynamicImage, format: ImageFormat) -> Result<Bytes> {
    let mut buff = Cursor::new(Vec::new());
    img.write_to(&mut buff, format)?;
    Ok(Bytes::from(buff.into_inner()))
}

fn png_compression(quality: u8) -> CompressionType {
    match quality {
        0..=33 => CompressionType::Fast,
        34..=66 => CompressionType::Default,
        _ => CompressionType::Best,
    }
}

/// JPEG has no alpha channel, anything but plain grey or RGB is flattened.
fn without_alpha(img: &DynamicImage) -> Cow<'_, DynamicImage> {
    match img.color() {
        ColorType::L8 | ColorType::Rgb8 => Cow::Borrowed(img),
        _ => Cow::Owned(DynamicImage::ImageRgb8(img.to_rgb8())),
    }
}

#[cfg(test)]
mod tests {
    use image::{GenericImageView, Rgba, RgbaImage};

    use super::*;

    fn transparent() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(12, 6, Rgba([0, 128, 255, 100])))
    }

    #[test]
    fn jpeg_flattens_alpha() -> Result<()> {
        let out = encode_to(&transparent(), OutputFormat::Jpeg, 80, 8)?;
        let decoded = image::load_from_memory_with_format(&out, ImageFormat::Jpeg)?;
        assert_eq!(decoded.dimensions(), (12, 6));
        Ok(())
    }

    #[test]
    fn png_and_webp_keep_dimensions() -> Result<()> {
        for format in [OutputFormat::Png, OutputFormat::WebP] {
            let out = encode_to(&transparent(), format, 50, 8)?;
            assert_eq!(image::load_from_memory(&out)?.dimensions(), (12, 6));
        }
        Ok(())
    }

    #[test]
    fn webp_at_full_quality_is_lossless() -> Result<()> {
        let source = transparent();
        let out = encode_to(&source, OutputFormat::WebP, 100, 8)?;
        let decoded = image::load_from_memory_with_format(&out, ImageFormat::WebP)?;
        assert_eq!(decoded.to_rgba8().into_raw(), source.to_rgba8().into_raw());
        Ok(())
    }

    #[test]
    fn encoding_is_deterministic() -> Result<()> {
        let a = encode_to(&transparent(), OutputFormat::Jpeg, 70, 8)?;
        let b = encode_to(&transparent(), OutputFormat::Jpeg, 70, 8)?;
        assert_eq!(a, b);
        Ok(())
    }

    #[test]
    fn passthrough_formats() -> Result<()> {
        let out = encode_as(&transparent(), ImageFormat::Gif)?;
        assert_eq!(image::guess_format(&out)?, ImageFormat::Gif);
        Ok(())
    }
}
