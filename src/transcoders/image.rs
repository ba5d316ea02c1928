use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, ImageError, ImageFormat};
use std::io::Cursor;

use crate::engine::{
    CompressionLevel, FileFormat, TranscodeContext, TranscodeError, TranscodeOutput, Transcoder,
};

fn image_format(format: FileFormat) -> Result<ImageFormat, TranscodeError> {
    match format {
        FileFormat::Jpg => Ok(ImageFormat::Jpeg),
        FileFormat::Png => Ok(ImageFormat::Png),
        other => Err(TranscodeError::Content(format!("{} is not an image format", other))),
    }
}

fn decode(input: &[u8], format: FileFormat) -> Result<DynamicImage, TranscodeError> {
    image::load_from_memory_with_format(input, image_format(format)?)
        .map_err(|e| TranscodeError::Content(format!("Failed to decode {}: {}", format, e)))
}

fn encode_error(err: ImageError) -> TranscodeError {
    match err {
        ImageError::IoError(e) => TranscodeError::infrastructure(e),
        other => TranscodeError::Content(format!("Failed to encode image: {}", other)),
    }
}

pub(crate) fn jpeg_quality(level: CompressionLevel) -> u8 {
    (level.quality() * 100.0).round() as u8
}

/// JPEG has no alpha channel, so the image is flattened to RGB first.
fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, TranscodeError> {
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    DynamicImage::ImageRgb8(img.to_rgb8())
        .write_with_encoder(encoder)
        .map_err(encode_error)?;
    Ok(buf)
}

/// Re-encodes an embedded jpg or png picture as JPEG at `quality`.
///
/// `None` means the original should stay: it did not decode, it has
/// transparent pixels, or the JPEG is not smaller.
pub(crate) fn shrink_picture(data: &[u8], quality: u8) -> Result<Option<Vec<u8>>, TranscodeError> {
    let Ok(img) = image::load_from_memory(data) else {
        return Ok(None);
    };
    if img.color().has_alpha() && img.to_rgba8().pixels().any(|p| p[3] < u8::MAX) {
        return Ok(None);
    }

    let bytes = encode_jpeg(&img, quality)?;
    Ok((bytes.len() < data.len()).then_some(bytes))
}

fn encode_png(img: &DynamicImage, compression: CompressionType) -> Result<Vec<u8>, TranscodeError> {
    let mut buf = Vec::new();
    let encoder = PngEncoder::new_with_quality(&mut buf, compression, FilterType::Adaptive);
    img.write_with_encoder(encoder).map_err(encode_error)?;
    Ok(buf)
}

/// jpg <-> png.
pub struct ImageConverter;

impl Transcoder for ImageConverter {
    fn name(&self) -> &'static str {
        "image-converter"
    }

    fn transcode(&self, ctx: TranscodeContext<'_>) -> Result<TranscodeOutput, TranscodeError> {
        ctx.ensure_active()?;
        ctx.progress.report(20);

        let img = decode(ctx.input, ctx.source_format)?;
        ctx.ensure_active()?;
        ctx.progress.report(50);

        let bytes = match ctx.target_format {
            FileFormat::Jpg => encode_jpeg(&img, 90)?,
            FileFormat::Png => {
                let mut buf = Cursor::new(Vec::new());
                img.write_to(&mut buf, ImageFormat::Png).map_err(encode_error)?;
                buf.into_inner()
            }
            other => {
                return Err(TranscodeError::Content(format!("Cannot convert an image to {}", other)));
            }
        };
        ctx.progress.report(100);

        Ok(TranscodeOutput { bytes })
    }
}

/// Re-encodes jpg or png in the same format with fewer bytes.
///
/// JPEG quality follows the compression level; PNG is lossless, so every
/// level uses the strongest deflate setting. If re-encoding would grow the
/// file, the original bytes are returned unchanged.
pub struct ImageCompressor;

impl Transcoder for ImageCompressor {
    fn name(&self) -> &'static str {
        "image-compressor"
    }

    fn transcode(&self, ctx: TranscodeContext<'_>) -> Result<TranscodeOutput, TranscodeError> {
        let level = ctx.operation.compression_level().unwrap_or(CompressionLevel::Medium);
        ctx.ensure_active()?;
        ctx.progress.report(20);

        let img = decode(ctx.input, ctx.source_format)?;
        ctx.ensure_active()?;
        ctx.progress.report(40);

        let bytes = match ctx.source_format {
            FileFormat::Jpg => encode_jpeg(&img, jpeg_quality(level))?,
            FileFormat::Png => encode_png(&img, CompressionType::Best)?,
            other => return Err(TranscodeError::Content(format!("Cannot compress {} as an image", other))),
        };
        ctx.ensure_active()?;
        ctx.progress.report(60);

        let bytes = if bytes.len() < ctx.input.len() {
            bytes
        } else {
            ctx.input.to_vec()
        };
        ctx.progress.report(100);

        Ok(TranscodeOutput { bytes })
    }
}
