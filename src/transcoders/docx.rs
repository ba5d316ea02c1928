use std::io::{self, Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::image::{jpeg_quality, shrink_picture};
use crate::engine::{CompressionLevel, TranscodeContext, TranscodeError, TranscodeOutput, Transcoder};

pub(crate) const DOCUMENT_PART: &str = "word/document.xml";
const MEDIA_DIR: &str = "word/media/";

fn deflate_level(level: CompressionLevel) -> i64 {
    match level {
        CompressionLevel::High => 9,
        CompressionLevel::Medium => 6,
        CompressionLevel::Low => 3,
    }
}

fn is_picture(name: &str) -> bool {
    let Some(file) = name.strip_prefix(MEDIA_DIR) else {
        return false;
    };
    let ext = file.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    matches!(ext.as_deref(), Some("jpg" | "jpeg" | "png"))
}

/// Opens a Word package, rejecting zips without a main document part.
pub(crate) fn open_package(input: &[u8]) -> Result<ZipArchive<Cursor<&[u8]>>, TranscodeError> {
    let archive = ZipArchive::new(Cursor::new(input))
        .map_err(|e| TranscodeError::Content(format!("Not a valid docx package: {}", e)))?;
    if !archive.file_names().any(|name| name == DOCUMENT_PART) {
        return Err(TranscodeError::Content(format!(
            "Not a Word document: {} is missing",
            DOCUMENT_PART
        )));
    }
    Ok(archive)
}

/// Shrinks a Word package. Embedded jpg and png pictures are re-encoded as
/// JPEG at the quality of the requested level, every part is rewritten with
/// deflate, and text is left alone.
pub struct DocxCompressor;

impl Transcoder for DocxCompressor {
    fn name(&self) -> &'static str {
        "docx-compressor"
    }

    fn transcode(&self, ctx: TranscodeContext<'_>) -> Result<TranscodeOutput, TranscodeError> {
        let level = ctx.operation.compression_level().unwrap_or(CompressionLevel::Medium);
        ctx.ensure_active()?;
        ctx.progress.report(20);

        let mut archive = open_package(ctx.input)?;
        let quality = jpeg_quality(level);
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(deflate_level(level)));
        let mut writer = ZipWriter::new(Cursor::new(Vec::with_capacity(ctx.input.len())));

        let total = archive.len();
        for index in 0..total {
            ctx.ensure_active()?;

            let mut entry = archive
                .by_index(index)
                .map_err(|e| TranscodeError::Content(format!("Corrupt entry #{}: {}", index, e)))?;
            let name = entry.name().to_string();

            if entry.is_dir() {
                writer
                    .add_directory(name, options)
                    .map_err(TranscodeError::infrastructure)?;
                continue;
            }

            writer
                .start_file(name.clone(), options)
                .map_err(TranscodeError::infrastructure)?;
            if is_picture(&name) {
                let mut picture = Vec::with_capacity(entry.size() as usize);
                entry
                    .read_to_end(&mut picture)
                    .map_err(|e| TranscodeError::Content(format!("Failed to read {}: {}", name, e)))?;
                let picture = shrink_picture(&picture, quality)?.unwrap_or(picture);
                writer.write_all(&picture).map_err(TranscodeError::infrastructure)?;
            } else {
                io::copy(&mut entry, &mut writer)
                    .map_err(|e| TranscodeError::Content(format!("Failed to read {}: {}", name, e)))?;
            }

            ctx.progress.report((20 + 60 * (index + 1) / total) as u8);
        }

        let bytes = writer
            .finish()
            .map_err(TranscodeError::infrastructure)?
            .into_inner();

        let bytes = if bytes.len() < ctx.input.len() {
            bytes
        } else {
            ctx.input.to_vec()
        };
        ctx.progress.report(100);

        Ok(TranscodeOutput { bytes })
    }
}
