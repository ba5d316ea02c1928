use lopdf::Document;

use crate::engine::{CompressionLevel, TranscodeContext, TranscodeError, TranscodeOutput, Transcoder};

pub(crate) fn load_pdf(input: &[u8]) -> Result<Document, TranscodeError> {
    let doc = Document::load_mem(input).map_err(|e| TranscodeError::Content(format!("Failed to parse PDF: {}", e)))?;
    if doc.is_encrypted() {
        return Err(TranscodeError::Content("Encrypted PDFs are not supported".to_string()));
    }
    Ok(doc)
}

/// Shrinks a PDF by dropping unreferenced objects and deflating every
/// uncompressed stream. `low` only deflates; `medium` and `high` also prune.
pub struct PdfCompressor;

impl Transcoder for PdfCompressor {
    fn name(&self) -> &'static str {
        "pdf-compressor"
    }

    fn transcode(&self, ctx: TranscodeContext<'_>) -> Result<TranscodeOutput, TranscodeError> {
        let level = ctx.operation.compression_level().unwrap_or(CompressionLevel::Medium);
        ctx.ensure_active()?;
        ctx.progress.report(10);

        let mut doc = load_pdf(ctx.input)?;
        ctx.ensure_active()?;
        ctx.progress.report(30);

        if level != CompressionLevel::Low {
            doc.prune_objects();
            doc.delete_zero_length_streams();
            doc.renumber_objects();
        }
        ctx.ensure_active()?;
        ctx.progress.report(60);

        doc.compress();
        ctx.ensure_active()?;
        ctx.progress.report(80);

        let mut bytes = Vec::with_capacity(ctx.input.len());
        doc.save_to(&mut bytes).map_err(TranscodeError::infrastructure)?;

        let bytes = if bytes.len() < ctx.input.len() {
            bytes
        } else {
            ctx.input.to_vec()
        };
        ctx.progress.report(100);

        Ok(TranscodeOutput { bytes })
    }
}
