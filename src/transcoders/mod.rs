//! Built-in format strategies.

pub mod docx;
pub mod document;
pub mod image;
pub mod pdf;

use std::sync::Arc;

use crate::engine::{FileFormat, OperationKind, TranscoderRegistry};

/// Registry with every strategy this service ships with.
pub fn builtin_registry() -> TranscoderRegistry {
    let mut registry = TranscoderRegistry::new();
    register_builtin(&mut registry);
    registry
}

pub fn register_builtin(registry: &mut TranscoderRegistry) {
    let converter = Arc::new(image::ImageConverter);
    let image_compressor = Arc::new(image::ImageCompressor);

    registry
        .register(FileFormat::Jpg, FileFormat::Png, OperationKind::Convert, converter.clone())
        .register(FileFormat::Png, FileFormat::Jpg, OperationKind::Convert, converter)
        .register(FileFormat::Jpg, FileFormat::Jpg, OperationKind::Compress, image_compressor.clone())
        .register(FileFormat::Png, FileFormat::Png, OperationKind::Compress, image_compressor)
        .register(FileFormat::Docx, FileFormat::Docx, OperationKind::Compress, Arc::new(docx::DocxCompressor))
        .register(FileFormat::Pdf, FileFormat::Pdf, OperationKind::Compress, Arc::new(pdf::PdfCompressor))
        .register(FileFormat::Docx, FileFormat::Pdf, OperationKind::Convert, Arc::new(document::DocxToPdfConverter))
        .register(FileFormat::Pdf, FileFormat::Docx, OperationKind::Convert, Arc::new(document::PdfToDocxConverter));
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};
    use tokio_util::sync::CancellationToken;

    use crate::engine::{FileFormat, Operation, ProgressSink, TranscodeContext, TranscodeError, TranscodeOutput, Transcoder};

    pub struct Run {
        pub result: Result<TranscodeOutput, TranscodeError>,
        pub progress: Vec<u8>,
    }

    pub fn run(
        transcoder: &dyn Transcoder,
        input: &[u8],
        source_format: FileFormat,
        target_format: FileFormat,
        operation: Operation,
        cancel: &CancellationToken,
    ) -> Run {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = seen.clone();
            ProgressSink::new(move |p| seen.lock().unwrap().push(p))
        };
        let result = transcoder.transcode(TranscodeContext {
            input,
            source_format,
            target_format,
            operation,
            progress: &sink,
            cancel,
        });
        let progress = seen.lock().unwrap().clone();
        Run { result, progress }
    }
}
