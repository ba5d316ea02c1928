use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;
use utoipa::ToSchema;

use super::error::EngineError;
use super::model::{FileFormat, OperationKind};
use super::transcoder::Transcoder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ToSchema)]
pub struct TranscoderKey {
    pub source_format: FileFormat,
    pub target_format: FileFormat,
    pub operation: OperationKind,
}

/// Maps `(source, target, operation)` to a strategy.
///
/// Filled once at startup and then shared read-only behind an `Arc`.
#[derive(Default)]
pub struct TranscoderRegistry {
    strategies: HashMap<TranscoderKey, Arc<dyn Transcoder>>,
}

impl TranscoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `strategy`. A later registration for the same key replaces
    /// the earlier one.
    pub fn register(
        &mut self,
        source_format: FileFormat,
        target_format: FileFormat,
        operation: OperationKind,
        strategy: Arc<dyn Transcoder>,
    ) -> &mut Self {
        let key = TranscoderKey {
            source_format,
            target_format,
            operation,
        };
        if let Some(previous) = self.strategies.insert(key, strategy) {
            warn!(
                "Replacing transcoder {} for {} {} -> {}",
                previous.name(),
                operation,
                source_format,
                target_format
            );
        }
        self
    }

    pub fn resolve(
        &self,
        source_format: FileFormat,
        target_format: FileFormat,
        operation: OperationKind,
    ) -> Result<Arc<dyn Transcoder>, EngineError> {
        let key = TranscoderKey {
            source_format,
            target_format,
            operation,
        };
        self.strategies
            .get(&key)
            .cloned()
            .ok_or(EngineError::NotSupported {
                source_format,
                target_format,
                operation,
            })
    }

    pub fn supports(&self, source_format: FileFormat, target_format: FileFormat, operation: OperationKind) -> bool {
        self.strategies.contains_key(&TranscoderKey {
            source_format,
            target_format,
            operation,
        })
    }

    /// Registered keys in a stable order.
    pub fn capabilities(&self) -> Vec<TranscoderKey> {
        let mut keys: Vec<TranscoderKey> = self.strategies.keys().copied().collect();
        keys.sort_by_key(|k| (k.operation as u8, k.source_format as u8, k.target_format as u8));
        keys
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

impl fmt::Debug for TranscoderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranscoderRegistry")
            .field("strategies", &self.strategies.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::transcoder::{TranscodeContext, TranscodeError, TranscodeOutput};

    struct Echo(&'static str);

    impl Transcoder for Echo {
        fn name(&self) -> &'static str {
            self.0
        }

        fn transcode(&self, ctx: TranscodeContext<'_>) -> Result<TranscodeOutput, TranscodeError> {
            Ok(TranscodeOutput {
                bytes: ctx.input.to_vec(),
            })
        }
    }

    #[test]
    fn test_resolve_registered_pair() {
        let mut registry = TranscoderRegistry::new();
        registry.register(FileFormat::Png, FileFormat::Jpg, OperationKind::Convert, Arc::new(Echo("echo")));

        let strategy = registry
            .resolve(FileFormat::Png, FileFormat::Jpg, OperationKind::Convert)
            .unwrap();
        assert_eq!(strategy.name(), "echo");
        assert!(registry.supports(FileFormat::Png, FileFormat::Jpg, OperationKind::Convert));
    }

    #[test]
    fn test_resolve_is_keyed_on_operation_too() {
        let mut registry = TranscoderRegistry::new();
        registry.register(FileFormat::Png, FileFormat::Png, OperationKind::Compress, Arc::new(Echo("echo")));

        let err = registry
            .resolve(FileFormat::Png, FileFormat::Png, OperationKind::Convert)
            .err()
            .unwrap();
        assert!(matches!(
            err,
            EngineError::NotSupported {
                operation: OperationKind::Convert,
                ..
            }
        ));
    }

    #[test]
    fn test_unregistered_pdf_to_docx_is_not_supported() {
        let registry = TranscoderRegistry::new();
        let result = registry.resolve(FileFormat::Pdf, FileFormat::Docx, OperationKind::Convert);
        assert!(matches!(result, Err(EngineError::NotSupported { .. })));
    }

    #[test]
    fn test_later_registration_replaces() {
        let mut registry = TranscoderRegistry::new();
        registry
            .register(FileFormat::Jpg, FileFormat::Png, OperationKind::Convert, Arc::new(Echo("first")))
            .register(FileFormat::Jpg, FileFormat::Png, OperationKind::Convert, Arc::new(Echo("second")));

        assert_eq!(registry.len(), 1);
        let strategy = registry
            .resolve(FileFormat::Jpg, FileFormat::Png, OperationKind::Convert)
            .unwrap();
        assert_eq!(strategy.name(), "second");
    }
}
