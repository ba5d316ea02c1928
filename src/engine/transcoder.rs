//! Contract between the worker pool and the pluggable strategies that do the
//! actual format work.
//!
//! Strategies are synchronous and run on tokio's blocking pool. They report
//! progress through a [`ProgressSink`] and are expected to poll the
//! cancellation token between steps.

use std::fmt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::model::{FileFormat, Operation};

#[derive(Debug, Error)]
pub enum TranscodeError {
    /// Bad input data or an unsupported codec feature. Never retried.
    #[error("Invalid content: {0}")]
    Content(String),

    /// Transient failure outside the input's control. Retried once.
    #[error("Infrastructure failure: {0}")]
    Infrastructure(String),

    #[error("Cancelled")]
    Cancelled,
}

impl TranscodeError {
    pub fn content(err: impl fmt::Display) -> Self {
        TranscodeError::Content(err.to_string())
    }

    pub fn infrastructure(err: impl fmt::Display) -> Self {
        TranscodeError::Infrastructure(err.to_string())
    }
}

/// Receives progress percentages from a running transcoder.
pub struct ProgressSink(Box<dyn Fn(u8) + Send + Sync>);

impl ProgressSink {
    pub fn new(f: impl Fn(u8) + Send + Sync + 'static) -> Self {
        Self(Box::new(f))
    }

    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    /// Values above 100 are clamped.
    pub fn report(&self, percent: u8) {
        (self.0)(percent.min(100));
    }
}

impl fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProgressSink")
    }
}

pub struct TranscodeContext<'a> {
    pub input: &'a [u8],
    pub source_format: FileFormat,
    pub target_format: FileFormat,
    pub operation: Operation,
    pub progress: &'a ProgressSink,
    pub cancel: &'a CancellationToken,
}

impl TranscodeContext<'_> {
    pub fn ensure_active(&self) -> Result<(), TranscodeError> {
        if self.cancel.is_cancelled() {
            return Err(TranscodeError::Cancelled);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeOutput {
    pub bytes: Vec<u8>,
}

pub trait Transcoder: Send + Sync {
    fn name(&self) -> &'static str;

    fn transcode(&self, ctx: TranscodeContext<'_>) -> Result<TranscodeOutput, TranscodeError>;
}
