//! Shared test harness for integration tests.
//!
//! [`TestHarness`] starts a real [`Engine`] over local storage in a temporary
//! directory. Strategies are [`ScriptedTranscoder`]s whose progress steps,
//! outcome and blocking behaviour are chosen per test.

#![allow(dead_code)]

use bytes::Bytes;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tempfile::TempDir;

use fileforge::app::create_app;
use fileforge::config::settings::AppConfig;
use fileforge::engine::{
    Engine, EngineConfig, FileFormat, Job, JobId, JobSpec, JobState, Operation, OperationKind,
    RetryPolicy, TranscodeContext, TranscodeError, TranscodeOutput, Transcoder, TranscoderRegistry,
};
use fileforge::infrastructure::storage::StorageService;
use fileforge::infrastructure::storage::local::LocalStorage;
use fileforge::state::AppState;

/// What a [`ScriptedTranscoder`] does after reporting its progress steps.
#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    /// Returns the input reversed.
    Reverse,
    Content,
    Infrastructure,
    /// Fails with an infrastructure error on the first `n` calls, then reverses.
    FlakyFor(u32),
}

pub struct ScriptedTranscoder {
    steps: Vec<u8>,
    outcome: Outcome,
    hold: Option<Arc<AtomicBool>>,
    calls: AtomicU32,
}

impl ScriptedTranscoder {
    pub fn new(steps: &[u8], outcome: Outcome) -> Self {
        Self {
            steps: steps.to_vec(),
            outcome,
            hold: None,
            calls: AtomicU32::new(0),
        }
    }

    /// Keeps the transcoder running after its steps until the returned flag
    /// is set or the job is cancelled.
    pub fn held(steps: &[u8], outcome: Outcome) -> (Self, Arc<AtomicBool>) {
        let release = Arc::new(AtomicBool::new(false));
        let mut transcoder = Self::new(steps, outcome);
        transcoder.hold = Some(release.clone());
        (transcoder, release)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Transcoder for ScriptedTranscoder {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn transcode(&self, ctx: TranscodeContext<'_>) -> Result<TranscodeOutput, TranscodeError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        for step in &self.steps {
            ctx.ensure_active()?;
            ctx.progress.report(*step);
        }

        if let Some(release) = &self.hold {
            while !release.load(Ordering::SeqCst) {
                ctx.ensure_active()?;
                std::thread::sleep(Duration::from_millis(5));
            }
        }
        ctx.ensure_active()?;

        match self.outcome {
            Outcome::Content => Err(TranscodeError::Content("corrupt input".into())),
            Outcome::Infrastructure => Err(TranscodeError::Infrastructure("disk unavailable".into())),
            Outcome::FlakyFor(n) if call <= n => {
                Err(TranscodeError::Infrastructure(format!("transient failure {}", call)))
            }
            Outcome::Reverse | Outcome::FlakyFor(_) => Ok(TranscodeOutput {
                bytes: ctx.input.iter().rev().copied().collect(),
            }),
        }
    }
}

pub struct TestHarness {
    pub engine: Engine,
    pub storage: StorageService,
    pub dir: TempDir,
}

impl TestHarness {
    pub async fn new(config: EngineConfig, registry: TranscoderRegistry) -> Self {
        let dir = TempDir::new().unwrap();
        let storage = StorageService::Local(LocalStorage::new(dir.path()).await.unwrap());
        let engine = Engine::start(config, registry, storage.clone());
        Self { engine, storage, dir }
    }

    /// Engine with a single strategy registered for `(source, target, kind)`.
    pub async fn with_transcoder(
        config: EngineConfig,
        source: FileFormat,
        target: FileFormat,
        kind: OperationKind,
        transcoder: Arc<dyn Transcoder>,
    ) -> Self {
        let mut registry = TranscoderRegistry::new();
        registry.register(source, target, kind, transcoder);
        Self::new(config, registry).await
    }

    pub fn app_state(&self) -> AppState {
        let config = AppConfig {
            storage_dir: self.dir.path().display().to_string(),
            ..AppConfig::default()
        };
        AppState::new(config, self.engine.coordinator(), self.storage.clone())
    }

    pub fn app(&self) -> axum::Router {
        create_app(self.app_state())
    }

    /// Stores `data` under a fresh upload key and returns the key.
    pub async fn put_source(&self, name: &str, data: &[u8]) -> String {
        let key = format!("uploads/{}", name);
        self.storage
            .put(&key, Bytes::copy_from_slice(data), "application/octet-stream")
            .await
            .unwrap();
        key
    }

    pub async fn submit(&self, spec: JobSpec) -> Job {
        self.engine.coordinator.submit(spec).await.unwrap()
    }
}

pub fn engine_config(workers: usize, depth: usize) -> EngineConfig {
    EngineConfig {
        worker_count: workers,
        max_queue_depth: depth,
        subscriber_buffer: 64,
        retry: RetryPolicy::default(),
    }
}

pub fn compress_spec(source_ref: &str, format: FileFormat, ratio: u8) -> JobSpec {
    JobSpec {
        source_ref: source_ref.to_string(),
        source_format: format,
        target_format: format,
        operation: Operation::Compress { target_ratio: ratio },
    }
}

pub fn convert_spec(source_ref: &str, source: FileFormat, target: FileFormat) -> JobSpec {
    JobSpec {
        source_ref: source_ref.to_string(),
        source_format: source,
        target_format: target,
        operation: Operation::Convert,
    }
}

/// Polls until the job reaches `state`, panicking after five seconds.
pub async fn wait_for_state(engine: &Engine, id: JobId, state: JobState) -> Job {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let job = engine.coordinator.status(id).await.unwrap();
        if job.state == state {
            return job;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {} stuck in {} waiting for {}",
            id,
            job.state,
            state
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Polls until the job is terminal.
pub async fn wait_for_terminal(engine: &Engine, id: JobId) -> Job {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let job = engine.coordinator.status(id).await.unwrap();
        if job.is_terminal() {
            return job;
        }
        assert!(tokio::time::Instant::now() < deadline, "job {} never finished", id);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
