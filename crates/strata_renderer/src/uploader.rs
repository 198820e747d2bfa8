//! Async effect uploader
//!
//! Effect compilation is slow, so it runs on a dedicated worker thread.
//! Requests carry their descriptor by value; results come back through a
//! completion channel the update thread drains with
//! [`AsyncEffectUploader::poll_completed`] at the start of every tick. The
//! update thread never blocks on a particular upload.

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use strata_core::typed_id;
use strata_ir::{ResourceContentHash, ResourceDescriptor};
use thiserror::Error;

typed_id! {
    /// Ticket for one upload request
    #[derive(Serialize, Deserialize)]
    pub struct UploadToken(u64);
}

/// Output of a successful compilation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledEffect {
    pub hash: ResourceContentHash,
    pub name: String,
    pub binary: Vec<u8>,
}

/// Errors from the uploader
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("effect '{name}' failed to compile: {reason}")]
    Compile { name: String, reason: String },

    #[error("upload queue is full")]
    QueueFull,

    #[error("uploader worker is not running")]
    WorkerUnavailable,

    #[error("failed to start uploader worker: {0}")]
    Spawn(String),
}

/// Turns effect sources into device-ready binaries
///
/// Called on the worker thread only.
pub trait EffectCompiler: Send + 'static {
    fn compile(&mut self, descriptor: &ResourceDescriptor) -> Result<CompiledEffect, String>;
}

/// Compiler that accepts any non-empty UTF-8 source with an entry point
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEffectCompiler;

impl EffectCompiler for DefaultEffectCompiler {
    fn compile(&mut self, descriptor: &ResourceDescriptor) -> Result<CompiledEffect, String> {
        let source = std::str::from_utf8(&descriptor.data).map_err(|e| e.to_string())?;
        if source.trim().is_empty() {
            return Err("empty source".to_string());
        }
        if !source.contains("main") {
            return Err("no entry point".to_string());
        }

        let mut binary = b"SEFX".to_vec();
        binary.extend_from_slice(&descriptor.hash.raw().to_le_bytes());
        binary.extend_from_slice(source.as_bytes());
        Ok(CompiledEffect {
            hash: descriptor.hash,
            name: descriptor.name.clone(),
            binary,
        })
    }
}

struct UploadRequest {
    token: UploadToken,
    descriptor: ResourceDescriptor,
}

/// Result of one upload request
pub type UploadCompletion = (UploadToken, Result<CompiledEffect, UploadError>);

/// Statistics about uploader usage
#[derive(Debug, Clone, Default)]
pub struct UploaderStats {
    pub requested: u64,
    pub compiled: u64,
    pub failed: u64,
    pub total_compile_time: Duration,
}

/// Worker-thread effect compiler with a polled completion queue
pub struct AsyncEffectUploader {
    requests: Option<Sender<UploadRequest>>,
    completions: Receiver<UploadCompletion>,
    next_token: u64,
    in_flight: usize,
    stats: Arc<Mutex<UploaderStats>>,
    worker: Option<JoinHandle<()>>,
}

impl AsyncEffectUploader {
    /// Start the worker thread
    pub fn new(compiler: impl EffectCompiler, queue_capacity: usize) -> Result<Self, UploadError> {
        let (request_tx, request_rx) = bounded::<UploadRequest>(queue_capacity);
        let (completion_tx, completion_rx) = unbounded();
        let stats = Arc::new(Mutex::new(UploaderStats::default()));
        let worker_stats = Arc::clone(&stats);

        let worker = thread::Builder::new()
            .name("strata-effect-uploader".to_string())
            .spawn(move || Self::worker_loop(compiler, request_rx, completion_tx, worker_stats))
            .map_err(|e| UploadError::Spawn(e.to_string()))?;

        log::info!("Effect uploader started (queue capacity {})", queue_capacity);

        Ok(Self {
            requests: Some(request_tx),
            completions: completion_rx,
            next_token: 1,
            in_flight: 0,
            stats,
            worker: Some(worker),
        })
    }

    fn worker_loop(
        mut compiler: impl EffectCompiler,
        requests: Receiver<UploadRequest>,
        completions: Sender<UploadCompletion>,
        stats: Arc<Mutex<UploaderStats>>,
    ) {
        for request in requests.iter() {
            let started = Instant::now();
            let result = compiler
                .compile(&request.descriptor)
                .map_err(|reason| UploadError::Compile {
                    name: request.descriptor.name.clone(),
                    reason,
                });

            {
                let mut stats = stats.lock();
                stats.total_compile_time += started.elapsed();
                if result.is_ok() {
                    stats.compiled += 1;
                } else {
                    stats.failed += 1;
                }
            }

            if completions.send((request.token, result)).is_err() {
                break;
            }
        }
        log::debug!("Effect uploader worker exiting");
    }

    /// Queue an effect for compilation
    pub fn request_upload(&mut self, descriptor: ResourceDescriptor) -> Result<UploadToken, UploadError> {
        let sender = self.requests.as_ref().ok_or(UploadError::WorkerUnavailable)?;
        let token = UploadToken::new(self.next_token);

        match sender.try_send(UploadRequest { token, descriptor }) {
            Ok(()) => {
                self.next_token += 1;
                self.in_flight += 1;
                self.stats.lock().requested += 1;
                Ok(token)
            }
            Err(TrySendError::Full(_)) => Err(UploadError::QueueFull),
            Err(TrySendError::Disconnected(_)) => Err(UploadError::WorkerUnavailable),
        }
    }

    /// Take every completed upload without blocking
    pub fn poll_completed(&mut self) -> Vec<UploadCompletion> {
        let completed: Vec<_> = self.completions.try_iter().collect();
        self.in_flight = self.in_flight.saturating_sub(completed.len());
        completed
    }

    /// Requests whose result has not been polled yet
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Block until every in-flight request has a result ready to poll
    ///
    /// Meant for tools and tests; the update loop itself never waits.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.completions.len() < self.in_flight {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        true
    }

    /// Get current statistics
    pub fn stats(&self) -> UploaderStats {
        self.stats.lock().clone()
    }
}

impl Drop for AsyncEffectUploader {
    fn drop(&mut self) {
        // Closing the request channel ends the worker loop
        self.requests.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        log::info!("Effect uploader stopped");
    }
}
