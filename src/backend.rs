//! Backend interface + registry: an abstract `{open, list, exists,
//! health}` capability set, with retry-then-fallback across an ordered set of
//! concrete backends.
//!
//! Concrete backends live in `backend::fs` (local filesystem) and
//! `backend::object_store_backend` (S3/GCS/Azure via the `object_store`
//! crate, the abstraction `stormasm-ioxnu22july/parquet_file` uses for the
//! same role).

pub mod fs;
pub mod object_store_backend;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{QueryError, Result};

/// Health status of one backend.
#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub ok: bool,
    pub issues: Vec<String>,
}

/// Classification of a failed backend operation, used to decide between
/// retrying and falling over to the next backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transient,
    NotFound,
    Permanent,
}

/// An error from a single backend operation, tagged with how the registry
/// should react to it.
#[derive(Debug, Clone, thiserror::Error)]
#[error("backend error: {message}")]
pub struct BackendError {
    pub kind: FailureKind,
    pub message: String,
}

impl BackendError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::NotFound,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Permanent,
            message: message.into(),
        }
    }
}

/// The abstract capability set every storage backend must implement.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Read the full contents at `path`.
    async fn open(&self, path: &str) -> std::result::Result<Bytes, BackendError>;

    /// List all paths under `prefix` (non-recursive-vs-recursive is a backend
    /// detail; callers pass fully-qualified prefixes).
    async fn list(&self, prefix: &str) -> std::result::Result<Vec<String>, BackendError>;

    /// Whether `path` exists.
    async fn exists(&self, path: &str) -> std::result::Result<bool, BackendError>;

    /// Lightweight health probe.
    async fn health(&self) -> HealthStatus;

    /// Human-readable name for logging/metadata.
    fn name(&self) -> &str;
}

/// Logical backend role within the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Primary,
    Secondary,
}

/// Bounded exponential backoff parameters.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base: Duration,
    pub factor: u32,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(100),
            factor: 2,
            cap: Duration::from_secs(2),
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.base.saturating_mul(self.factor.saturating_pow(attempt));
        scaled.min(self.cap)
    }
}

/// Ordered set of backends the engine reads through, with retry + fallback.
pub struct Registry {
    backends: Vec<(Role, std::sync::Arc<dyn Backend>)>,
    retry: RetryPolicy,
}

impl Registry {
    pub fn new(backends: Vec<(Role, std::sync::Arc<dyn Backend>)>) -> Self {
        Self {
            backends,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Read `path`, retrying transient failures per-backend and falling over
    /// to the next backend on a permanent not-found. All-backends-not-found
    /// returns `Ok(None)` (empty, not an error); an
    /// all-backends-transient-failure surfaces as `BACKEND_UNAVAILABLE`.
    pub async fn open(&self, path: &str) -> Result<Option<Bytes>> {
        let mut last_transient: Option<String> = None;

        for (_, backend) in &self.backends {
            match self.open_with_retry(backend.as_ref(), path).await {
                Ok(bytes) => return Ok(Some(bytes)),
                Err(BackendError { kind: FailureKind::NotFound, .. }) => continue,
                Err(BackendError { kind: FailureKind::Transient, message }) => {
                    last_transient = Some(message);
                    continue;
                }
                Err(e @ BackendError { kind: FailureKind::Permanent, .. }) => {
                    return Err(QueryError::read_failed(e.message));
                }
            }
        }

        match last_transient {
            Some(message) => Err(QueryError::backend_unavailable(message)),
            None => Ok(None),
        }
    }

    async fn open_with_retry(&self, backend: &dyn Backend, path: &str) -> std::result::Result<Bytes, BackendError> {
        let mut attempt = 0;
        loop {
            match backend.open(path).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.kind == FailureKind::Transient && attempt + 1 < self.retry.max_attempts => {
                    tokio::time::sleep(self.retry.delay_for_attempt(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// List `prefix` across backends, trying each in order until one
    /// succeeds (or all are exhausted, yielding empty).
    pub async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut last_transient: Option<String> = None;
        for (_, backend) in &self.backends {
            let mut attempt = 0;
            loop {
                match backend.list(prefix).await {
                    Ok(paths) => return Ok(paths),
                    Err(e) if e.kind == FailureKind::Transient && attempt + 1 < self.retry.max_attempts => {
                        tokio::time::sleep(self.retry.delay_for_attempt(attempt)).await;
                        attempt += 1;
                    }
                    Err(BackendError { kind: FailureKind::Transient, message }) => {
                        last_transient = Some(message);
                        break;
                    }
                    Err(_) => break,
                }
            }
        }
        match last_transient {
            Some(message) => Err(QueryError::backend_unavailable(message)),
            None => Ok(Vec::new()),
        }
    }

    pub async fn health(&self) -> Vec<(String, HealthStatus)> {
        let mut out = Vec::with_capacity(self.backends.len());
        for (_, backend) in &self.backends {
            out.push((backend.name().to_string(), backend.health().await));
        }
        out
    }
}
