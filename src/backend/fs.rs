//! Local filesystem backend, for on-disk partition roots.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use super::{Backend, BackendError, HealthStatus};

pub struct FsBackend {
    root: PathBuf,
    name: String,
}

impl FsBackend {
    pub fn new(root: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            name: name.into(),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    fn classify_io_error(e: &std::io::Error) -> BackendError {
        match e.kind() {
            std::io::ErrorKind::NotFound => BackendError::not_found(e.to_string()),
            std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::Interrupted
            | std::io::ErrorKind::WouldBlock => BackendError::transient(e.to_string()),
            _ => BackendError::permanent(e.to_string()),
        }
    }
}

#[async_trait]
impl Backend for FsBackend {
    async fn open(&self, path: &str) -> std::result::Result<Bytes, BackendError> {
        let full = self.resolve(path);
        tokio::fs::read(&full)
            .await
            .map(Bytes::from)
            .map_err(|e| Self::classify_io_error(&e))
    }

    async fn list(&self, prefix: &str) -> std::result::Result<Vec<String>, BackendError> {
        let dir = self.resolve(prefix);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Self::classify_io_error(&e)),
        };

        let mut out = Vec::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    if let Ok(relative) = entry.path().strip_prefix(&self.root) {
                        if let Some(s) = relative.to_str() {
                            out.push(s.replace(std::path::MAIN_SEPARATOR, "/"));
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => return Err(Self::classify_io_error(&e)),
            }
        }
        Ok(out)
    }

    async fn exists(&self, path: &str) -> std::result::Result<bool, BackendError> {
        Ok(tokio::fs::metadata(self.resolve(path)).await.is_ok())
    }

    async fn health(&self) -> HealthStatus {
        match tokio::fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => HealthStatus { ok: true, issues: vec![] },
            Ok(_) => HealthStatus {
                ok: false,
                issues: vec![format!("{} is not a directory", self.root.display())],
            },
            Err(e) => HealthStatus {
                ok: false,
                issues: vec![e.to_string()],
            },
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

pub fn is_posix_style(path: &Path) -> bool {
    !path.to_string_lossy().contains('\\')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_classifies_as_not_found() {
        let dir = std::env::temp_dir().join(format!("sensorquery-fs-test-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let backend = FsBackend::new(&dir, "fs");

        let err = backend.open("nope.arrow").await.unwrap_err();
        assert_eq!(err.kind, super::super::FailureKind::NotFound);

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn reads_back_written_bytes() {
        let dir = std::env::temp_dir().join(format!("sensorquery-fs-test2-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("a.arrow"), b"hello").await.unwrap();

        let backend = FsBackend::new(&dir, "fs");
        let bytes = backend.open("a.arrow").await.unwrap();
        assert_eq!(&bytes[..], b"hello");

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn missing_intermediate_directory_lists_empty_not_error() {
        let dir = std::env::temp_dir().join(format!("sensorquery-fs-test3-{}", std::process::id()));
        let backend = FsBackend::new(&dir, "fs");
        let listed = backend.list("asset1/2024/01/01").await.unwrap();
        assert!(listed.is_empty());
    }
}
