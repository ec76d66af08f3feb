//! Object-store-backed backend, wrapping the `object_store` crate so the
//! same `Backend` contract works against S3, GCS, Azure, or a local dir
//! without hand-rolling a client per provider. Grounded in
//! `stormasm-ioxnu22july/parquet_file`, which uses `object_store` for the
//! same columnar-partition-reading role.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::TryStreamExt;
use object_store::{path::Path as ObjectPath, Error as ObjectStoreError, ObjectStore};
use std::sync::Arc;

use super::{Backend, BackendError, HealthStatus};

pub struct ObjectStoreBackend {
    store: Arc<dyn ObjectStore>,
    name: String,
}

impl ObjectStoreBackend {
    pub fn new(store: Arc<dyn ObjectStore>, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
        }
    }

    fn classify(e: &ObjectStoreError) -> BackendError {
        match e {
            ObjectStoreError::NotFound { .. } => BackendError::not_found(e.to_string()),
            ObjectStoreError::Generic { .. } | ObjectStoreError::Unauthenticated { .. } => {
                BackendError::permanent(e.to_string())
            }
            _ => BackendError::transient(e.to_string()),
        }
    }
}

#[async_trait]
impl Backend for ObjectStoreBackend {
    async fn open(&self, path: &str) -> std::result::Result<Bytes, BackendError> {
        let object_path = ObjectPath::from(path);
        let result = self
            .store
            .get(&object_path)
            .await
            .map_err(|e| Self::classify(&e))?;
        result.bytes().await.map_err(|e| Self::classify(&e))
    }

    async fn list(&self, prefix: &str) -> std::result::Result<Vec<String>, BackendError> {
        let object_prefix = ObjectPath::from(prefix);
        let mut stream = self.store.list(Some(&object_prefix));
        let mut out = Vec::new();
        loop {
            match stream.try_next().await {
                Ok(Some(meta)) => out.push(meta.location.to_string()),
                Ok(None) => break,
                Err(ObjectStoreError::NotFound { .. }) => break,
                Err(e) => return Err(Self::classify(&e)),
            }
        }
        Ok(out)
    }

    async fn exists(&self, path: &str) -> std::result::Result<bool, BackendError> {
        match self.store.head(&ObjectPath::from(path)).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(Self::classify(&e)),
        }
    }

    async fn health(&self) -> HealthStatus {
        match self.store.list(None).try_next().await {
            Ok(_) => HealthStatus { ok: true, issues: vec![] },
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
