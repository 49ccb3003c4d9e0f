//! [`ObjectStoreReader`] over the `object_store` crate.
//!
//! Supports two backends:
//!   - `S3`: AWS S3 or any S3-compatible endpoint (MinIO, LocalStack).
//!   - `Local`: `<root>/<bucket>/<path>` on the local filesystem, for
//!     development and tests.
//!
//! One `ObjectStore` is built per bucket on first use and reused after that.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::path::Path;
use object_store::{ClientOptions, ObjectStore};
use tokio_util::io::StreamReader;
use tracing::debug;

use super::{ObjectBody, ObjectStoreReader};
use crate::auth::AwsCredentialProvider;
use crate::config::Settings;
use crate::errors::StoreError;
use crate::models::Region;

#[derive(Debug, Clone)]
pub enum StoreBackend {
    S3 {
        region: Region,
        endpoint: Option<String>,
        credentials: AwsCredentialProvider,
        connect_timeout: Duration,
        request_timeout: Duration,
    },
    Local {
        root: PathBuf,
    },
}

impl StoreBackend {
    pub fn from_settings(
        region: Region,
        settings: &Settings,
        credentials: AwsCredentialProvider,
    ) -> Self {
        match &settings.local_root {
            Some(root) => StoreBackend::Local { root: root.clone() },
            None => StoreBackend::S3 {
                region,
                endpoint: settings.s3_endpoint.clone(),
                credentials,
                connect_timeout: settings.connect_timeout(),
                request_timeout: settings.request_timeout(),
            },
        }
    }
}

pub struct BucketReader {
    backend: StoreBackend,
    stores: DashMap<String, Arc<dyn ObjectStore>>,
}

impl BucketReader {
    pub fn new(backend: StoreBackend) -> Self {
        Self {
            backend,
            stores: DashMap::new(),
        }
    }

    pub fn from_settings(
        region: Region,
        settings: &Settings,
        credentials: AwsCredentialProvider,
    ) -> Self {
        Self::new(StoreBackend::from_settings(region, settings, credentials))
    }

    pub fn backend(&self) -> &StoreBackend {
        &self.backend
    }

    fn store_for(&self, bucket: &str, path: &str) -> Result<Arc<dyn ObjectStore>, StoreError> {
        if let Some(store) = self.stores.get(bucket) {
            return Ok(store.value().clone());
        }

        let store = build_store(&self.backend, bucket, path)?;
        self.stores.insert(bucket.to_string(), store.clone());
        Ok(store)
    }
}

fn build_store(
    backend: &StoreBackend,
    bucket: &str,
    path: &str,
) -> Result<Arc<dyn ObjectStore>, StoreError> {
    match backend {
        StoreBackend::Local { root } => {
            if bucket.contains('/') || bucket.contains('\\') || bucket == ".." || bucket == "." {
                return Err(StoreError::InvalidPath {
                    path: bucket.to_string(),
                    reason: "bucket name must be a single path segment".to_string(),
                });
            }
            let dir = root.join(bucket);
            if !dir.is_dir() {
                return Err(StoreError::NotFound {
                    bucket: bucket.to_string(),
                    path: path.to_string(),
                });
            }
            let store = LocalFileSystem::new_with_prefix(&dir)
                .map_err(|e| StoreError::Transport(e.to_string()))?;
            Ok(Arc::new(store))
        }
        StoreBackend::S3 {
            region,
            endpoint,
            credentials,
            connect_timeout,
            request_timeout,
        } => {
            let mut builder = AmazonS3Builder::new()
                .with_credentials(credentials.clone())
                .with_bucket_name(bucket)
                .with_region(region.as_str())
                .with_client_options(
                    ClientOptions::new()
                        .with_connect_timeout(*connect_timeout)
                        .with_timeout(*request_timeout),
                );

            if let Some(ep) = endpoint {
                builder = builder
                    .with_endpoint(ep)
                    .with_allow_http(ep.starts_with("http://"));
            }

            let store = builder
                .build()
                .map_err(|e| StoreError::Transport(format!("failed to build S3 client: {e}")))?;
            Ok(Arc::new(store))
        }
    }
}

fn map_store_error(err: object_store::Error, bucket: &str, path: &str) -> StoreError {
    match err {
        object_store::Error::NotFound { .. } => StoreError::NotFound {
            bucket: bucket.to_string(),
            path: path.to_string(),
        },
        object_store::Error::PermissionDenied { .. }
        | object_store::Error::Unauthenticated { .. } => StoreError::AccessDenied {
            bucket: bucket.to_string(),
            path: path.to_string(),
        },
        object_store::Error::InvalidPath { source } => StoreError::InvalidPath {
            path: path.to_string(),
            reason: source.to_string(),
        },
        other => StoreError::Transport(other.to_string()),
    }
}

#[async_trait]
impl ObjectStoreReader for BucketReader {
    async fn fetch(&self, bucket: &str, path: &str) -> Result<ObjectBody, StoreError> {
        let location = Path::parse(path).map_err(|e| StoreError::InvalidPath {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        let store = self.store_for(bucket, path)?;

        let result = store
            .get(&location)
            .await
            .map_err(|e| map_store_error(e, bucket, path))?;
        debug!(bucket, path, size = result.meta.size, "opened object");

        let stream = result
            .into_stream()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e));
        Ok(ObjectBody::new(StreamReader::new(stream)))
    }
}
