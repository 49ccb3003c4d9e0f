pub mod bucket;

use std::io;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncRead;

use crate::errors::StoreError;

pub use bucket::{BucketReader, StoreBackend};

type CloseHook = Box<dyn FnOnce() -> io::Result<()> + Send>;

/// An open object body.
///
/// Callers must hand it back through [`close`](Self::close) once done so the
/// underlying connection is released and close failures can be reported.
pub struct ObjectBody {
    reader: Pin<Box<dyn AsyncRead + Send>>,
    on_close: Option<CloseHook>,
}

impl ObjectBody {
    pub fn new(reader: impl AsyncRead + Send + 'static) -> Self {
        Self {
            reader: Box::pin(reader),
            on_close: None,
        }
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self::new(io::Cursor::new(bytes.into()))
    }

    /// Run `hook` when the body is closed, after the reader is dropped.
    pub fn with_close_hook(mut self, hook: impl FnOnce() -> io::Result<()> + Send + 'static) -> Self {
        self.on_close = Some(Box::new(hook));
        self
    }

    pub fn reader_mut(&mut self) -> &mut Pin<Box<dyn AsyncRead + Send>> {
        &mut self.reader
    }

    pub fn close(self) -> io::Result<()> {
        let ObjectBody { reader, on_close } = self;
        drop(reader);
        match on_close {
            Some(hook) => hook(),
            None => Ok(()),
        }
    }
}

/// Capability boundary to an object store.
#[async_trait]
pub trait ObjectStoreReader: Send + Sync {
    /// Open `bucket/path` for reading.
    async fn fetch(&self, bucket: &str, path: &str) -> Result<ObjectBody, StoreError>;
}
