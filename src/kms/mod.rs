pub mod aws;
pub mod sigv4;

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use zeroize::Zeroizing;

use crate::errors::KmsError;

pub use aws::AwsKmsClient;

/// A single decrypt call: the ciphertext blob plus the encryption context it
/// was sealed under (usually empty or one entry).
#[derive(Clone, Default, PartialEq, Eq)]
pub struct DecryptRequest {
    pub ciphertext_blob: Bytes,
    pub encryption_context: BTreeMap<String, String>,
}

impl DecryptRequest {
    pub fn new(ciphertext_blob: impl Into<Bytes>) -> Self {
        Self {
            ciphertext_blob: ciphertext_blob.into(),
            encryption_context: BTreeMap::new(),
        }
    }

    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.encryption_context.insert(key.into(), value.into());
        self
    }
}

// ciphertext stays out of logs too
impl std::fmt::Debug for DecryptRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptRequest")
            .field("ciphertext_blob", &format_args!("<{} bytes>", self.ciphertext_blob.len()))
            .field("encryption_context", &self.encryption_context)
            .finish()
    }
}

/// Capability boundary to a managed key service.
#[async_trait]
pub trait KeyDecryptor: Send + Sync {
    /// Decrypt `request`, returning plaintext bytes that are zeroed on drop.
    async fn decrypt(&self, request: DecryptRequest) -> Result<Zeroizing<Vec<u8>>, KmsError>;
}
