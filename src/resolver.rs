//! Fetch → decrypt → wrap.
//!
//! Every call makes one object-store read and one KMS call unless a
//! [`SecretCache`] is attached. Nothing in here logs or formats ciphertext or
//! plaintext; events carry coordinates and sizes only.

use std::io;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, error, info};

use crate::auth;
use crate::cache::SecretCache;
use crate::config::{CiphertextEncoding, Settings};
use crate::errors::{
    ConfigError, CredentialError, KmsError, SecretDecryptError, SecretFetchError, StoreError,
};
use crate::kms::{AwsKmsClient, DecryptRequest, KeyDecryptor};
use crate::models::{CredentialRecord, Region, SecretValue};
use crate::store::{BucketReader, ObjectStoreReader};

pub struct SecretResolver {
    store: Arc<dyn ObjectStoreReader>,
    kms: Arc<dyn KeyDecryptor>,
    encoding: CiphertextEncoding,
    cache: Option<SecretCache>,
}

impl SecretResolver {
    pub fn new(store: Arc<dyn ObjectStoreReader>, kms: Arc<dyn KeyDecryptor>) -> Self {
        Self {
            store,
            kms,
            encoding: CiphertextEncoding::Raw,
            cache: None,
        }
    }

    /// Resolver backed by the S3 (or local) reader and AWS KMS for `region`.
    /// Both share one credential provider.
    pub fn from_settings(region: Region, settings: &Settings) -> Result<Self, ConfigError> {
        let credentials = auth::credential_provider(region, settings)?;
        let store = Arc::new(BucketReader::from_settings(region, settings, credentials.clone()));
        let kms = Arc::new(AwsKmsClient::with_credentials(region, settings, credentials)?);

        let mut resolver = Self::new(store, kms).with_encoding(settings.ciphertext_encoding);
        if let Some(ttl) = settings.cache_ttl() {
            resolver = resolver.with_cache(SecretCache::new(ttl));
        }
        Ok(resolver)
    }

    pub fn with_encoding(mut self, encoding: CiphertextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_cache(mut self, cache: SecretCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn cache(&self) -> Option<&SecretCache> {
        self.cache.as_ref()
    }

    /// Fetch the object named by `record`, decrypt it, and return the
    /// plaintext as a [`SecretValue`].
    pub async fn resolve_password(
        &self,
        record: &CredentialRecord,
    ) -> Result<SecretValue, CredentialError> {
        let cache_key = self.cache.as_ref().map(|_| SecretCache::key_for(record));
        if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
            if let Some(hit) = cache.get(key) {
                debug!(credential = %record.display_name(), "secret cache hit");
                return Ok(hit);
            }
        }

        let ciphertext = self.read_ciphertext(record).await?;
        let secret = self.decrypt(record, ciphertext).await?;

        if let (Some(cache), Some(key)) = (&self.cache, cache_key) {
            cache.insert(key, secret.clone());
        }
        Ok(secret)
    }

    async fn read_ciphertext(&self, record: &CredentialRecord) -> Result<String, SecretFetchError> {
        let bucket = record.bucket_name();
        let path = record.bucket_path();
        let fetch_error = |source| SecretFetchError {
            bucket: bucket.to_string(),
            path: path.to_string(),
            source,
        };

        debug!(bucket, path, "reading secret object");
        let mut body = self.store.fetch(bucket, path).await.map_err(|e| {
            error!(bucket, path, error = %e, "failed to open secret object");
            fetch_error(e)
        })?;

        let read = read_joined_lines(body.reader_mut()).await;
        if let Err(e) = body.close() {
            error!(bucket, path, error = %e, "failed to close secret object stream");
        }

        let ciphertext = read.map_err(|e| {
            error!(bucket, path, error = %e, "I/O error reading secret object");
            fetch_error(StoreError::Io(e))
        })?;

        debug!(bucket, path, bytes = ciphertext.len(), "read secret object");
        Ok(ciphertext)
    }

    async fn decrypt(
        &self,
        record: &CredentialRecord,
        ciphertext: String,
    ) -> Result<SecretValue, SecretDecryptError> {
        let bucket = record.bucket_name();
        let path = record.bucket_path();
        let decrypt_error = |source| SecretDecryptError {
            bucket: bucket.to_string(),
            path: path.to_string(),
            source,
        };

        let blob = match self.encoding {
            CiphertextEncoding::Raw => Bytes::from(ciphertext.into_bytes()),
            CiphertextEncoding::Base64 => STANDARD
                .decode(ciphertext.as_bytes())
                .map(Bytes::from)
                .map_err(|_| {
                    decrypt_error(KmsError::InvalidCiphertext(
                        "secret object is not valid base64".to_string(),
                    ))
                })?,
        };

        let mut request = DecryptRequest::new(blob);
        match record.encryption_context() {
            Some(ctx) => {
                info!(bucket, path, context_key = ctx.key, "decrypting with encryption context");
                request = request.with_context_entry(ctx.key, ctx.value);
            }
            None => debug!(bucket, path, "decrypting without encryption context"),
        }

        debug!(bucket, path, region = %record.region(), "decrypting with kms");
        let plaintext = self.kms.decrypt(request).await.map_err(|e| {
            error!(bucket, path, error = %e, "kms decrypt failed");
            decrypt_error(e)
        })?;
        debug!(bucket, path, "decrypted with kms");

        Ok(SecretValue::new(String::from_utf8_lossy(&plaintext)))
    }
}

/// Read `reader` line by line and concatenate the lines with no separator.
///
/// `\n`, `\r\n` and a lone `\r` all end a line, so no CR or LF byte
/// survives. Wrapped base64 comes out as one string; any other multi-line
/// payload loses its line structure.
pub(crate) async fn read_joined_lines<R: AsyncRead + Unpin>(reader: R) -> io::Result<String> {
    let mut reader = BufReader::new(reader);
    let mut joined = Vec::new();
    let mut line = Vec::new();

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }
        joined.extend(line.iter().copied().filter(|b| *b != b'\n' && *b != b'\r'));
    }

    // invalid UTF-8 becomes U+FFFD instead of failing the read
    Ok(String::from_utf8_lossy(&joined).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn joined(input: &[u8]) -> io::Result<String> {
        read_joined_lines(input).await
    }

    #[tokio::test]
    async fn test_separators_are_stripped() {
        assert_eq!(joined(b"AQIC\nAHh4\nZZ==\n").await.unwrap(), "AQICAHh4ZZ==");
        assert_eq!(joined(b"AQIC\r\nAHh4\r\n").await.unwrap(), "AQICAHh4");
        assert_eq!(joined(b"AQIC\rAHh4").await.unwrap(), "AQICAHh4");
        assert_eq!(joined(b"no-newline").await.unwrap(), "no-newline");
    }

    #[tokio::test]
    async fn test_blank_lines_and_empty_input() {
        assert_eq!(joined(b"\n\n\n").await.unwrap(), "");
        assert_eq!(joined(b"").await.unwrap(), "");
        assert_eq!(joined(b"a\n\nb").await.unwrap(), "ab");
    }

    #[tokio::test]
    async fn test_interior_whitespace_is_kept() {
        assert_eq!(joined(b"a b\tc\n d").await.unwrap(), "a b\tc d");
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_replaced_not_rejected() {
        assert_eq!(joined(&[0x41, 0xff, 0x0a, 0x42]).await.unwrap(), "A\u{fffd}B");
    }
}
