use thiserror::Error;

/// Raised while building records, clients or catalogs. Nothing partially
/// constructed escapes when one of these is returned.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown region: {0:?}")]
    UnknownRegion(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },

    #[error("failed to build client: {0}")]
    Client(String),

    #[error("catalog {path}: {reason}")]
    Catalog { path: String, reason: String },
}

/// A field the host requires was never configured.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("missing required field: {0}")]
pub struct MissingFieldError(pub &'static str);

/// Failures from an [`ObjectStoreReader`](crate::store::ObjectStoreReader).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {bucket}/{path}")]
    NotFound { bucket: String, path: String },

    #[error("access denied to {bucket}/{path}")]
    AccessDenied { bucket: String, path: String },

    #[error("invalid object path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("object store transport error: {0}")]
    Transport(String),

    #[error("error reading object: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures from a [`KeyDecryptor`](crate::kms::KeyDecryptor).
#[derive(Debug, Error)]
pub enum KmsError {
    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("invalid ciphertext: {0}")]
    InvalidCiphertext(String),

    #[error("could not load AWS credentials: {0}")]
    Credentials(String),

    #[error("key service transport error: {0}")]
    Transport(String),

    #[error("key service error {code}: {message}")]
    Service { code: String, message: String },

    #[error("malformed key service response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Error)]
#[error("failed to fetch secret from {bucket}:{path}")]
pub struct SecretFetchError {
    pub bucket: String,
    pub path: String,
    #[source]
    pub source: StoreError,
}

#[derive(Debug, Error)]
#[error("failed to decrypt secret from {bucket}:{path}")]
pub struct SecretDecryptError {
    pub bucket: String,
    pub path: String,
    #[source]
    pub source: KmsError,
}

/// Error type of the password accessor.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error(transparent)]
    Fetch(#[from] SecretFetchError),

    #[error(transparent)]
    Decrypt(#[from] SecretDecryptError),

    #[error("blocking password lookup is not supported on a current-thread runtime")]
    BlockingUnsupported,

    #[error("failed to start runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

impl CredentialError {
    /// True for failures a caller may reasonably retry later.
    pub fn is_transient(&self) -> bool {
        match self {
            CredentialError::Fetch(e) => matches!(e.source, StoreError::Transport(_)),
            CredentialError::Decrypt(e) => {
                matches!(e.source, KmsError::Transport(_) | KmsError::Credentials(_))
            }
            _ => false,
        }
    }
}
