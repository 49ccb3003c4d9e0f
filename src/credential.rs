//! The identity object handed to the host: a record plus the resolver that
//! unlocks its password.

use std::sync::Arc;

use tokio::runtime::{Handle, RuntimeFlavor};

use crate::config::Settings;
use crate::errors::{ConfigError, CredentialError, MissingFieldError};
use crate::models::{CredentialRecord, CredentialScope, SecretValue};
use crate::resolver::SecretResolver;

#[derive(Clone)]
pub struct BucketCredential {
    record: CredentialRecord,
    resolver: Arc<SecretResolver>,
}

impl BucketCredential {
    pub fn new(record: CredentialRecord, resolver: Arc<SecretResolver>) -> Self {
        Self { record, resolver }
    }

    /// Build the store and KMS clients for the record's region.
    pub fn connect(record: CredentialRecord, settings: &Settings) -> Result<Self, ConfigError> {
        let resolver = SecretResolver::from_settings(record.region(), settings)?;
        Ok(Self::new(record, Arc::new(resolver)))
    }

    pub fn record(&self) -> &CredentialRecord {
        &self.record
    }

    pub fn id(&self) -> &str {
        self.record.id()
    }

    pub fn scope(&self) -> CredentialScope {
        self.record.scope()
    }

    pub fn description(&self) -> Option<&str> {
        self.record.description()
    }

    pub fn display_name(&self) -> String {
        self.record.display_name()
    }

    pub fn username(&self) -> Result<&str, MissingFieldError> {
        self.record.username()
    }

    /// Fetch and decrypt the password. Each call goes back to the store and
    /// KMS unless the resolver has a cache.
    pub async fn password(&self) -> Result<SecretValue, CredentialError> {
        self.resolver.resolve_password(&self.record).await
    }

    /// Blocking form of [`password`](Self::password) for hosts without an
    /// async runtime.
    ///
    /// Blocks the calling thread for two network round trips. Inside a
    /// multi-thread tokio runtime it runs via `block_in_place`; inside a
    /// current-thread runtime it returns
    /// [`CredentialError::BlockingUnsupported`].
    pub fn password_blocking(&self) -> Result<SecretValue, CredentialError> {
        match Handle::try_current() {
            Ok(handle) => match handle.runtime_flavor() {
                RuntimeFlavor::MultiThread => {
                    tokio::task::block_in_place(|| handle.block_on(self.password()))
                }
                _ => Err(CredentialError::BlockingUnsupported),
            },
            Err(_) => tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?
                .block_on(self.password()),
        }
    }
}

impl std::fmt::Debug for BucketCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketCredential")
            .field("record", &self.record)
            .finish_non_exhaustive()
    }
}
