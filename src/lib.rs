//! Username/password credentials whose password lives encrypted in an S3
//! object and is unlocked with AWS KMS on demand.

pub mod auth;
pub mod cache;
pub mod config;
pub mod credential;
pub mod errors;
pub mod kms;
pub mod models;
pub mod registry;
pub mod resolver;
pub mod retry;
pub mod store;

pub use credential::BucketCredential;
pub use errors::{ConfigError, CredentialError, MissingFieldError};
pub use models::{CredentialParams, CredentialRecord, CredentialScope, Region, SecretValue};
pub use registry::{CredentialCatalog, DESCRIPTOR};
pub use resolver::SecretResolver;
