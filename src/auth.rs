//! AWS credential resolution shared by the S3 reader and the KMS client.
//!
//! Static keys from settings win. Otherwise the `object_store` chain is used:
//! `AWS_*` env vars, web identity, the ECS container endpoint, then the EC2
//! instance role. Providers cache and refresh their own credentials.

use std::sync::Arc;

use object_store::aws::{AmazonS3Builder, AwsCredential};
use object_store::{ClientOptions, StaticCredentialProvider};
use reqwest::header::HeaderValue;
use tracing::debug;

pub use object_store::aws::AwsCredentialProvider;

use crate::config::{AwsCredentials, Settings};
use crate::errors::ConfigError;
use crate::models::{Region, SecretValue};

// the builder insists on a bucket; only its credential chain is kept
const CHAIN_BUCKET: &str = "bucket-credentials-chain";

/// Provider for `region`: the configured static keys, or the default chain.
pub fn credential_provider(
    region: Region,
    settings: &Settings,
) -> Result<AwsCredentialProvider, ConfigError> {
    if let Some(creds) = &settings.credentials {
        return static_provider(creds);
    }

    debug!(region = %region, "using default AWS credential chain");
    let s3 = AmazonS3Builder::from_env()
        .with_region(region.as_str())
        .with_bucket_name(CHAIN_BUCKET)
        .with_client_options(
            ClientOptions::new()
                .with_connect_timeout(settings.connect_timeout())
                .with_timeout(settings.request_timeout()),
        )
        .build()
        .map_err(|e| ConfigError::Client(format!("failed to set up AWS credential chain: {e}")))?;
    Ok(s3.credentials().clone())
}

/// Provider that always hands out `creds`. Keys that cannot travel in an
/// HTTP header are rejected here rather than at signing time.
pub fn static_provider(creds: &AwsCredentials) -> Result<AwsCredentialProvider, ConfigError> {
    header_safe("AWS_ACCESS_KEY_ID", &creds.access_key_id)?;
    if let Some(token) = &creds.session_token {
        header_safe("AWS_SESSION_TOKEN", token)?;
    }

    Ok(Arc::new(StaticCredentialProvider::new(AwsCredential {
        key_id: creds.access_key_id.clone(),
        secret_key: creds.secret_access_key.expose_secret().to_string(),
        token: creds.session_token.clone(),
    })))
}

/// Copy a provider credential into the form the request signer takes.
pub(crate) fn signing_credentials(credential: &AwsCredential) -> AwsCredentials {
    AwsCredentials {
        access_key_id: credential.key_id.clone(),
        secret_access_key: SecretValue::new(credential.secret_key.as_str()),
        session_token: credential.token.clone(),
    }
}

fn header_safe(name: &'static str, value: &str) -> Result<(), ConfigError> {
    HeaderValue::from_str(value)
        .map(|_| ())
        .map_err(|_| ConfigError::InvalidSetting {
            name,
            reason: "contains characters not allowed in HTTP headers".to_string(),
        })
}
