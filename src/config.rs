use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::errors::ConfigError;
use crate::models::SecretValue;
use crate::retry::RetryConfig;

/// How the object text maps onto the KMS ciphertext blob.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CiphertextEncoding {
    /// The UTF-8 bytes of the (separator-stripped) text are the blob.
    #[default]
    Raw,
    /// The text is standard base64 of the blob.
    Base64,
}

impl FromStr for CiphertextEncoding {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" => Ok(CiphertextEncoding::Raw),
            "base64" => Ok(CiphertextEncoding::Base64),
            other => Err(ConfigError::InvalidSetting {
                name: "BUCKET_CREDS_CIPHERTEXT_ENCODING",
                reason: format!("expected raw or base64, got {other:?}"),
            }),
        }
    }
}

/// Static AWS credentials used to sign KMS calls and, when set, S3 calls.
#[derive(Clone, Deserialize)]
pub struct AwsCredentials {
    pub access_key_id: String,
    #[serde(deserialize_with = "deserialize_secret")]
    pub secret_access_key: SecretValue,
    #[serde(default)]
    pub session_token: Option<String>,
}

impl AwsCredentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: SecretValue::new(secret_access_key),
            session_token: None,
        }
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Read `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` / `AWS_SESSION_TOKEN`.
    pub fn from_env() -> Option<Self> {
        let key = std::env::var("AWS_ACCESS_KEY_ID").ok().filter(|v| !v.is_empty())?;
        let secret = std::env::var("AWS_SECRET_ACCESS_KEY").ok().filter(|v| !v.is_empty())?;
        let creds = Self::new(key, secret);
        Some(match std::env::var("AWS_SESSION_TOKEN") {
            Ok(token) if !token.is_empty() => creds.with_session_token(token),
            _ => creds,
        })
    }
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &self.secret_access_key)
            .field("session_token", &self.session_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

fn deserialize_secret<'de, D: serde::Deserializer<'de>>(d: D) -> Result<SecretValue, D::Error> {
    String::deserialize(d).map(SecretValue::new)
}

/// Process-wide settings for the store and key service clients.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// S3-compatible endpoint (MinIO, LocalStack). `None` = AWS.
    pub s3_endpoint: Option<String>,
    /// Serve buckets from `<root>/<bucket>` instead of S3.
    pub local_root: Option<PathBuf>,
    /// KMS endpoint override. `None` = `https://kms.<region>.amazonaws.com`.
    pub kms_endpoint: Option<String>,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub kms_retry: RetryConfig,
    /// 0 disables the secret cache.
    pub cache_ttl_secs: u64,
    pub ciphertext_encoding: CiphertextEncoding,
    pub credentials: Option<AwsCredentials>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            s3_endpoint: None,
            local_root: None,
            kms_endpoint: None,
            connect_timeout_secs: 5,
            request_timeout_secs: 30,
            kms_retry: RetryConfig::default(),
            cache_ttl_secs: 0,
            ciphertext_encoding: CiphertextEncoding::Raw,
            credentials: None,
        }
    }
}

impl Settings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        (self.cache_ttl_secs > 0).then(|| Duration::from_secs(self.cache_ttl_secs))
    }
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_num<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Load settings from `.env` and the process environment.
pub fn load() -> Result<Settings, ConfigError> {
    dotenvy::dotenv().ok();

    let defaults = Settings::default();
    let ciphertext_encoding = match env_opt("BUCKET_CREDS_CIPHERTEXT_ENCODING") {
        Some(v) => v.parse()?,
        None => defaults.ciphertext_encoding,
    };

    Ok(Settings {
        s3_endpoint: env_opt("BUCKET_CREDS_S3_ENDPOINT"),
        local_root: env_opt("BUCKET_CREDS_LOCAL_ROOT").map(PathBuf::from),
        kms_endpoint: env_opt("BUCKET_CREDS_KMS_ENDPOINT"),
        connect_timeout_secs: env_num(
            "BUCKET_CREDS_CONNECT_TIMEOUT_SECS",
            defaults.connect_timeout_secs,
        ),
        request_timeout_secs: env_num(
            "BUCKET_CREDS_REQUEST_TIMEOUT_SECS",
            defaults.request_timeout_secs,
        ),
        kms_retry: RetryConfig {
            max_retries: env_num("BUCKET_CREDS_KMS_MAX_RETRIES", defaults.kms_retry.max_retries),
            ..defaults.kms_retry
        },
        cache_ttl_secs: env_num("BUCKET_CREDS_CACHE_TTL_SECS", defaults.cache_ttl_secs),
        ciphertext_encoding,
        credentials: AwsCredentials::from_env(),
    })
}
