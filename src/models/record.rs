//! Immutable configuration of a bucket-backed credential.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{ConfigError, MissingFieldError};
use crate::models::region::Region;

/// Visibility of a credential in the host catalog. Opaque to this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CredentialScope {
    Global,
    System,
}

impl FromStr for CredentialScope {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GLOBAL" => Ok(CredentialScope::Global),
            "SYSTEM" => Ok(CredentialScope::System),
            _ => Err(ConfigError::InvalidSetting {
                name: "scope",
                reason: format!("expected GLOBAL or SYSTEM, got {s:?}"),
            }),
        }
    }
}

impl<'de> Deserialize<'de> for CredentialScope {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for CredentialScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialScope::Global => f.write_str("GLOBAL"),
            CredentialScope::System => f.write_str("SYSTEM"),
        }
    }
}

/// Raw fields as the host submits them. Nothing here is validated; turn it
/// into a [`CredentialRecord`] with [`CredentialRecord::new`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialParams {
    pub scope: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    pub region: Option<String>,
    #[serde(alias = "bucket_name")]
    pub bucket_name: Option<String>,
    #[serde(alias = "bucket_path")]
    pub bucket_path: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "kms_encryption_context_key")]
    pub kms_encryption_context_key: Option<String>,
    #[serde(default, alias = "kms_secret_name")]
    pub kms_secret_name: Option<String>,
}

/// The single `{key: value}` entry bound into the decrypt request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionContext<'a> {
    pub key: &'a str,
    pub value: &'a str,
}

/// Where a secret lives and how to unlock it.
///
/// There are no setters: a changed configuration is a new record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CredentialParams", into = "CredentialParams")]
pub struct CredentialRecord {
    scope: CredentialScope,
    id: String,
    description: Option<String>,
    region: Region,
    bucket_name: String,
    bucket_path: String,
    username: Option<String>,
    kms_encryption_context_key: Option<String>,
    kms_secret_name: Option<String>,
}

/// Blank strings count as absent; host forms submit `""` for empty inputs.
fn normalize(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn required(value: Option<String>, field: &'static str) -> Result<String, ConfigError> {
    normalize(value).ok_or(ConfigError::MissingField(field))
}

impl CredentialRecord {
    /// Validate host input. The region is resolved here, before any client
    /// exists, so a bad region can never reach the network.
    pub fn new(params: CredentialParams) -> Result<Self, ConfigError> {
        let scope: CredentialScope = required(params.scope, "scope")?.parse()?;
        let region: Region = required(params.region, "region")?.parse()?;
        let bucket_name = required(params.bucket_name, "bucketName")?;
        let bucket_path = required(params.bucket_path, "bucketPath")?;

        let id = normalize(params.id).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Ok(Self {
            scope,
            id,
            description: normalize(params.description),
            region,
            bucket_name,
            bucket_path,
            username: normalize(params.username),
            kms_encryption_context_key: normalize(params.kms_encryption_context_key),
            kms_secret_name: normalize(params.kms_secret_name),
        })
    }

    /// `bucket:path`, shown in the host's credential list.
    pub fn display_name(&self) -> String {
        format!("{}:{}", self.bucket_name, self.bucket_path)
    }

    pub fn username(&self) -> Result<&str, MissingFieldError> {
        self.username.as_deref().ok_or(MissingFieldError("username"))
    }

    pub fn scope(&self) -> CredentialScope {
        self.scope
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn bucket_name(&self) -> &str {
        &self.bucket_name
    }

    pub fn bucket_path(&self) -> &str {
        &self.bucket_path
    }

    pub fn kms_encryption_context_key(&self) -> Option<&str> {
        self.kms_encryption_context_key.as_deref()
    }

    pub fn kms_secret_name(&self) -> Option<&str> {
        self.kms_secret_name.as_deref()
    }

    /// The context entry, only when both halves are configured.
    pub fn encryption_context(&self) -> Option<EncryptionContext<'_>> {
        match (&self.kms_encryption_context_key, &self.kms_secret_name) {
            (Some(key), Some(value)) => Some(EncryptionContext { key, value }),
            _ => None,
        }
    }
}

impl TryFrom<CredentialParams> for CredentialRecord {
    type Error = ConfigError;

    fn try_from(params: CredentialParams) -> Result<Self, Self::Error> {
        CredentialRecord::new(params)
    }
}

impl From<CredentialRecord> for CredentialParams {
    fn from(record: CredentialRecord) -> Self {
        CredentialParams {
            scope: Some(record.scope.to_string()),
            id: Some(record.id),
            region: Some(record.region.as_str().to_string()),
            bucket_name: Some(record.bucket_name),
            bucket_path: Some(record.bucket_path),
            username: record.username,
            description: record.description,
            kms_encryption_context_key: record.kms_encryption_context_key,
            kms_secret_name: record.kms_secret_name,
        }
    }
}
