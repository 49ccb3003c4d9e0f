//! AWS KMS `Decrypt` over the JSON 1.1 protocol.
//!
//! Only the one call the resolver needs. Each call fetches a credential from
//! the provider, is SigV4-signed once, and is retried with backoff on
//! throttling and 5xx responses.

use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use zeroize::{Zeroize, Zeroizing};

use super::sigv4::RequestSigner;
use super::{DecryptRequest, KeyDecryptor};
use crate::auth::{self, AwsCredentialProvider};
use crate::config::Settings;
use crate::errors::{ConfigError, KmsError};
use crate::models::Region;
use crate::retry::{send_with_retry, RetryConfig};

const SERVICE: &str = "kms";
const JSON_CONTENT_TYPE: &str = "application/x-amz-json-1.1";
const DECRYPT_TARGET: &str = "TrentService.Decrypt";

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct DecryptBody {
    ciphertext_blob: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    encryption_context: BTreeMap<String, String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DecryptResponse {
    plaintext: String,
    #[serde(default)]
    key_id: Option<String>,
}

#[derive(Default, Deserialize)]
struct ErrorBody {
    #[serde(rename = "__type", default)]
    kind: Option<String>,
    #[serde(alias = "Message", default)]
    message: Option<String>,
}

pub struct AwsKmsClient {
    http: reqwest::Client,
    endpoint: String,
    region: Region,
    credentials: AwsCredentialProvider,
    retry: RetryConfig,
}

impl AwsKmsClient {
    /// Client for `region` using the configured keys or, failing that, the
    /// default AWS credential chain.
    pub fn new(region: Region, settings: &Settings) -> Result<Self, ConfigError> {
        let credentials = auth::credential_provider(region, settings)?;
        Self::with_credentials(region, settings, credentials)
    }

    pub fn with_credentials(
        region: Region,
        settings: &Settings,
        credentials: AwsCredentialProvider,
    ) -> Result<Self, ConfigError> {
        let endpoint = settings
            .kms_endpoint
            .clone()
            .unwrap_or_else(|| region.endpoint(SERVICE));
        let invalid_endpoint = |reason: String| ConfigError::InvalidSetting {
            name: "BUCKET_CREDS_KMS_ENDPOINT",
            reason,
        };
        let url = url::Url::parse(&endpoint).map_err(|e| invalid_endpoint(e.to_string()))?;
        if url.host_str().is_none() {
            return Err(invalid_endpoint(format!("{endpoint:?} has no host")));
        }

        let http = reqwest::Client::builder()
            .use_rustls_tls()
            .connect_timeout(settings.connect_timeout())
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;

        Ok(Self {
            http,
            endpoint,
            region,
            credentials,
            retry: settings.kms_retry.clone(),
        })
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Fetch the current credential and sign `body` with it. One signature
    /// covers every retry of the call; retries end well inside its validity
    /// window.
    async fn signed_headers(&self, body: &[u8]) -> Result<HeaderMap, KmsError> {
        let credential = self.credentials.get_credential().await.map_err(|e| {
            error!(error = %e, "failed to load AWS credentials for KMS");
            KmsError::Credentials(e.to_string())
        })?;
        let signer = RequestSigner::new(
            auth::signing_credentials(&credential),
            self.region.as_str(),
            SERVICE,
        );

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        headers.insert(
            HeaderName::from_static("x-amz-target"),
            HeaderValue::from_static(DECRYPT_TARGET),
        );
        signer
            .sign("POST", &self.endpoint, &mut headers, body)
            .map_err(|e| KmsError::Credentials(e.to_string()))?;
        Ok(headers)
    }
}

/// Map a KMS error response onto [`KmsError`]. `__type` may carry a
/// `namespace#` prefix.
fn classify_error(status: StatusCode, body: &[u8]) -> KmsError {
    let parsed: ErrorBody = serde_json::from_slice(body).unwrap_or_default();
    let code = parsed
        .kind
        .as_deref()
        .and_then(|t| t.rsplit('#').next())
        .unwrap_or_default()
        .to_string();
    let message = parsed.message.unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string()
    });

    match code.as_str() {
        "NotFoundException" => KmsError::KeyNotFound(message),
        "AccessDeniedException" | "UnrecognizedClientException" | "InvalidSignatureException" => {
            KmsError::AccessDenied(message)
        }
        "InvalidCiphertextException" | "IncorrectKeyException" => {
            KmsError::InvalidCiphertext(message)
        }
        _ if status == StatusCode::FORBIDDEN => KmsError::AccessDenied(message),
        "" => KmsError::Service {
            code: status.as_u16().to_string(),
            message,
        },
        _ => KmsError::Service { code, message },
    }
}

#[async_trait]
impl KeyDecryptor for AwsKmsClient {
    async fn decrypt(&self, request: DecryptRequest) -> Result<Zeroizing<Vec<u8>>, KmsError> {
        let body = serde_json::to_vec(&DecryptBody {
            ciphertext_blob: STANDARD.encode(&request.ciphertext_blob),
            encryption_context: request.encryption_context,
        })
        .map_err(|e| KmsError::Transport(format!("failed to encode request: {e}")))?;

        let headers = self.signed_headers(&body).await?;

        debug!(region = %self.region, endpoint = %self.endpoint, "calling KMS Decrypt");

        let response = send_with_retry(
            &self.http,
            Method::POST,
            &self.endpoint,
            Bytes::from(body),
            &self.retry,
            |builder, _| builder.headers(headers.clone()),
        )
        .await
        .map_err(|e| KmsError::Transport(e.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| KmsError::Transport(e.to_string()))?;

        if !status.is_success() {
            let err = classify_error(status, &bytes);
            debug!(status = status.as_u16(), error = %err, "KMS Decrypt rejected");
            return Err(err);
        }

        let mut parsed: DecryptResponse = serde_json::from_slice(&bytes)
            .map_err(|e| KmsError::MalformedResponse(e.to_string()))?;
        let decoded = STANDARD.decode(parsed.plaintext.as_bytes());
        parsed.plaintext.zeroize();
        let plaintext = decoded
            .map_err(|_| KmsError::MalformedResponse("Plaintext is not valid base64".to_string()))?;

        debug!(key_id = ?parsed.key_id, "KMS Decrypt succeeded");
        Ok(Zeroizing::new(plaintext))
    }
}
