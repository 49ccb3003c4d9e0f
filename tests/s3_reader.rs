//! BucketReader against a wiremock S3-compatible endpoint, plus one
//! end-to-end resolve with S3 and KMS served by the same mock.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::json;
use tokio::io::AsyncReadExt;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bucket_credentials::auth;
use bucket_credentials::config::{AwsCredentials, Settings};
use bucket_credentials::errors::StoreError;
use bucket_credentials::retry::RetryConfig;
use bucket_credentials::store::{BucketReader, ObjectStoreReader, StoreBackend};
use bucket_credentials::{BucketCredential, CredentialParams, CredentialRecord, Region};

const LAST_MODIFIED: &str = "Tue, 15 Oct 2024 08:30:00 GMT";

fn object(body: &'static str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("ETag", "\"3858f62230ac3c915f300c664312c11f\"")
        .insert_header("Last-Modified", LAST_MODIFIED)
        .set_body_string(body)
}

fn credentials() -> AwsCredentials {
    AwsCredentials::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY")
}

fn reader(server: &MockServer) -> BucketReader {
    BucketReader::new(StoreBackend::S3 {
        region: Region::UsEast1,
        endpoint: Some(server.uri()),
        credentials: auth::static_provider(&credentials()).unwrap(),
        connect_timeout: Duration::from_secs(2),
        request_timeout: Duration::from_secs(5),
    })
}

#[tokio::test]
async fn test_fetches_object_path_style() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/creds-bucket/svc/api-key.enc"))
        .respond_with(object("AQICAHh\nRpXw==\n"))
        .expect(1)
        .mount(&server)
        .await;

    let mut body = reader(&server)
        .fetch("creds-bucket", "svc/api-key.enc")
        .await
        .unwrap();
    let mut contents = String::new();
    body.reader_mut().read_to_string(&mut contents).await.unwrap();
    body.close().unwrap();

    assert_eq!(contents, "AQICAHh\nRpXw==\n");
}

#[tokio::test]
async fn test_missing_object_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string(
            "<Error><Code>NoSuchKey</Code><Message>The specified key does not exist.</Message></Error>",
        ))
        .mount(&server)
        .await;

    let err = reader(&server)
        .fetch("creds-bucket", "svc/missing.enc")
        .await
        .err()
        .unwrap();

    assert!(matches!(
        err,
        StoreError::NotFound { ref bucket, ref path } if bucket == "creds-bucket" && path == "svc/missing.enc"
    ));
}

#[tokio::test]
async fn test_end_to_end_resolve() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/creds-bucket/svc/api-key.enc"))
        .respond_with(object("AQICAHh\r\nRpXw==\r\n"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/"))
        .and(header("x-amz-target", "TrentService.Decrypt"))
        .and(body_partial_json(json!({
            "CiphertextBlob": STANDARD.encode(b"AQICAHhRpXw=="),
            "EncryptionContext": { "app": "billing" },
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Plaintext": STANDARD.encode(b"hunter2"),
        })))
        .expect(1)
        .mount(&server)
        .await;

    let settings = Settings {
        s3_endpoint: Some(server.uri()),
        kms_endpoint: Some(server.uri()),
        kms_retry: RetryConfig {
            max_retries: 0,
            ..RetryConfig::default()
        },
        credentials: Some(credentials()),
        ..Settings::default()
    };
    let record = CredentialRecord::new(CredentialParams {
        scope: Some("GLOBAL".into()),
        region: Some("us-east-1".into()),
        bucket_name: Some("creds-bucket".into()),
        bucket_path: Some("svc/api-key.enc".into()),
        username: Some("svc".into()),
        kms_encryption_context_key: Some("app".into()),
        kms_secret_name: Some("billing".into()),
        ..Default::default()
    })
    .unwrap();

    let credential = BucketCredential::connect(record, &settings).unwrap();
    let password = credential.password().await.unwrap();

    assert_eq!(password.expose_secret(), "hunter2");
    assert_eq!(password.to_string(), "[REDACTED]");
}
