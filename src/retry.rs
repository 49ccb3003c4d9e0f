//! Bounded retries for key service calls.

use std::time::Duration;

use bytes::Bytes;
use rand::Rng;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt. 0 = fail fast.
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub jitter_ms: u64,
    /// Statuses worth another attempt: throttling and server faults.
    pub status_codes: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_backoff_ms: 200,
            max_backoff_ms: 5_000,
            jitter_ms: 100,
            status_codes: vec![429, 500, 502, 503, 504],
        }
    }
}

impl RetryConfig {
    pub fn no_retries() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    fn retries_status(&self, status: StatusCode) -> bool {
        self.status_codes.contains(&status.as_u16())
    }

    /// `base * 2^(attempt-1)` capped at `max_backoff_ms`, plus jitter.
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let delay = self
            .base_backoff_ms
            .saturating_mul(1u64 << exp)
            .min(self.max_backoff_ms);
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        };
        Duration::from_millis(delay + jitter)
    }

    /// Honour a numeric `Retry-After`, but never wait longer than the cap.
    fn wait_after(&self, response: &Response, attempt: u32) -> Duration {
        response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(|secs| Duration::from_secs(secs).min(Duration::from_millis(self.max_backoff_ms)))
            .unwrap_or_else(|| self.backoff(attempt))
    }
}

/// Send `body` to `url`, retrying transport failures and retryable statuses.
///
/// `prepare` runs once per attempt to attach headers to the fresh builder.
/// Once retries run out on a retryable status the
/// last response is handed back for the caller to classify.
pub async fn send_with_retry<F>(
    client: &Client,
    method: Method,
    url: &str,
    body: Bytes,
    config: &RetryConfig,
    mut prepare: F,
) -> Result<Response, reqwest::Error>
where
    F: FnMut(RequestBuilder, &Bytes) -> RequestBuilder,
{
    let attempts = config.max_retries.saturating_add(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let request = prepare(client.request(method.clone(), url), &body).body(body.clone());

        let wait = match request.send().await {
            Ok(response) if !config.retries_status(response.status()) => return Ok(response),
            Ok(response) if attempt >= attempts => {
                debug!(
                    attempts,
                    status = response.status().as_u16(),
                    "retries exhausted"
                );
                return Ok(response);
            }
            Ok(response) => {
                let wait = config.wait_after(&response, attempt);
                warn!(
                    attempt,
                    attempts,
                    status = response.status().as_u16(),
                    wait_ms = wait.as_millis() as u64,
                    "retryable response, backing off"
                );
                wait
            }
            Err(e) if attempt >= attempts => return Err(e),
            Err(e) => {
                let wait = config.backoff(attempt);
                warn!(
                    attempt,
                    attempts,
                    error = %e,
                    wait_ms = wait.as_millis() as u64,
                    "request failed, backing off"
                );
                wait
            }
        };

        sleep(wait).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn quick(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            base_backoff_ms: 10,
            max_backoff_ms: 100,
            jitter_ms: 0,
            ..RetryConfig::default()
        }
    }

    async fn post(server: &MockServer, config: &RetryConfig) -> Response {
        send_with_retry(
            &Client::new(),
            Method::POST,
            &server.uri(),
            Bytes::from_static(b"{}"),
            config,
            |b, _| b,
        )
        .await
        .unwrap()
    }

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let config = quick(3);
        let delays: Vec<u128> = (1..=5).map(|n| config.backoff(n).as_millis()).collect();
        assert_eq!(delays, vec![10, 20, 40, 80, 100]);
        assert_eq!(config.backoff(u32::MAX), Duration::from_millis(100));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let config = RetryConfig {
            jitter_ms: 5,
            ..quick(1)
        };
        for _ in 0..50 {
            let ms = config.backoff(1).as_millis();
            assert!((10..=15).contains(&ms), "{ms}");
        }
    }

    #[tokio::test]
    async fn test_throttled_then_ok() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        assert_eq!(post(&server, &quick(2)).await.status(), 200);
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        assert_eq!(post(&server, &quick(3)).await.status(), 400);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        assert_eq!(post(&server, &quick(2)).await.status(), 503);
    }

    #[tokio::test]
    async fn test_fail_fast_makes_one_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        assert_eq!(post(&server, &RetryConfig::no_retries()).await.status(), 500);
    }

    #[tokio::test]
    async fn test_prepare_runs_every_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let mut prepared = 0;
        let response = send_with_retry(
            &Client::new(),
            Method::POST,
            &server.uri(),
            Bytes::new(),
            &quick(2),
            |b, _| {
                prepared += 1;
                b
            },
        )
        .await
        .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(prepared, 2);
    }
}
