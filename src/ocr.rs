//! Client for the text recognition (OCR) service.
//!
//! Recoverable failures are retried with exponential backoff: the delay starts at
//! `min_backoff`, doubles after every failed attempt and never exceeds `max_backoff`.
//! Once `max_attempts` requests have failed the last error is returned to the caller.

use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tokio_retry::RetryIf;
use tracing::{debug, warn};
use url::Url;

use crate::config::OcrConfig;
use crate::utils::error::Result;

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("OCR service answered {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("OCR request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl OcrError {
    /// Whether another attempt may succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            OcrError::Status { status, .. } => {
                status.is_server_error()
                    || *status == StatusCode::REQUEST_TIMEOUT
                    || *status == StatusCode::TOO_MANY_REQUESTS
            }
            OcrError::Transport(err) => !err.is_builder() && !err.is_redirect(),
        }
    }
}

/// Backoff delays between attempts.
///
/// Yields one delay per retry, so a budget of `max_attempts` produces `max_attempts - 1`
/// delays before the iterator is exhausted.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    max_delay: Duration,
    retries_left: u32,
}

impl Backoff {
    pub fn new(min_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            current: min_delay.min(max_delay),
            max_delay,
            retries_left: max_attempts.saturating_sub(1),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.retries_left == 0
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.retries_left == 0 {
            return None;
        }
        self.retries_left -= 1;

        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max_delay);
        Some(delay)
    }
}

#[derive(Debug, Serialize)]
struct OcrRequest<'a> {
    image_url: &'a str,
    engine: &'a str,
    engine_args: EngineArgs<'a>,
}

#[derive(Debug, Serialize)]
struct EngineArgs<'a> {
    lang: &'a str,
}

pub struct OcrClient {
    client: Client,
    endpoint: Url,
    config: OcrConfig,
}

impl OcrClient {
    pub fn new(config: OcrConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout))
            .build()?;
        let endpoint = Url::parse(&config.server_url)?.join("ocr")?;

        Ok(Self {
            client,
            endpoint,
            config,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn backoff(&self) -> Backoff {
        Backoff::new(
            self.config.min_backoff(),
            self.config.max_backoff(),
            self.config.max_attempts,
        )
    }

    /// Recognizes the text on the image at `image_url`.
    ///
    /// A successful response with an empty body yields an empty string. Running out of
    /// attempts yields the last error, never an empty string.
    pub async fn recognize_text(&self, image_url: &Url) -> std::result::Result<String, OcrError> {
        let this = self;
        let mut attempt = 0u32;

        let action = move || {
            attempt += 1;
            this.request_once(image_url, attempt)
        };

        let condition = |err: &OcrError| {
            let recoverable = err.is_recoverable();
            if recoverable {
                warn!(image = %image_url, error = %err, "OCR attempt failed, backing off");
            } else {
                warn!(image = %image_url, error = %err, "OCR attempt failed permanently");
            }
            recoverable
        };

        RetryIf::start(self.backoff(), action, condition).await
    }

    async fn request_once(&self, image_url: &Url, attempt: u32) -> std::result::Result<String, OcrError> {
        debug!(image = %image_url, attempt, "sending image to OCR service");

        let body = OcrRequest {
            image_url: image_url.as_str(),
            engine: &self.config.engine,
            engine_args: EngineArgs {
                lang: &self.config.language,
            },
        };

        let result = self.send(&body).await;
        let label = if result.is_ok() { "success" } else { "failure" };
        metrics::counter!("lunchbox_ocr_attempts_total", "result" => label).increment(1);
        result
    }

    async fn send(&self, body: &OcrRequest<'_>) -> std::result::Result<String, OcrError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            Ok(text)
        } else {
            Err(OcrError::Status { status, body: text })
        }
    }
}
