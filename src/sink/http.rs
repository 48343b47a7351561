//! HTTP sheet sink.
//!
//! Sends the whole table to a sheet endpoint in one `PUT` request with
//! `"mode": "replace"`. Transport failures and 5xx answers are retried with
//! a linear backoff; 4xx answers are final.

use super::SinkWriter;
use crate::error::SinkError;
use crate::models::{OutputTable, SinkTarget};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Body of a replace request.
#[derive(Debug, Serialize)]
struct ReplaceRequest<'a> {
    spreadsheet: &'a str,
    sheet: &'a str,
    mode: &'static str,
    header: &'a [String],
    rows: &'a [Vec<String>],
}

/// Pushes tables to an HTTP endpoint.
pub struct HttpSink {
    client: reqwest::Client,
    url: String,
    retries: usize,
    backoff: Duration,
}

impl HttpSink {
    /// Create a sink for `url` with a per-request timeout.
    pub fn new(url: &str, timeout_seconds: u64, retries: usize) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|source| SinkError::Http {
                url: url.to_string(),
                source,
            })?;

        Ok(Self {
            client,
            url: url.to_string(),
            retries,
            backoff: Duration::from_secs(2),
        })
    }

    /// Override the delay unit between retries.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    async fn send(&self, request: &ReplaceRequest<'_>) -> Result<(), SinkError> {
        let response = self
            .client
            .put(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|source| SinkError::Http {
                url: self.url.clone(),
                source,
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(SinkError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

fn is_retryable(error: &SinkError) -> bool {
    match error {
        SinkError::Http { .. } => true,
        SinkError::Rejected { status, .. } => *status >= 500,
        _ => false,
    }
}

#[async_trait]
impl SinkWriter for HttpSink {
    fn describe(&self) -> String {
        format!("HTTP endpoint {}", self.url)
    }

    async fn replace(&self, target: &SinkTarget, table: &OutputTable) -> Result<(), SinkError> {
        let request = ReplaceRequest {
            spreadsheet: &target.spreadsheet,
            sheet: &target.sheet,
            mode: "replace",
            header: &table.header,
            rows: &table.rows,
        };

        let mut attempt = 0;
        loop {
            debug!("PUT {} (attempt {})", self.url, attempt + 1);
            match self.send(&request).await {
                Ok(()) => {
                    info!("Replaced {} with {} rows via {}", target, table.len(), self.url);
                    return Ok(());
                }
                Err(e) if attempt < self.retries && is_retryable(&e) => {
                    attempt += 1;
                    warn!("Sink write failed ({}), retry {}/{}", e, attempt, self.retries);
                    tokio::time::sleep(self.backoff * attempt as u32).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
