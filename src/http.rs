//! HTTP adapters for the backend contracts.
//!
//! [`HttpBackend`] implements [`ListApi`] against a REST list service and
//! [`AnalyticsSink`] against its trip-completion endpoint. List mutations
//! retry transient failures with exponential backoff; analytics posts are
//! fire-and-forget and never retried.

use std::time::Duration;

use log::{debug, warn};
use reqwest::{Client, RequestBuilder, StatusCode};

use crate::backend::{AnalyticsSink, ItemPatch, ListApi, TripReport};
use crate::error::{Result, TripError};

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const POOL_MAX_IDLE: usize = 4;

/// REST adapter for the list backend and the analytics endpoint.
///
/// Endpoints:
/// - `PATCH {base}/items/{id}` partial item update
/// - `DELETE {base}/items/{id}` item removal
/// - `POST {base}/trips/complete` trip report
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(POOL_MAX_IDLE)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TripError::backend(format!("build HTTP client: {}", e), None))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn item_url(&self, item_id: i64) -> String {
        format!("{}/items/{}", self.base_url, item_id)
    }

    /// Send a request, retrying 429s, 5xxs, and transport errors with
    /// exponential backoff.
    async fn send_with_retry(
        &self,
        what: &str,
        build: impl Fn() -> RequestBuilder,
    ) -> Result<()> {
        let mut backoff_ms = INITIAL_BACKOFF_MS;
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                debug!(
                    "[Http] Retrying {} (attempt {}/{}) after {}ms",
                    what, attempt, MAX_RETRIES, backoff_ms
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms *= 2;
            }

            match build().send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(());
                    }
                    let retryable =
                        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
                    let err = TripError::backend(
                        format!("{} returned {}", what, status),
                        Some(status.as_u16()),
                    );
                    if !retryable {
                        return Err(err);
                    }
                    last_error = Some(err);
                }
                Err(e) => {
                    last_error = Some(TripError::backend(format!("{}: {}", what, e), None));
                }
            }
        }

        let err = last_error
            .unwrap_or_else(|| TripError::backend(format!("{} failed", what), None));
        warn!("[Http] {} exhausted retries: {}", what, err);
        Err(err)
    }
}

impl ListApi for HttpBackend {
    async fn update_item(&self, item_id: i64, patch: ItemPatch) -> Result<()> {
        let url = self.item_url(item_id);
        self.send_with_retry(&format!("PATCH item {}", item_id), || {
            self.client.patch(&url).json(&patch)
        })
        .await
    }

    async fn delete_item(&self, item_id: i64) -> Result<()> {
        let url = self.item_url(item_id);
        self.send_with_retry(&format!("DELETE item {}", item_id), || {
            self.client.delete(&url)
        })
        .await
    }
}

impl AnalyticsSink for HttpBackend {
    async fn trip_complete(&self, report: TripReport) -> Result<()> {
        let url = format!("{}/trips/complete", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&report)
            .send()
            .await
            .map_err(|e| TripError::backend(format!("POST trip report: {}", e), None))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(TripError::backend(
                format!("POST trip report returned {}", status),
                Some(status.as_u16()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_normalization() {
        let backend = HttpBackend::new("https://api.example.com/v1/").unwrap();
        assert_eq!(backend.item_url(7), "https://api.example.com/v1/items/7");
    }
}
