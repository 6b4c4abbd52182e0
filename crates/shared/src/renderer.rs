use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// Turns a source identifier into a rendered HTML document
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str) -> Result<String>;
}

const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF_MS: u64 = 500;
const MIN_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(1);

/// Per-request timeout such that every attempt plus the backoff sleeps
/// fit inside `page_timeout`
pub fn attempt_timeout(page_timeout: Duration) -> Duration {
    let backoff: u64 = (0..MAX_ATTEMPTS - 1)
        .map(|n| BASE_BACKOFF_MS * 2_u64.pow(n))
        .sum();
    page_timeout
        .saturating_sub(Duration::from_millis(backoff))
        .checked_div(MAX_ATTEMPTS)
        .unwrap_or(MIN_ATTEMPT_TIMEOUT)
        .max(MIN_ATTEMPT_TIMEOUT)
}

/// Renderer that fetches server-side HTML over plain HTTP
pub struct HttpRenderer {
    client: Client,
}

impl HttpRenderer {
    /// `page_timeout` bounds the whole render, retries included
    pub fn new(page_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(attempt_timeout(page_timeout))
            .user_agent("Mozilla/5.0 (compatible; JobSync/1.0)")
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    async fn try_fetch(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send HTTP request")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("HTTP error: {}", status);
        }

        response.text().await.context("Failed to read response body")
    }
}

#[async_trait]
impl PageRenderer for HttpRenderer {
    async fn render(&self, url: &str) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.try_fetch(url).await {
                Ok(html) => {
                    debug!(url, bytes = html.len(), "rendered page");
                    return Ok(html);
                }
                Err(e) if attempt + 1 < MAX_ATTEMPTS => {
                    let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2_u64.pow(attempt));
                    warn!(
                        url,
                        attempt = attempt + 1,
                        "fetch failed, retrying in {:?}: {:#}",
                        backoff,
                        e
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_attempts_fit_inside_page_timeout() {
        let page_timeout = Duration::from_secs(30);
        let per_attempt = attempt_timeout(page_timeout);
        let backoff = Duration::from_millis(500 + 1000);
        assert!(per_attempt * MAX_ATTEMPTS + backoff <= page_timeout);
        assert_eq!(per_attempt, Duration::from_millis(9500));
    }

    #[test]
    fn test_attempt_timeout_has_a_floor() {
        assert_eq!(attempt_timeout(Duration::from_millis(500)), MIN_ATTEMPT_TIMEOUT);
    }
}
