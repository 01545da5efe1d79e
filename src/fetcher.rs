use async_trait::async_trait;
use reqwest::Client;

use crate::Result;
use crate::config::FetcherConfig;

/// Seam for retrieving raw page content, so tracker cycles can be driven
/// against canned pages in tests.
#[async_trait]
pub trait PageFetch: Send + Sync {
    /// Issue a single GET for `url` and return the response body on a
    /// 2xx status. One attempt only; the next poll retries on its own.
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// HTTP page fetcher with a fixed browser identity header, configured at
/// construction rather than shared process-wide.
pub struct HttpPageFetcher {
    client: Client,
}

impl HttpPageFetcher {
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(HttpPageFetcher { client })
    }
}

#[async_trait]
impl PageFetch for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        let response = response.error_for_status()?;
        let body = response.text().await?;
        Ok(body)
    }
}
