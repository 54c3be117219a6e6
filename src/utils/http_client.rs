use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::errors::{AppResult, ProbeError, ProbeResult};
use crate::utils::url::UrlUtils;

/// Fetches manifest text from an upstream URL
#[async_trait]
pub trait ManifestFetcher: Send + Sync {
    async fn fetch_manifest(&self, url: &str) -> ProbeResult<String>;
}

/// Shared reqwest client with rustls and a connect timeout
pub fn build_client(connect_timeout: Duration) -> AppResult<Client> {
    Ok(Client::builder()
        .connect_timeout(connect_timeout)
        .user_agent(concat!("stream-cleaner/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

pub struct HttpManifestFetcher {
    client: Client,
}

impl HttpManifestFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ManifestFetcher for HttpManifestFetcher {
    async fn fetch_manifest(&self, url: &str) -> ProbeResult<String> {
        let safe_url = UrlUtils::obfuscate_credentials(url);
        debug!("Fetching manifest from: {}", safe_url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProbeError::transport(UrlUtils::obfuscate_credentials(&e.to_string())))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Http {
                status: status.as_u16(),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| ProbeError::transport(format!("failed to read body: {e}")))?;
        debug!("Fetched {} bytes of manifest from {}", text.len(), safe_url);
        Ok(text)
    }
}
