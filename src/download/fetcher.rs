//! Fetching a single remote item
//!
//! The [`Fetcher`] trait is the seam between the task machinery and the
//! network: production uses [`HttpFetcher`] over reqwest, tests substitute a
//! scripted fetcher. Proxy resolution is delegated per attempt to an
//! injected [`ProxyFactory`].

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::error::ChallengeOrigin;

use super::FileTaskItem;
use super::repository::Authenticator;

/// Proxy configuration for one connection attempt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Proxy URL, or `None` for a direct connection
    pub url: Option<String>,
}

/// Resolves the proxy to use for a given URL, consulted per attempt
pub trait ProxyFactory: Send + Sync {
    fn resolve(&self, url: &str) -> ProxyConfig;
}

/// Direct connections for every URL
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectProxyFactory;

impl ProxyFactory for DirectProxyFactory {
    fn resolve(&self, _url: &str) -> ProxyConfig {
        ProxyConfig::default()
    }
}

/// Non-terminal and terminal outcomes of one fetch attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// 401/407-style challenge; the task layer may retry with credentials
    AuthRequired(ChallengeOrigin),
    Timeout,
    Canceled,
    Failed(String),
}

/// Fetches one item to its target path, reporting bytes transferred
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(
        &self,
        item: &FileTaskItem,
        authenticator: Option<&Authenticator>,
        proxy: &ProxyConfig,
        cancel: &CancellationToken,
    ) -> Result<u64, FetchError>;
}

/// HTTP fetcher backed by reqwest with streaming writes
pub struct HttpFetcher {
    attempt_timeout: Duration,
}

impl HttpFetcher {
    pub fn new(attempt_timeout: Duration) -> Self {
        Self { attempt_timeout }
    }

    fn build_client(&self, proxy: &ProxyConfig) -> Result<reqwest::Client, FetchError> {
        let mut builder = reqwest::Client::builder();
        if let Some(proxy_url) = &proxy.url {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| FetchError::Failed(format!("invalid proxy: {}", e)))?;
            builder = builder.proxy(proxy);
        }
        builder
            .build()
            .map_err(|e| FetchError::Failed(e.to_string()))
    }

    async fn stream_to_file(
        response: reqwest::Response,
        target: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64, FetchError> {
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FetchError::Failed(e.to_string()))?;
        }
        let mut file = tokio::fs::File::create(target)
            .await
            .map_err(|e| FetchError::Failed(e.to_string()))?;

        let mut stream = response.bytes_stream();
        let mut bytes_transferred = 0u64;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(FetchError::Canceled),
                chunk = stream.next() => match chunk {
                    None => break,
                    Some(Err(e)) => return Err(FetchError::Failed(e.to_string())),
                    Some(Ok(bytes)) => {
                        file.write_all(&bytes)
                            .await
                            .map_err(|e| FetchError::Failed(e.to_string()))?;
                        bytes_transferred += bytes.len() as u64;
                    }
                },
            }
        }
        file.flush()
            .await
            .map_err(|e| FetchError::Failed(e.to_string()))?;
        Ok(bytes_transferred)
    }

    async fn fetch_inner(
        &self,
        item: &FileTaskItem,
        authenticator: Option<&Authenticator>,
        proxy: &ProxyConfig,
        cancel: &CancellationToken,
    ) -> Result<u64, FetchError> {
        let client = self.build_client(proxy)?;

        let mut request = client.get(&item.source);
        if let Some(auth) = authenticator {
            request = request.basic_auth(&auth.username, Some(&auth.password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Failed(e.to_string()))?;

        match response.status() {
            reqwest::StatusCode::UNAUTHORIZED => {
                return Err(FetchError::AuthRequired(ChallengeOrigin::Server));
            }
            reqwest::StatusCode::PROXY_AUTHENTICATION_REQUIRED => {
                return Err(FetchError::AuthRequired(ChallengeOrigin::Proxy));
            }
            status if !status.is_success() => {
                return Err(FetchError::Failed(format!("HTTP status {}", status)));
            }
            _ => {}
        }

        Self::stream_to_file(response, &item.target, cancel).await
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        item: &FileTaskItem,
        authenticator: Option<&Authenticator>,
        proxy: &ProxyConfig,
        cancel: &CancellationToken,
    ) -> Result<u64, FetchError> {
        match tokio::time::timeout(
            self.attempt_timeout,
            self.fetch_inner(item, authenticator, proxy, cancel),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_proxy_factory() {
        let factory = DirectProxyFactory;
        assert_eq!(
            factory.resolve("https://repo.example/a.zip"),
            ProxyConfig { url: None }
        );
    }

    #[test]
    fn test_invalid_proxy_url_rejected() {
        let fetcher = HttpFetcher::new(Duration::from_secs(5));
        let result = fetcher.build_client(&ProxyConfig {
            url: Some("not a url".to_string()),
        });
        assert!(matches!(result, Err(FetchError::Failed(_))));
    }
}
