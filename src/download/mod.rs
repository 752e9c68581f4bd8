//! Concurrent download-task subsystem
//!
//! A [`DownloadTask`] is one logical fetch of one or more remote items to
//! local paths. Tasks run exactly once, complete as a whole (per task, not
//! per item) and always deliver a terminal outcome: success, a terminal
//! error, or `Canceled` — never a silent drop.
//!
//! Items within a task are fetched concurrently over a bounded worker pool.
//! Authentication challenges are retried with the supplied credentials up to
//! a configured bound before failing permanently with
//! `AuthenticationRequired`. Downloads are verified against expected size
//! and checksum before being reported as fetched; on any task failure the
//! partially-downloaded targets are deleted before the error is returned.

pub mod fetcher;
pub mod repository;
pub mod verify;

pub use fetcher::{DirectProxyFactory, FetchError, Fetcher, HttpFetcher, ProxyConfig, ProxyFactory};
pub use repository::{Authenticator, Repository, RepositoryCategory};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::{
    InstackError, Result, authentication_required, download_failed, download_timed_out, io_error,
};

/// One source-to-destination pair within a task
#[derive(Debug, Clone)]
pub struct FileTaskItem {
    pub source: String,
    pub target: PathBuf,
    pub expected_size: Option<u64>,
    pub checksum: Option<String>,
}

impl FileTaskItem {
    pub fn new(source: impl Into<String>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            expected_size: None,
            checksum: None,
        }
    }
}

/// Per-item completion record within a successful task
#[derive(Debug, Clone)]
pub struct FileTaskResult {
    pub source: String,
    pub target: PathBuf,
    pub bytes_transferred: u64,
    /// Credentials actually used, which may differ from the supplied ones
    /// after an authentication challenge round
    pub used_authenticator: Option<Authenticator>,
}

/// One logical fetch of one or more remote items
///
/// Items are added before the task starts; a task runs exactly once and is
/// disposable afterward.
#[derive(Debug)]
pub struct DownloadTask {
    items: Vec<FileTaskItem>,
    authenticator: Option<Authenticator>,
    cancel: CancellationToken,
    started: bool,
}

impl DownloadTask {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            authenticator: None,
            cancel: CancellationToken::new(),
            started: false,
        }
    }

    pub fn add_item(&mut self, item: FileTaskItem) {
        self.items.push(item);
    }

    pub fn add_items(&mut self, items: impl IntoIterator<Item = FileTaskItem>) {
        self.items.extend(items);
    }

    pub fn set_authenticator(&mut self, authenticator: Authenticator) {
        self.authenticator = Some(authenticator);
    }

    pub fn items(&self) -> &[FileTaskItem] {
        &self.items
    }

    /// Cooperative cancellation handle; cancelling a running task still
    /// produces a terminal `Canceled` outcome
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Tie this task's cancellation to a parent token, so cancelling the
    /// whole run also stops in-flight downloads
    pub fn link_cancel(&mut self, parent: &CancellationToken) {
        self.cancel = parent.child_token();
    }
}

impl Default for DownloadTask {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs download tasks over a bounded worker pool
///
/// Owns its tokio runtime so the rest of the engine can stay synchronous;
/// `run` blocks until the task reaches a terminal outcome.
pub struct DownloadManager {
    runtime: tokio::runtime::Runtime,
    fetcher: Arc<dyn Fetcher>,
    proxy_factory: Arc<dyn ProxyFactory>,
    pool: Arc<Semaphore>,
    auth_retry_limit: usize,
}

impl DownloadManager {
    /// Production manager with an HTTP fetcher and direct connections
    pub fn new(
        pool_size: usize,
        attempt_timeout: Duration,
        auth_retry_limit: usize,
    ) -> Result<Self> {
        Self::with_parts(
            Arc::new(HttpFetcher::new(attempt_timeout)),
            Arc::new(DirectProxyFactory),
            pool_size,
            auth_retry_limit,
        )
    }

    /// Manager with injected collaborators (custom fetcher, proxy factory)
    pub fn with_parts(
        fetcher: Arc<dyn Fetcher>,
        proxy_factory: Arc<dyn ProxyFactory>,
        pool_size: usize,
        auth_retry_limit: usize,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| io_error(e.to_string()))?;
        Ok(Self {
            runtime,
            fetcher,
            proxy_factory,
            pool: Arc::new(Semaphore::new(pool_size.max(1))),
            auth_retry_limit,
        })
    }

    /// The configured bound on credentialed retries after an
    /// authentication challenge
    pub fn auth_retry_limit(&self) -> usize {
        self.auth_retry_limit
    }

    /// Run a task to its terminal outcome
    ///
    /// The first item failure cancels the remaining items, partial targets
    /// are deleted, and that failure becomes the task outcome.
    pub fn run(&self, task: &mut DownloadTask) -> Result<Vec<FileTaskResult>> {
        if task.started {
            return Err(download_failed(
                task.items
                    .first()
                    .map(|i| i.source.clone())
                    .unwrap_or_default(),
                "download task already started",
            ));
        }
        task.started = true;

        let items = task.items.clone();
        let supplied = task.authenticator.clone();
        let cancel = task.cancel.clone();

        let outcome = self.runtime.block_on(run_items(
            items.clone(),
            supplied,
            cancel,
            Arc::clone(&self.fetcher),
            Arc::clone(&self.proxy_factory),
            Arc::clone(&self.pool),
            self.auth_retry_limit,
        ));

        if let Err(e) = &outcome {
            tracing::warn!(error = %e, "download task failed, removing partial downloads");
            for item in &items {
                if item.target.exists() {
                    let _ = std::fs::remove_file(&item.target);
                }
            }
        }
        outcome
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_items(
    items: Vec<FileTaskItem>,
    supplied: Option<Authenticator>,
    cancel: CancellationToken,
    fetcher: Arc<dyn Fetcher>,
    proxy_factory: Arc<dyn ProxyFactory>,
    pool: Arc<Semaphore>,
    auth_retry_limit: usize,
) -> Result<Vec<FileTaskResult>> {
    let mut join_set = JoinSet::new();
    for item in items {
        let supplied = supplied.clone();
        let cancel = cancel.clone();
        let fetcher = Arc::clone(&fetcher);
        let proxy_factory = Arc::clone(&proxy_factory);
        let pool = Arc::clone(&pool);
        join_set.spawn(async move {
            let _permit = pool
                .acquire_owned()
                .await
                .map_err(|_| InstackError::Canceled)?;
            fetch_item(
                item,
                supplied,
                cancel,
                fetcher,
                proxy_factory,
                auth_retry_limit,
            )
            .await
        });
    }

    let mut results = Vec::new();
    let mut first_error: Option<InstackError> = None;
    while let Some(joined) = join_set.join_next().await {
        let outcome = joined.unwrap_or_else(|e| Err(io_error(e.to_string())));
        match outcome {
            Ok(result) => results.push(result),
            Err(e) => {
                if first_error.is_none() {
                    // Stop the siblings; they will still report Canceled.
                    cancel.cancel();
                    first_error = Some(e);
                }
            }
        }
    }

    match first_error {
        None => Ok(results),
        Some(e) => Err(e),
    }
}

async fn fetch_item(
    item: FileTaskItem,
    supplied: Option<Authenticator>,
    cancel: CancellationToken,
    fetcher: Arc<dyn Fetcher>,
    proxy_factory: Arc<dyn ProxyFactory>,
    auth_retry_limit: usize,
) -> Result<FileTaskResult> {
    let mut authenticator: Option<Authenticator> = None;
    let mut auth_attempts = 0usize;

    loop {
        if cancel.is_cancelled() {
            return Err(InstackError::Canceled);
        }

        // Proxy resolution is consulted per connection attempt.
        let proxy = proxy_factory.resolve(&item.source);

        match fetcher
            .fetch(&item, authenticator.as_ref(), &proxy, &cancel)
            .await
        {
            Ok(bytes_transferred) => {
                let to_verify = item.clone();
                tokio::task::spawn_blocking(move || verify::verify_item(&to_verify))
                    .await
                    .map_err(|e| io_error(e.to_string()))??;
                return Ok(FileTaskResult {
                    source: item.source.clone(),
                    target: item.target.clone(),
                    bytes_transferred,
                    used_authenticator: authenticator,
                });
            }
            Err(FetchError::AuthRequired(origin)) => {
                auth_attempts += 1;
                if supplied.is_some() && auth_attempts <= auth_retry_limit {
                    tracing::debug!(
                        url = %item.source,
                        %origin,
                        attempt = auth_attempts,
                        "authentication challenge, retrying with credentials"
                    );
                    authenticator = supplied.clone();
                    continue;
                }
                return Err(authentication_required(origin, &item.source));
            }
            Err(FetchError::Timeout) => return Err(download_timed_out(&item.source)),
            Err(FetchError::Canceled) => return Err(InstackError::Canceled),
            Err(FetchError::Failed(reason)) => {
                return Err(download_failed(&item.source, reason));
            }
        }
    }
}
