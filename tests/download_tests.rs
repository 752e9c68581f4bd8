//! Download task subsystem tests
//!
//! This module tests, against a scripted fetcher:
//! - The authentication challenge flow: challenge, retry with credentials,
//!   success with the resolved authenticator in the result
//! - The retry bound: persistent challenges end in AuthenticationRequired
//! - Cancellation mid-transfer delivering a terminal Canceled result
//! - Timeout and checksum failures mapping to their error kinds
//! - Proxy resolution being consulted per attempt

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use instack::download::{
    Authenticator, DirectProxyFactory, DownloadManager, DownloadTask, FetchError, Fetcher,
    FileTaskItem, ProxyConfig, ProxyFactory,
};
use instack::error::{ChallengeOrigin, InstackError};
use tokio_util::sync::CancellationToken;

fn manager(fetcher: Arc<dyn Fetcher>, auth_retry_limit: usize) -> DownloadManager {
    DownloadManager::with_parts(fetcher, Arc::new(DirectProxyFactory), 4, auth_retry_limit)
        .unwrap()
}

/// Challenges until credentials are presented, then writes the payload
struct ChallengeUntilAuthenticated {
    attempts: AtomicUsize,
}

#[async_trait]
impl Fetcher for ChallengeUntilAuthenticated {
    async fn fetch(
        &self,
        item: &FileTaskItem,
        authenticator: Option<&Authenticator>,
        _proxy: &ProxyConfig,
        _cancel: &CancellationToken,
    ) -> Result<u64, FetchError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        match authenticator {
            None => Err(FetchError::AuthRequired(ChallengeOrigin::Server)),
            Some(auth) if auth.username == "user" && auth.password == "secret" => {
                std::fs::write(&item.target, b"payload")
                    .map_err(|e| FetchError::Failed(e.to_string()))?;
                Ok(7)
            }
            Some(_) => Err(FetchError::AuthRequired(ChallengeOrigin::Server)),
        }
    }
}

#[test]
fn test_auth_challenge_then_success_with_credentials() {
    let temp = tempfile::TempDir::new().unwrap();
    let fetcher = Arc::new(ChallengeUntilAuthenticated {
        attempts: AtomicUsize::new(0),
    });

    let mut task = DownloadTask::new();
    task.add_item(FileTaskItem::new(
        "https://repo.example/a.zip",
        temp.path().join("a.zip"),
    ));
    task.set_authenticator(Authenticator::new("user", "secret"));

    let results = manager(fetcher.clone(), 1).run(&mut task).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].bytes_transferred, 7);
    // The resolved authenticator is part of the result.
    assert_eq!(
        results[0].used_authenticator,
        Some(Authenticator::new("user", "secret"))
    );
    // One challenged attempt, one authenticated attempt.
    assert_eq!(fetcher.attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn test_auth_challenge_without_credentials_fails_permanently() {
    let temp = tempfile::TempDir::new().unwrap();
    let fetcher = Arc::new(ChallengeUntilAuthenticated {
        attempts: AtomicUsize::new(0),
    });

    let mut task = DownloadTask::new();
    task.add_item(FileTaskItem::new(
        "https://repo.example/a.zip",
        temp.path().join("a.zip"),
    ));

    let result = manager(fetcher, 1).run(&mut task);
    match result {
        Err(InstackError::AuthenticationRequired { origin, url }) => {
            assert_eq!(origin, ChallengeOrigin::Server);
            assert_eq!(url, "https://repo.example/a.zip");
        }
        other => panic!("expected AuthenticationRequired, got {other:?}"),
    }
}

#[test]
fn test_auth_retry_bound_exceeded_with_wrong_credentials() {
    let temp = tempfile::TempDir::new().unwrap();
    let fetcher = Arc::new(ChallengeUntilAuthenticated {
        attempts: AtomicUsize::new(0),
    });

    let mut task = DownloadTask::new();
    task.add_item(FileTaskItem::new(
        "https://repo.example/a.zip",
        temp.path().join("a.zip"),
    ));
    task.set_authenticator(Authenticator::new("user", "wrong"));

    let result = manager(fetcher.clone(), 2).run(&mut task);
    assert!(matches!(
        result,
        Err(InstackError::AuthenticationRequired { .. })
    ));
    // Initial attempt plus the bounded retries.
    assert_eq!(fetcher.attempts.load(Ordering::SeqCst), 3);
}

/// Blocks until canceled, simulating a stalled transfer
struct StallUntilCanceled;

#[async_trait]
impl Fetcher for StallUntilCanceled {
    async fn fetch(
        &self,
        _item: &FileTaskItem,
        _authenticator: Option<&Authenticator>,
        _proxy: &ProxyConfig,
        cancel: &CancellationToken,
    ) -> Result<u64, FetchError> {
        cancel.cancelled().await;
        Err(FetchError::Canceled)
    }
}

#[test]
fn test_cancel_mid_transfer_yields_terminal_canceled() {
    let temp = tempfile::TempDir::new().unwrap();
    let mut task = DownloadTask::new();
    task.add_item(FileTaskItem::new(
        "https://repo.example/a.zip",
        temp.path().join("a.zip"),
    ));

    let cancel = task.cancel_handle();
    let canceler = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        cancel.cancel();
    });

    let started = Instant::now();
    let result = manager(Arc::new(StallUntilCanceled), 1).run(&mut task);
    canceler.join().unwrap();

    assert!(matches!(result, Err(InstackError::Canceled)), "{result:?}");
    // Terminal result, not a hang.
    assert!(started.elapsed() < Duration::from_secs(5));
}

struct AlwaysTimeout;

#[async_trait]
impl Fetcher for AlwaysTimeout {
    async fn fetch(
        &self,
        _item: &FileTaskItem,
        _authenticator: Option<&Authenticator>,
        _proxy: &ProxyConfig,
        _cancel: &CancellationToken,
    ) -> Result<u64, FetchError> {
        Err(FetchError::Timeout)
    }
}

#[test]
fn test_timeout_maps_to_timeout_error() {
    let temp = tempfile::TempDir::new().unwrap();
    let mut task = DownloadTask::new();
    task.add_item(FileTaskItem::new(
        "https://repo.example/slow.zip",
        temp.path().join("slow.zip"),
    ));

    let result = manager(Arc::new(AlwaysTimeout), 1).run(&mut task);
    match result {
        Err(InstackError::Timeout { url }) => {
            assert_eq!(url, "https://repo.example/slow.zip");
        }
        other => panic!("expected Timeout, got {other:?}"),
    }
}

struct WritePayload;

#[async_trait]
impl Fetcher for WritePayload {
    async fn fetch(
        &self,
        item: &FileTaskItem,
        _authenticator: Option<&Authenticator>,
        _proxy: &ProxyConfig,
        _cancel: &CancellationToken,
    ) -> Result<u64, FetchError> {
        std::fs::write(&item.target, b"payload")
            .map_err(|e| FetchError::Failed(e.to_string()))?;
        Ok(7)
    }
}

#[test]
fn test_checksum_mismatch_fails_and_removes_file() {
    let temp = tempfile::TempDir::new().unwrap();
    let target = temp.path().join("a.zip");

    let mut task = DownloadTask::new();
    let mut item = FileTaskItem::new("https://repo.example/a.zip", target.clone());
    item.checksum = Some("blake3:0000000000000000".to_string());
    task.add_item(item);

    let result = manager(Arc::new(WritePayload), 1).run(&mut task);
    assert!(matches!(
        result,
        Err(InstackError::ContentMismatch { .. })
    ));
    assert!(!target.exists());
}

#[test]
fn test_checksum_match_succeeds() {
    let temp = tempfile::TempDir::new().unwrap();
    let target = temp.path().join("a.zip");
    // Hash of the payload the fetcher writes.
    let expected = blake3::hash(b"payload").to_hex().to_string();

    let mut task = DownloadTask::new();
    let mut item = FileTaskItem::new("https://repo.example/a.zip", target.clone());
    item.checksum = Some(expected);
    item.expected_size = Some(7);
    task.add_item(item);

    let results = manager(Arc::new(WritePayload), 1).run(&mut task).unwrap();
    assert_eq!(results.len(), 1);
    assert!(target.exists());
}

/// Counts how often proxy resolution is consulted
struct CountingProxyFactory {
    calls: AtomicUsize,
}

impl ProxyFactory for CountingProxyFactory {
    fn resolve(&self, _url: &str) -> ProxyConfig {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ProxyConfig::default()
    }
}

#[test]
fn test_proxy_factory_consulted_per_attempt() {
    let temp = tempfile::TempDir::new().unwrap();
    let proxy_factory = Arc::new(CountingProxyFactory {
        calls: AtomicUsize::new(0),
    });
    let fetcher = Arc::new(ChallengeUntilAuthenticated {
        attempts: AtomicUsize::new(0),
    });

    let manager = DownloadManager::with_parts(fetcher, proxy_factory.clone(), 4, 1).unwrap();
    let mut task = DownloadTask::new();
    task.add_item(FileTaskItem::new(
        "https://repo.example/a.zip",
        temp.path().join("a.zip"),
    ));
    task.set_authenticator(Authenticator::new("user", "secret"));

    manager.run(&mut task).unwrap();
    // One resolution per connection attempt: challenge plus retry.
    assert_eq!(proxy_factory.calls.load(Ordering::SeqCst), 2);
}
