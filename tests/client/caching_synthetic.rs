use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use apiwrap::{ApiClient, CacheEntry, CacheMode, CacheStatus, CacheStore, ClientConfig, RequestOptions};
use futures::future::BoxFuture;
use httpmock::Method::{GET, POST};
use httpmock::MockServer;

fn cached_client(base: &str, key: &str, dir: &Path) -> ApiClient {
    let config = ClientConfig::builder()
        .api_url(base)
        .api_key(key)
        .cache_path(dir)
        .build()
        .unwrap();
    let mut client = ApiClient::new(config);
    client.build(RequestOptions::new()).unwrap();
    client
}

#[tokio::test]
async fn fresh_responses_are_served_from_cache() {
    let server = MockServer::start();
    let dir = tempfile::tempdir().unwrap();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/items");
        then.status(200)
            .header("cache-control", "max-age=60")
            .body(r#"{"items":[1,2]}"#);
    });

    let client = cached_client(&server.base_url(), "test", dir.path());
    assert!(client.cache_enabled());

    let first = client.get("items", RequestOptions::new()).await.unwrap();
    assert_eq!(first.cache_status(), CacheStatus::Miss);

    let second = client.get("items", RequestOptions::new()).await.unwrap();
    assert_eq!(second.cache_status(), CacheStatus::Hit);
    assert_eq!(second.raw(), first.raw());
    assert_eq!(second.headers()["cache-control"], "max-age=60");
    mock.assert_calls(1);
}

#[tokio::test]
async fn refresh_mode_goes_to_the_network_and_rewrites() {
    let server = MockServer::start();
    let dir = tempfile::tempdir().unwrap();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/items");
        then.status(200).header("cache-control", "max-age=60").body("[]");
    });

    let client = cached_client(&server.base_url(), "test", dir.path());
    client.get("items", RequestOptions::new()).await.unwrap();
    let refreshed = client
        .get("items", RequestOptions::new().cache_mode(CacheMode::Refresh))
        .await
        .unwrap();
    assert_eq!(refreshed.cache_status(), CacheStatus::Miss);
    mock.assert_calls(2);

    let hit = client.get("items", RequestOptions::new()).await.unwrap();
    assert_eq!(hit.cache_status(), CacheStatus::Hit);
    mock.assert_calls(2);
}

#[tokio::test]
async fn bypass_and_request_no_store_skip_the_cache() {
    let server = MockServer::start();
    let dir = tempfile::tempdir().unwrap();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/items");
        then.status(200).header("cache-control", "max-age=60").body("[]");
    });

    let client = cached_client(&server.base_url(), "test", dir.path());
    let resp = client
        .get("items", RequestOptions::new().cache_mode(CacheMode::Bypass))
        .await
        .unwrap();
    assert_eq!(resp.cache_status(), CacheStatus::Bypass);
    client
        .get("items", RequestOptions::new().header("Cache-Control", "no-store"))
        .await
        .unwrap();
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

    client.get("items", RequestOptions::new()).await.unwrap();
    mock.assert_calls(3);
}

#[tokio::test]
async fn responses_without_freshness_are_not_cached() {
    let server = MockServer::start();
    let dir = tempfile::tempdir().unwrap();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/live");
        then.status(200).body("{}");
    });

    let client = cached_client(&server.base_url(), "test", dir.path());
    client.get("live", RequestOptions::new()).await.unwrap();
    client.get("live", RequestOptions::new()).await.unwrap();
    mock.assert_calls(2);
}

#[tokio::test]
async fn no_store_responses_are_not_cached() {
    let server = MockServer::start();
    let dir = tempfile::tempdir().unwrap();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/private");
        then.status(200).header("cache-control", "no-store, max-age=60").body("{}");
    });

    let client = cached_client(&server.base_url(), "test", dir.path());
    client.get("private", RequestOptions::new()).await.unwrap();
    client.get("private", RequestOptions::new()).await.unwrap();
    mock.assert_calls(2);
}

#[tokio::test]
async fn post_is_never_cached() {
    let server = MockServer::start();
    let dir = tempfile::tempdir().unwrap();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/items");
        then.status(200).header("cache-control", "max-age=60").body("{}");
    });

    let client = cached_client(&server.base_url(), "test", dir.path());
    let resp = client.post("items", RequestOptions::new()).await.unwrap();
    assert_eq!(resp.cache_status(), CacheStatus::Bypass);
    client.post("items", RequestOptions::new()).await.unwrap();
    mock.assert_calls(2);
}

#[tokio::test]
async fn error_statuses_are_not_cached() {
    let server = MockServer::start();
    let dir = tempfile::tempdir().unwrap();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/down");
        then.status(503).header("cache-control", "max-age=60");
    });

    let client = cached_client(&server.base_url(), "test", dir.path());
    assert!(client.get("down", RequestOptions::new()).await.is_err());
    assert!(client.get("down", RequestOptions::new()).await.is_err());
    mock.assert_calls(2);
}

#[tokio::test]
async fn public_responses_are_shared_between_keys() {
    let server = MockServer::start();
    let dir = tempfile::tempdir().unwrap();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/catalog");
        then.status(200).header("cache-control", "public, max-age=60").body("[]");
    });

    let alice = cached_client(&server.base_url(), "key-a", dir.path());
    let bob = cached_client(&server.base_url(), "key-b", dir.path());

    alice.get("catalog", RequestOptions::new()).await.unwrap();
    let resp = bob.get("catalog", RequestOptions::new()).await.unwrap();
    assert_eq!(resp.cache_status(), CacheStatus::Hit);
    mock.assert_calls(1);
}

#[tokio::test]
async fn private_responses_are_partitioned_by_key() {
    let server = MockServer::start();
    let dir = tempfile::tempdir().unwrap();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/me");
        then.status(200).header("cache-control", "private, max-age=60").body("{}");
    });

    let alice = cached_client(&server.base_url(), "key-a", dir.path());
    let bob = cached_client(&server.base_url(), "key-b", dir.path());

    alice.get("me", RequestOptions::new()).await.unwrap();
    let resp = bob.get("me", RequestOptions::new()).await.unwrap();
    assert_eq!(resp.cache_status(), CacheStatus::Miss);
    mock.assert_calls(2);

    let again = alice.get("me", RequestOptions::new()).await.unwrap();
    assert_eq!(again.cache_status(), CacheStatus::Hit);
    mock.assert_calls(2);
}

#[tokio::test]
async fn cache_files_never_contain_the_api_key() {
    let server = MockServer::start();
    let dir = tempfile::tempdir().unwrap();
    server.mock(|when, then| {
        when.method(GET).path("/items");
        then.status(200).header("cache-control", "max-age=60").body("{}");
    });

    let client = cached_client(&server.base_url(), "very-secret-key", dir.path());
    client.get("items", RequestOptions::new()).await.unwrap();

    let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(entries.len(), 1);
    for entry in entries {
        let path = entry.unwrap().path();
        assert!(!path.to_string_lossy().contains("very-secret-key"));
        assert!(!std::fs::read_to_string(&path).unwrap().contains("very-secret-key"));
    }
}

/// A store whose every operation fails.
#[derive(Debug, Default)]
struct FailingStore {
    gets: AtomicUsize,
    puts: AtomicUsize,
}

impl CacheStore for FailingStore {
    fn get<'a>(&'a self, _key: &'a str) -> BoxFuture<'a, io::Result<Option<CacheEntry>>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Err(io::Error::other("disk on fire")) })
    }

    fn put<'a>(&'a self, _key: &'a str, _entry: CacheEntry, _ttl: Duration) -> BoxFuture<'a, io::Result<()>> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Err(io::Error::other("disk on fire")) })
    }
}

#[tokio::test]
async fn failing_store_falls_back_to_the_network() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/items");
        then.status(200).header("cache-control", "max-age=60").body("[1]");
    });

    let store = Arc::new(FailingStore::default());
    let mut client = ApiClient::new(crate::common::config(&server.base_url())).with_cache_store(store.clone());
    client.build(RequestOptions::new()).unwrap();

    for _ in 0..2 {
        let resp = client.get("items", RequestOptions::new()).await.unwrap();
        assert_eq!(resp.cache_status(), CacheStatus::Miss);
        assert_eq!(resp.raw(), b"[1]");
    }
    mock.assert_calls(2);
    assert!(store.gets.load(Ordering::SeqCst) >= 2);
    assert_eq!(store.puts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn corrupt_cache_files_are_treated_as_misses() {
    let server = MockServer::start();
    let dir = tempfile::tempdir().unwrap();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/items");
        then.status(200).header("cache-control", "max-age=60").body("[]");
    });

    let client = cached_client(&server.base_url(), "test", dir.path());
    client.get("items", RequestOptions::new()).await.unwrap();
    for entry in std::fs::read_dir(dir.path()).unwrap() {
        std::fs::write(entry.unwrap().path(), b"{ not json").unwrap();
    }

    let resp = client.get("items", RequestOptions::new()).await.unwrap();
    assert_eq!(resp.cache_status(), CacheStatus::Miss);
    mock.assert_calls(2);

    // the live response replaced the broken entry
    let hit = client.get("items", RequestOptions::new()).await.unwrap();
    assert_eq!(hit.cache_status(), CacheStatus::Hit);
    mock.assert_calls(2);
}

#[tokio::test]
async fn enormous_max_age_is_cached_without_panicking() {
    let server = MockServer::start();
    let dir = tempfile::tempdir().unwrap();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/items");
        then.status(200).header("cache-control", "max-age=10000000000000").body("[]");
    });

    let client = cached_client(&server.base_url(), "test", dir.path());
    let first = client.get("items", RequestOptions::new()).await.unwrap();
    assert_eq!(first.cache_status(), CacheStatus::Miss);
    let second = client.get("items", RequestOptions::new()).await.unwrap();
    assert_eq!(second.cache_status(), CacheStatus::Hit);
    mock.assert_calls(1);
}
