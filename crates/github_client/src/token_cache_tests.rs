use super::*;
use pretty_assertions::assert_eq;
use secrecy::ExposeSecret;

fn secret(s: &str) -> SecretString {
    SecretString::new(s.to_string())
}

#[test]
fn test_cache_key_format() {
    assert_eq!(cache_key(12345, 678), "app_12345_inst_678");
    assert_eq!(cache_key(1, 0), "app_1_inst_0");
}

#[tokio::test]
async fn test_set_and_get() {
    let cache = TokenCache::new();
    cache
        .set("app_1_inst_2", secret("tok"), std::time::Duration::from_secs(60))
        .await;

    let entry = cache.get("app_1_inst_2").await.unwrap();
    assert_eq!(entry.token.expose_secret(), "tok");
    assert!(entry.expires_at > entry.created_at);
}

#[tokio::test]
async fn test_get_missing_key() {
    let cache = TokenCache::new();
    assert!(cache.get("absent").await.is_none());
}

#[tokio::test]
async fn test_expired_entry_is_invisible_but_not_removed() {
    let cache = TokenCache::new();
    cache
        .set("k", secret("tok"), std::time::Duration::from_millis(1))
        .await;

    tokio::time::sleep(std::time::Duration::from_millis(10)).await;

    assert!(cache.get("k").await.is_none());
    // Eviction is the sweeper's job, not get's.
    assert_eq!(cache.size().await, 1);
}

#[tokio::test]
async fn test_sweep_removes_only_expired_entries() {
    let cache = TokenCache::new();
    cache
        .set("stale", secret("a"), std::time::Duration::from_millis(1))
        .await;
    cache
        .set("fresh", secret("b"), std::time::Duration::from_secs(60))
        .await;

    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    cache.sweep().await;

    assert_eq!(cache.size().await, 1);
    assert!(cache.get("fresh").await.is_some());
}

#[tokio::test]
async fn test_stats() {
    let cache = TokenCache::new();
    cache
        .set("stale", secret("a"), std::time::Duration::from_millis(1))
        .await;
    cache
        .set("fresh", secret("b"), std::time::Duration::from_secs(60))
        .await;

    tokio::time::sleep(std::time::Duration::from_millis(10)).await;

    let stats = cache.stats().await;
    assert_eq!(
        stats,
        CacheStats {
            entries: 2,
            live: 1,
            expired: 1,
        }
    );
}

#[tokio::test]
async fn test_delete_and_clear() {
    let cache = TokenCache::new();
    cache
        .set("a", secret("1"), std::time::Duration::from_secs(60))
        .await;
    cache
        .set("b", secret("2"), std::time::Duration::from_secs(60))
        .await;

    cache.delete("a").await;
    assert!(cache.get("a").await.is_none());
    assert_eq!(cache.size().await, 1);

    cache.clear().await;
    assert_eq!(cache.size().await, 0);
}

#[tokio::test]
async fn test_clones_share_entries() {
    let cache = TokenCache::new();
    let other = cache.clone();
    cache
        .set("k", secret("tok"), std::time::Duration::from_secs(60))
        .await;
    assert!(other.get("k").await.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_sweeper_runs_and_honors_shutdown() {
    let cache = TokenCache::new();
    cache
        .set("stale", secret("a"), std::time::Duration::ZERO)
        .await;

    let shutdown = CancellationToken::new();
    let handle = cache.spawn_sweeper(std::time::Duration::from_secs(60), shutdown.clone());

    // Let the sweeper reach its first real tick.
    tokio::time::advance(std::time::Duration::from_secs(61)).await;
    tokio::task::yield_now().await;
    assert_eq!(cache.size().await, 0);

    shutdown.cancel();
    handle.await.unwrap();
}
