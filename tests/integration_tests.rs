//! Boardcache Integration Tests
//!
//! End-to-end behaviour of the services over the cache tiers:
//! - Read-through, coalescing and invalidation
//! - Graceful degradation when L2 misbehaves
//! - Several processes sharing one L2

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;

use boardcache::cache::{FailureMode, InMemoryL2Store, L2Store};
use boardcache::config::CacheSettings;
use boardcache::model::ThreadRow;
use boardcache::repository::{
    MemoryThreadRepository, MemoryUserRepository, ThreadRepository,
};
use boardcache::{Error, Services};

fn settings() -> CacheSettings {
    CacheSettings {
        l2_timeout_ms: 50,
        ..CacheSettings::default()
    }
}

fn thread_row(tid: i64, subject: &str) -> ThreadRow {
    let now = Utc::now();
    ThreadRow {
        tid,
        fid: 1,
        uid: 1,
        subject: subject.to_string(),
        views: 0,
        replies: 0,
        dateline: now.timestamp(),
        lastpost: now.timestamp(),
        status: 0,
        message: "seeded".to_string(),
        created_at: now,
        updated_at: now,
    }
}

struct Harness {
    services: Services,
    threads: Arc<MemoryThreadRepository>,
    users: Arc<MemoryUserRepository>,
    l2: Arc<InMemoryL2Store>,
}

fn harness_on(l2: Arc<InMemoryL2Store>, threads: Arc<MemoryThreadRepository>) -> Harness {
    let users = Arc::new(MemoryUserRepository::new());
    let services = Services::builder(settings())
        .l2_store(l2.clone())
        .thread_repository(threads.clone())
        .user_repository(users.clone())
        .build();
    Harness {
        services,
        threads,
        users,
        l2,
    }
}

fn harness() -> Harness {
    harness_on(
        Arc::new(InMemoryL2Store::new()),
        Arc::new(MemoryThreadRepository::new()),
    )
}

// =============================================================================
// L1 Capacity
// =============================================================================

mod l1_capacity_tests {
    use boardcache::cache::{BoundedCache, ByteCache, EncodedL1, L1Tier};
    use boardcache::model::UserRecord;
    use boardcache::CacheKey;

    #[test]
    fn test_third_key_evicts_exactly_one_of_two() {
        let cache = BoundedCache::new(2);
        cache.set("a".to_string(), 1);
        cache.set("b".to_string(), 2);
        cache.set("c".to_string(), 3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"c".to_string()), Some(3));
        let survivors = [cache.contains(&"a".to_string()), cache.contains(&"b".to_string())];
        assert_eq!(survivors.iter().filter(|present| **present).count(), 1);
    }

    fn user(uid: i64) -> UserRecord {
        UserRecord {
            uid,
            username: format!("member{}", uid),
            email: String::new(),
            avatar: String::new(),
            role: 0,
            status: 0,
            dateline: 0,
            lastvisit: 0,
        }
    }

    #[test]
    fn test_byte_tier_third_key_evicts_exactly_one_of_two() {
        let l1: EncodedL1<UserRecord> = EncodedL1::new(ByteCache::with_shards(2, None, 16));
        l1.set(CacheKey::user(1), user(1));
        l1.set(CacheKey::user(2), user(2));
        assert_eq!(l1.len(), 2);

        l1.set(CacheKey::user(3), user(3));

        assert_eq!(l1.len(), 2);
        assert_eq!(l1.get(&CacheKey::user(3)), Some(user(3)));
        let survivors = [
            l1.get(&CacheKey::user(1)).is_some(),
            l1.get(&CacheKey::user(2)).is_some(),
        ];
        assert_eq!(survivors.iter().filter(|present| **present).count(), 1);
        assert_eq!(l1.stats().evictions, 1);
    }

    #[test]
    fn test_byte_tier_uses_its_whole_capacity() {
        let l1: EncodedL1<UserRecord> = EncodedL1::new(ByteCache::with_shards(10, None, 16));
        for uid in 1..=10 {
            l1.set(CacheKey::user(uid), user(uid));
        }
        assert_eq!(l1.len(), 10);
        assert_eq!(l1.stats().evictions, 0);
    }
}

// =============================================================================
// Read-Through and Coalescing
// =============================================================================

mod read_path_tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_two_cold_readers_share_one_origin_fetch() {
        let h = harness();
        h.threads.create(thread_row(42, "cold")).await.unwrap();
        h.threads.probe().reset_calls();
        h.threads.probe().set_latency(Some(Duration::from_millis(100)));

        let (a, b) = tokio::join!(h.services.threads.get(42), h.services.threads.get(42));

        let a = a.unwrap().unwrap();
        let b = b.unwrap().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.subject, "cold");
        assert_eq!(h.threads.probe().calls("get_by_id"), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_many_concurrent_readers_coalesce() {
        let h = harness();
        h.threads.create(thread_row(7, "busy")).await.unwrap();
        h.threads.probe().reset_calls();
        h.threads.probe().set_latency(Some(Duration::from_millis(100)));

        let services = Arc::new(h.services);
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let services = services.clone();
                tokio::spawn(async move { services.threads.get(7).await })
            })
            .collect();

        for handle in handles {
            let thread = handle.await.unwrap().unwrap().unwrap();
            assert_eq!(thread.tid, 7);
        }
        assert_eq!(h.threads.probe().calls("get_by_id"), 1);

        let snapshot = services.threads.cache().snapshot();
        assert_eq!(snapshot.origin_fetches, 1);
        assert_eq!(services.threads.cache().coalescer().in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_origin_failure_reaches_every_waiter_and_is_not_cached() {
        let h = harness();
        h.threads.create(thread_row(3, "flaky")).await.unwrap();
        h.threads.probe().reset_calls();
        h.threads.probe().set_latency(Some(Duration::from_millis(50)));
        h.threads.probe().set_failing(true);

        let (a, b) = tokio::join!(h.services.threads.get(3), h.services.threads.get(3));
        assert!(matches!(a, Err(Error::Origin(_))));
        assert!(matches!(b, Err(Error::Origin(_))));
        assert_eq!(h.threads.probe().calls("get_by_id"), 1);

        h.threads.probe().set_failing(false);
        let recovered = h.services.threads.get(3).await.unwrap().unwrap();
        assert_eq!(recovered.subject, "flaky");
    }

    #[tokio::test]
    async fn test_absent_thread_is_refetched_each_time() {
        let h = harness();
        assert_eq!(h.services.threads.get(404).await.unwrap(), None);
        assert_eq!(h.services.threads.get(404).await.unwrap(), None);
        assert_eq!(h.threads.probe().calls("get_by_id"), 2);
    }
}

// =============================================================================
// Write Path Invalidation
// =============================================================================

mod write_path_tests {
    use super::*;

    #[tokio::test]
    async fn test_update_then_get_returns_new_subject() {
        let h = harness();
        let created = h
            .services
            .threads
            .create(1, 1, "Original subject", "body")
            .await
            .unwrap();

        let first = h.services.threads.get(created.tid).await.unwrap().unwrap();
        assert_eq!(first.subject, "Original subject");
        assert!(h.l2.contains(&format!("thread:{}", created.tid)));

        h.services
            .threads
            .update(created.tid, "Edited subject", 0)
            .await
            .unwrap();
        assert!(!h.l2.contains(&format!("thread:{}", created.tid)));

        let second = h.services.threads.get(created.tid).await.unwrap().unwrap();
        assert_eq!(second.subject, "Edited subject");
    }

    #[tokio::test]
    async fn test_delete_leaves_nothing_reachable() {
        let h = harness();
        let created = h.services.threads.create(1, 1, "Doomed", "").await.unwrap();
        h.services.threads.get(created.tid).await.unwrap();

        h.services.threads.delete(created.tid).await.unwrap();

        assert!(h.services.threads.cache().l1().is_empty());
        assert!(!h.l2.contains(&format!("thread:{}", created.tid)));
        assert_eq!(h.services.threads.get(created.tid).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_flush_endpoint_semantics() {
        let h = harness();
        let thread = h.services.threads.create(1, 1, "t", "").await.unwrap();
        let forum = h.services.forums.create("f", 0).await.unwrap();
        h.services.threads.get(thread.tid).await.unwrap();
        h.services.forums.get(forum.fid).await.unwrap();

        h.services.flush_all();
        assert!(h.services.threads.cache().l1().is_empty());
        assert!(h.services.forums.cache().l1().is_empty());

        // L2 still answers after an L1 flush
        h.threads.probe().reset_calls();
        h.services.threads.get(thread.tid).await.unwrap();
        assert_eq!(h.threads.probe().calls("get_by_id"), 0);
    }
}

// =============================================================================
// Graceful Degradation
// =============================================================================

mod degradation_tests {
    use super::*;
    use boardcache::service::NewUser;

    #[tokio::test]
    async fn test_unavailable_l2_falls_back_to_origin() {
        let h = harness();
        let created = h.services.threads.create(1, 1, "resilient", "").await.unwrap();
        h.l2.set_failure_mode(FailureMode::Unavailable);

        let got = h.services.threads.get(created.tid).await.unwrap().unwrap();
        assert_eq!(got.subject, "resilient");

        // Writes still succeed with L2 down
        h.services
            .threads
            .update(created.tid, "still works", 0)
            .await
            .unwrap();
        let got = h.services.threads.get(created.tid).await.unwrap().unwrap();
        assert_eq!(got.subject, "still works");
        assert!(h.services.threads.cache().snapshot().l2_transport_errors > 0);
    }

    #[tokio::test]
    async fn test_stalled_l2_is_bounded_by_timeout() {
        let h = harness();
        let created = h.services.threads.create(1, 1, "slow cache", "").await.unwrap();
        h.l2
            .set_failure_mode(FailureMode::Stalled(Duration::from_secs(5)));

        let started = std::time::Instant::now();
        let got = h.services.threads.get(created.tid).await.unwrap().unwrap();
        assert_eq!(got.subject, "slow cache");
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_corrupt_l2_bytes_are_a_miss() {
        let h = harness();
        let user = h
            .services
            .users
            .create(NewUser {
                username: "mallory".into(),
                password_hash: "hash".into(),
                email: String::new(),
            })
            .await
            .unwrap();

        h.l2.insert_raw(
            &format!("user:{}", user.uid),
            Bytes::from_static(b"U\x00\x01"),
            Duration::from_secs(60),
        );

        let got = h.services.users.get(user.uid).await.unwrap().unwrap();
        assert_eq!(got.username, "mallory");
        assert_eq!(h.users.probe().calls("get_by_id"), 1);
        assert_eq!(h.services.users.cache().snapshot().codec_errors, 1);

        // The origin fetch overwrote the corrupt payload
        let raw = h.l2.get(&format!("user:{}", user.uid)).await.unwrap().unwrap();
        assert!(raw.len() > 3);
    }
}

// =============================================================================
// Shared L2 Across Processes
// =============================================================================

mod shared_l2_tests {
    use super::*;

    #[tokio::test]
    async fn test_second_instance_reads_from_shared_l2() {
        let l2 = Arc::new(InMemoryL2Store::new());
        let origin = Arc::new(MemoryThreadRepository::new());
        let node_a = harness_on(l2.clone(), origin.clone());
        let node_b = harness_on(l2, origin.clone());

        origin.create(thread_row(11, "shared")).await.unwrap();
        origin.probe().reset_calls();

        node_a.services.threads.get(11).await.unwrap();
        let from_b = node_b.services.threads.get(11).await.unwrap().unwrap();

        assert_eq!(from_b.subject, "shared");
        assert_eq!(origin.probe().calls("get_by_id"), 1);
        assert_eq!(node_b.services.threads.cache().snapshot().l2_hits, 1);
    }

    #[tokio::test]
    async fn test_l1_is_not_coordinated_across_instances() {
        let l2 = Arc::new(InMemoryL2Store::new());
        let origin = Arc::new(MemoryThreadRepository::new());
        let node_a = harness_on(l2.clone(), origin.clone());
        let node_b = harness_on(l2, origin.clone());

        origin.create(thread_row(12, "before")).await.unwrap();
        node_b.services.threads.get(12).await.unwrap();

        node_a.services.threads.update(12, "after", 0).await.unwrap();

        // Node B keeps its local copy until its own L1 is flushed
        let stale = node_b.services.threads.get(12).await.unwrap().unwrap();
        assert_eq!(stale.subject, "before");

        node_b.services.threads.flush_cache();
        let fresh = node_b.services.threads.get(12).await.unwrap().unwrap();
        assert_eq!(fresh.subject, "after");
    }
}
