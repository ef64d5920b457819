//! Request Coalescer
//!
//! Collapses concurrent origin fetches for the same key into one call.
//!
//! The first caller to miss registers an in-flight marker and becomes the
//! leader; callers arriving while the marker exists subscribe to the
//! leader's `watch` channel and receive a clone of its result. The marker is
//! owned by a drop guard, so it is released on return, error, panic, or when
//! the leader future is dropped mid-fetch. Followers of a leader that
//! vanished without publishing retry, and one of them leads the next attempt.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;

use crate::error::{Error, Result};

type Slot<V> = watch::Receiver<Option<Result<V>>>;

enum Role<V> {
    Leader(watch::Sender<Option<Result<V>>>),
    Follower(Slot<V>),
}

/// Per-key single-flight executor
pub struct Coalescer<V> {
    in_flight: Mutex<HashMap<String, Slot<V>>>,
    leader_runs: AtomicU64,
    followers: AtomicU64,
}

impl<V: Clone + Send + Sync> Coalescer<V> {
    /// Create an empty coalescer
    pub fn new() -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
            leader_runs: AtomicU64::new(0),
            followers: AtomicU64::new(0),
        }
    }

    /// Run `fetch` for `key` unless a fetch for the same key is in flight,
    /// in which case wait for and return that fetch's result.
    pub async fn run<F, Fut>(&self, key: &str, fetch: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let mut fetch = Some(fetch);

        loop {
            let role = {
                let mut in_flight = self.in_flight.lock();
                match in_flight.get(key) {
                    Some(slot) => Role::Follower(slot.clone()),
                    None => {
                        let (tx, rx) = watch::channel(None);
                        in_flight.insert(key.to_string(), rx);
                        Role::Leader(tx)
                    }
                }
            };

            match role {
                Role::Leader(tx) => {
                    let _guard = FlightGuard {
                        in_flight: &self.in_flight,
                        key,
                    };
                    let fetch = fetch.take().ok_or_else(|| {
                        Error::Internal(format!("fetch for {} already consumed", key))
                    })?;

                    self.leader_runs.fetch_add(1, Ordering::Relaxed);
                    let result = fetch().await;
                    tx.send_replace(Some(result.clone()));
                    return result;
                }
                Role::Follower(mut slot) => {
                    self.followers.fetch_add(1, Ordering::Relaxed);
                    let published = match slot.wait_for(Option::is_some).await {
                        Ok(value) => (*value).clone(),
                        Err(_) => None,
                    };
                    match published {
                        Some(result) => return result,
                        None => debug!(key = %key, "Leader vanished before publishing, retrying"),
                    }
                }
            }
        }
    }

    /// Number of keys with a fetch currently in flight
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Number of fetch functions actually executed
    pub fn leader_runs(&self) -> u64 {
        self.leader_runs.load(Ordering::Relaxed)
    }

    /// Number of times a caller waited on another caller's fetch
    pub fn followers(&self) -> u64 {
        self.followers.load(Ordering::Relaxed)
    }
}

impl<V: Clone + Send + Sync> Default for Coalescer<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases the in-flight marker on every exit path
struct FlightGuard<'a, V> {
    in_flight: &'a Mutex<HashMap<String, Slot<V>>>,
    key: &'a str,
}

impl<V> Drop for FlightGuard<'_, V> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(self.key);
    }
}

// =============================================================================
// Tests
// =============================================================================
