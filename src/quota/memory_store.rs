//! In-process counting store.
//!
//! # Responsibilities
//! - Fixed-window counters for a single gateway instance
//! - Bounded session pool with RAII release
//! - Failure drills (refuse sessions, drop on exec, corrupt replies)
//!
//! # Design Decisions
//! - One mutex guards the whole counter map, so a batch applies atomically
//! - Session accounting mirrors a real pool: acquiring past `max_sessions` fails fast

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use async_trait::async_trait;

use crate::observability::metrics;
use crate::quota::store::{
    Batch, CounterCommand, CounterSession, CounterStore, PendingReply, PoolStatus, StoreError,
};

/// Injected failure for drills and tests.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    None = 0,
    /// Sessions cannot be acquired.
    RefuseSessions = 1,
    /// Sessions are handed out but the batch fails on exec.
    DropOnExec = 2,
    /// The batch runs but every reply is garbage.
    CorruptReplies = 3,
}

impl From<u8> for FailureMode {
    fn from(val: u8) -> Self {
        match val {
            1 => FailureMode::RefuseSessions,
            2 => FailureMode::DropOnExec,
            3 => FailureMode::CorruptReplies,
            _ => FailureMode::None,
        }
    }
}

#[derive(Debug)]
struct WindowCounter {
    value: i64,
    expires_at: Instant,
}

#[derive(Debug)]
struct Shared {
    counters: Mutex<HashMap<String, WindowCounter>>,
    max_sessions: usize,
    in_use: AtomicUsize,
    failure: AtomicU8,
}

/// Counting store living in this process.
#[derive(Debug, Clone)]
pub struct MemoryCounterStore {
    shared: Arc<Shared>,
}

impl MemoryCounterStore {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                counters: Mutex::new(HashMap::new()),
                max_sessions,
                in_use: AtomicUsize::new(0),
                failure: AtomicU8::new(FailureMode::None as u8),
            }),
        }
    }

    pub fn set_failure(&self, mode: FailureMode) {
        self.shared.failure.store(mode as u8, Ordering::SeqCst);
    }

    fn failure(&self) -> FailureMode {
        FailureMode::from(self.shared.failure.load(Ordering::SeqCst))
    }

    /// Current value of a live counter.
    pub fn current(&self, key: &str) -> Option<i64> {
        let counters = self.shared.counters.lock().unwrap_or_else(PoisonError::into_inner);
        counters
            .get(key)
            .filter(|c| c.expires_at > Instant::now())
            .map(|c| c.value)
    }

    /// Reserve a session slot, failing when the pool is exhausted.
    fn try_create_guard(&self) -> Option<SessionGuard> {
        let mut prev = self.shared.in_use.load(Ordering::Relaxed);
        loop {
            if prev >= self.shared.max_sessions {
                return None;
            }
            match self.shared.in_use.compare_exchange_weak(
                prev,
                prev + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(x) => prev = x,
            }
        }
        metrics::record_store_sessions(prev + 1);
        Some(SessionGuard {
            shared: self.shared.clone(),
        })
    }
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::new(32)
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn session(&self) -> Result<Box<dyn CounterSession>, StoreError> {
        if self.failure() == FailureMode::RefuseSessions {
            return Err(StoreError::Connection("store offline".to_string()));
        }
        let guard = self
            .try_create_guard()
            .ok_or_else(|| StoreError::Connection("session pool exhausted".to_string()))?;

        Ok(Box::new(MemorySession {
            store: self.clone(),
            _guard: guard,
            batch: Batch::default(),
        }))
    }

    fn status(&self) -> PoolStatus {
        PoolStatus {
            max_size: self.shared.max_sessions,
            in_use: self.shared.in_use.load(Ordering::Acquire),
        }
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// Returns the session slot on drop.
#[derive(Debug)]
struct SessionGuard {
    shared: Arc<Shared>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let prev = self.shared.in_use.fetch_sub(1, Ordering::AcqRel);
        metrics::record_store_sessions(prev.saturating_sub(1));
    }
}

struct MemorySession {
    store: MemoryCounterStore,
    _guard: SessionGuard,
    batch: Batch,
}

#[async_trait]
impl CounterSession for MemorySession {
    fn queue_incr(&mut self, command: CounterCommand) -> PendingReply {
        self.batch.push(command)
    }

    async fn exec(&mut self) -> Result<(), StoreError> {
        let queued = self.batch.take();
        match self.store.failure() {
            FailureMode::DropOnExec | FailureMode::RefuseSessions => {
                return Err(StoreError::Connection("connection reset during exec".to_string()));
            }
            FailureMode::CorruptReplies => {
                for (_, reply) in queued {
                    reply.fulfil(Err(StoreError::Data("WRONGTYPE value is not an integer".to_string())));
                }
                return Ok(());
            }
            FailureMode::None => {}
        }

        let now = Instant::now();
        let mut counters = self
            .store
            .shared
            .counters
            .lock()
            .map_err(|_| StoreError::Data("counter map poisoned".to_string()))?;
        counters.retain(|_, c| c.expires_at > now);

        for (command, reply) in queued {
            let counter = counters.entry(command.key).or_insert(WindowCounter {
                value: 0,
                expires_at: now + command.window,
            });
            counter.value += 1;
            reply.fulfil(Ok(counter.value));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn incr(key: &str, window_ms: u64) -> CounterCommand {
        CounterCommand {
            key: key.into(),
            window: Duration::from_millis(window_ms),
        }
    }

    #[tokio::test]
    async fn test_batch_counts_and_expiry() {
        let store = MemoryCounterStore::new(4);

        let mut session = store.session().await.unwrap();
        let a = session.queue_incr(incr("a", 50));
        let b = session.queue_incr(incr("a", 50));
        let c = session.queue_incr(incr("b", 60_000));
        assert!(!a.is_ready());
        session.exec().await.unwrap();
        drop(session);

        assert_eq!(a.get(), Ok(1));
        assert_eq!(b.get(), Ok(2));
        assert_eq!(c.get(), Ok(1));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(store.current("a"), None);
        assert_eq!(store.current("b"), Some(1));
    }

    #[tokio::test]
    async fn test_sessions_released_on_drop() {
        let store = MemoryCounterStore::new(2);
        let s1 = store.session().await.unwrap();
        let s2 = store.session().await.unwrap();
        assert_eq!(store.status().in_use, 2);
        assert!(matches!(store.session().await, Err(StoreError::Connection(_))));

        drop(s1);
        drop(s2);
        assert_eq!(store.status(), PoolStatus { max_size: 2, in_use: 0 });
    }

    #[tokio::test]
    async fn test_failure_modes() {
        let store = MemoryCounterStore::new(2);

        store.set_failure(FailureMode::RefuseSessions);
        assert!(store.session().await.is_err());

        store.set_failure(FailureMode::DropOnExec);
        let mut session = store.session().await.unwrap();
        let reply = session.queue_incr(incr("k", 1000));
        assert!(matches!(session.exec().await, Err(StoreError::Connection(_))));
        assert_eq!(reply.get(), Err(StoreError::NotExecuted));
        drop(session);

        store.set_failure(FailureMode::CorruptReplies);
        let mut session = store.session().await.unwrap();
        let reply = session.queue_incr(incr("k", 1000));
        session.exec().await.unwrap();
        assert!(matches!(reply.get(), Err(StoreError::Data(_))));
        drop(session);

        assert_eq!(store.status().in_use, 0);
        assert_eq!(store.current("k"), None);
    }
}
