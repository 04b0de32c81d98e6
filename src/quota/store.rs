//! Counting store abstraction.
//!
//! A store hands out pooled sessions. A session buffers counter increments and
//! submits them in one atomic round trip; each queued increment returns a
//! [`PendingReply`] that only becomes readable after [`CounterSession::exec`].
//! Dropping a session returns it to the pool.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Errors raised by a counting store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Could not reach the store or obtain a session.
    #[error("store connection failed: {0}")]
    Connection(String),

    /// The store answered with something that is not a counter.
    #[error("store returned invalid data: {0}")]
    Data(String),

    /// A reply was read before its batch ran.
    #[error("batch has not been executed")]
    NotExecuted,
}

impl StoreError {
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::Connection(_) => "connection",
            StoreError::Data(_) => "data",
            StoreError::NotExecuted => "not_executed",
        }
    }
}

/// Increment `key`, creating it with a TTL of `window` if it does not exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterCommand {
    pub key: String,
    pub window: Duration,
}

/// Result handle for one queued command, filled when the batch executes.
#[derive(Debug, Clone, Default)]
pub struct PendingReply {
    slot: Arc<OnceLock<Result<i64, StoreError>>>,
}

impl PendingReply {
    /// The counter value after increment.
    pub fn get(&self) -> Result<i64, StoreError> {
        self.slot.get().cloned().unwrap_or(Err(StoreError::NotExecuted))
    }

    pub fn is_ready(&self) -> bool {
        self.slot.get().is_some()
    }

    pub(crate) fn fulfil(&self, value: Result<i64, StoreError>) {
        // First write wins; a batch never fills a slot twice.
        let _ = self.slot.set(value);
    }
}

/// Commands buffered by a session, in submission order.
#[derive(Debug, Default)]
pub struct Batch {
    queued: Vec<(CounterCommand, PendingReply)>,
}

impl Batch {
    pub fn push(&mut self, command: CounterCommand) -> PendingReply {
        let reply = PendingReply::default();
        self.queued.push((command, reply.clone()));
        reply
    }

    pub fn len(&self) -> usize {
        self.queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }

    /// Take the buffered commands, leaving the batch empty.
    pub fn take(&mut self) -> Vec<(CounterCommand, PendingReply)> {
        std::mem::take(&mut self.queued)
    }
}

/// Snapshot of session pool usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub max_size: usize,
    pub in_use: usize,
}

/// One borrowed store connection.
#[async_trait]
pub trait CounterSession: Send {
    /// Buffer an increment without waiting for its reply.
    fn queue_incr(&mut self, command: CounterCommand) -> PendingReply;

    /// Submit everything queued as a single atomic round trip.
    async fn exec(&mut self) -> Result<(), StoreError>;
}

/// Pool of counting-store sessions.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Borrow a session; it is released when dropped.
    async fn session(&self) -> Result<Box<dyn CounterSession>, StoreError>;

    fn status(&self) -> PoolStatus;

    /// Backend label for logs and the admin API.
    fn backend(&self) -> &'static str;
}
