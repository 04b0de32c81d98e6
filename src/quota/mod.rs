//! Quota enforcement against a shared counting store.
//!
//! # Data Flow
//! ```text
//! AppInfo
//!     → judge.rs (each judge emits one CounterCommand)
//!     → store.rs session (buffer commands, one atomic exec)
//!         → memory_store.rs | redis_store.rs
//!     → JudgeResultSet (pending replies, registration order)
//!     → judges evaluated in order, first failure wins
//! ```
//!
//! # Design Decisions
//! - One round trip per request regardless of judge count
//! - Sessions are RAII: every exit path returns them to the pool
//! - Judges come from a static table; no lookup by name at request time

pub mod judge;
pub mod memory_store;
pub mod redis_store;
pub mod store;

use std::sync::Arc;

use crate::config::{StoreConfig, StoreMode};

pub use judge::{Judge, JudgeRegistry, JudgeResultSet, WindowQuotaJudge};
pub use memory_store::{FailureMode, MemoryCounterStore};
pub use redis_store::RedisCounterStore;
pub use store::{CounterCommand, CounterSession, CounterStore, PendingReply, PoolStatus, StoreError};

/// Build the configured counting store.
pub fn build_store(config: &StoreConfig) -> Result<Arc<dyn CounterStore>, StoreError> {
    match config.mode {
        StoreMode::Memory => Ok(Arc::new(MemoryCounterStore::new(config.pool_size))),
        StoreMode::Redis => Ok(Arc::new(RedisCounterStore::new(config)?)),
    }
}
