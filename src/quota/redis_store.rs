//! Redis-backed counting store shared by every gateway instance.
//!
//! Each queued increment becomes `SET key 0 EX window NX` + `INCR key` inside
//! one `MULTI`/`EXEC` pipeline, so the window TTL is set exactly once and all
//! counters for a request move in a single round trip. Both acquiring a
//! session and the round trip itself are bounded; a stalled server surfaces
//! as [`StoreError::Connection`].

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, PoolConfig, Runtime};
use redis::aio::ConnectionLike;
use redis::{FromRedisValue, Pipeline, RedisError, Value};

use crate::config::StoreConfig;
use crate::observability::metrics;
use crate::quota::store::{
    Batch, CounterCommand, CounterSession, CounterStore, PendingReply, PoolStatus, StoreError,
};

impl From<RedisError> for StoreError {
    fn from(e: RedisError) -> Self {
        if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() || e.is_timeout() {
            StoreError::Connection(e.to_string())
        } else {
            StoreError::Data(e.to_string())
        }
    }
}

/// Counting store over a deadpool-managed Redis pool.
#[derive(Clone)]
pub struct RedisCounterStore {
    pool: Pool,
    acquire_timeout: Duration,
    command_timeout: Duration,
}

impl RedisCounterStore {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let mut cfg = Config::from_url(config.url.clone());
        cfg.pool = Some(PoolConfig::new(config.pool_size));
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        tracing::info!(
            url = %config.url,
            pool_size = config.pool_size,
            "Redis counting store configured"
        );

        Ok(Self {
            pool,
            acquire_timeout: Duration::from_millis(config.acquire_timeout_ms),
            command_timeout: Duration::from_millis(config.command_timeout_ms),
        })
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn session(&self) -> Result<Box<dyn CounterSession>, StoreError> {
        let conn = match tokio::time::timeout(self.acquire_timeout, self.pool.get()).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => return Err(StoreError::Connection(e.to_string())),
            Err(_) => {
                return Err(StoreError::Connection(format!(
                    "no session available within {}ms",
                    self.acquire_timeout.as_millis()
                )))
            }
        };
        metrics::record_store_sessions(self.status().in_use);

        Ok(Box::new(RedisSession {
            conn,
            batch: Batch::default(),
            command_timeout: self.command_timeout,
        }))
    }

    fn status(&self) -> PoolStatus {
        let status = self.pool.status();
        PoolStatus {
            max_size: status.max_size,
            in_use: status.size.saturating_sub(status.available),
        }
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

/// Pooled connection plus its buffered commands. Dropping the connection
/// object returns it to the pool.
struct RedisSession {
    conn: Connection,
    batch: Batch,
    command_timeout: Duration,
}

#[async_trait]
impl CounterSession for RedisSession {
    fn queue_incr(&mut self, command: CounterCommand) -> PendingReply {
        self.batch.push(command)
    }

    async fn exec(&mut self) -> Result<(), StoreError> {
        let queued = self.batch.take();
        run_batch(&mut self.conn, queued, self.command_timeout).await
    }
}

/// Atomic pipeline for `queued`: per command an ignored `SET key 0 EX ttl NX`
/// followed by `INCR key`, leaving exactly one reply per command.
fn counter_pipeline(queued: &[(CounterCommand, PendingReply)]) -> Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic();
    for (command, _) in queued {
        let ttl = command.window.as_secs().max(1);
        pipe.cmd("SET")
            .arg(&command.key)
            .arg(0)
            .arg("EX")
            .arg(ttl)
            .arg("NX")
            .ignore();
        pipe.cmd("INCR").arg(&command.key);
    }
    pipe
}

/// Run one batch on `conn` and fill every reply, or fail without filling any.
async fn run_batch<C>(
    conn: &mut C,
    queued: Vec<(CounterCommand, PendingReply)>,
    deadline: Duration,
) -> Result<(), StoreError>
where
    C: ConnectionLike + Send,
{
    if queued.is_empty() {
        return Ok(());
    }

    let pipe = counter_pipeline(&queued);
    let values: Vec<Value> = match tokio::time::timeout(deadline, pipe.query_async(conn)).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(StoreError::Connection(format!(
                "no reply within {}ms",
                deadline.as_millis()
            )))
        }
    };
    if values.len() != queued.len() {
        return Err(StoreError::Data(format!(
            "expected {} replies, got {}",
            queued.len(),
            values.len()
        )));
    }

    for ((_, reply), value) in queued.into_iter().zip(values.iter()) {
        reply.fulfil(i64::from_redis_value(value).map_err(StoreError::from));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StoreConfig, StoreMode};
    use redis::{Cmd, ErrorKind, RedisFuture, RedisResult};

    /// Connection that records the pipeline it was sent and answers from a script.
    #[derive(Default)]
    struct ScriptedConnection {
        exec_reply: Option<RedisResult<Value>>,
        stall: bool,
        packed: Vec<u8>,
        framing: Option<(usize, usize)>,
    }

    impl ScriptedConnection {
        fn replying(items: Vec<Value>) -> Self {
            Self {
                exec_reply: Some(Ok(Value::Array(items))),
                ..Self::default()
            }
        }

        fn sent(&self) -> String {
            String::from_utf8_lossy(&self.packed).into_owned()
        }
    }

    impl ConnectionLike for ScriptedConnection {
        fn req_packed_command<'a>(&'a mut self, _cmd: &'a Cmd) -> RedisFuture<'a, Value> {
            Box::pin(async { Err(RedisError::from((ErrorKind::ClientError, "unexpected single command"))) })
        }

        fn req_packed_commands<'a>(
            &'a mut self,
            pipe: &'a Pipeline,
            offset: usize,
            count: usize,
        ) -> RedisFuture<'a, Vec<Value>> {
            self.packed = pipe.get_packed_pipeline();
            self.framing = Some((offset, count));
            let stall = self.stall;
            let reply = self.exec_reply.take();
            Box::pin(async move {
                if stall {
                    std::future::pending::<()>().await;
                }
                match reply {
                    Some(Ok(value)) => Ok(vec![value]),
                    Some(Err(e)) => Err(e),
                    None => Ok(vec![Value::Nil]),
                }
            })
        }

        fn get_db(&self) -> i64 {
            0
        }
    }

    fn batch(keys: &[(&str, u64)]) -> (Vec<(CounterCommand, PendingReply)>, Vec<PendingReply>) {
        let mut batch = Batch::default();
        let replies = keys
            .iter()
            .map(|(key, secs)| {
                batch.push(CounterCommand {
                    key: key.to_string(),
                    window: Duration::from_secs(*secs),
                })
            })
            .collect();
        (batch.take(), replies)
    }

    #[test]
    fn test_error_classification() {
        let refused = RedisError::from(std::io::Error::from(std::io::ErrorKind::ConnectionRefused));
        assert!(matches!(StoreError::from(refused), StoreError::Connection(_)));

        let reset = RedisError::from(std::io::Error::from(std::io::ErrorKind::ConnectionReset));
        assert!(matches!(StoreError::from(reset), StoreError::Connection(_)));

        let wrong_type = RedisError::from((ErrorKind::TypeError, "not an integer"));
        assert!(matches!(StoreError::from(wrong_type), StoreError::Data(_)));

        let server = RedisError::from((ErrorKind::ResponseError, "WRONGTYPE"));
        assert!(matches!(StoreError::from(server), StoreError::Data(_)));
    }

    #[tokio::test]
    async fn test_batch_sends_set_nx_and_incr_per_command() {
        let (queued, replies) = batch(&[("quota:daily:k1:1", 86_400), ("quota:minutely:k1:9", 60)]);
        let mut conn = ScriptedConnection::replying(vec![
            Value::Okay,
            Value::Int(1),
            Value::Nil,
            Value::Int(7),
        ]);

        run_batch(&mut conn, queued, Duration::from_secs(1)).await.unwrap();

        assert_eq!(replies[0].get(), Ok(1));
        assert_eq!(replies[1].get(), Ok(7));

        // MULTI + 4 queued commands are skipped; EXEC carries the replies.
        assert_eq!(conn.framing, Some((5, 1)));
        let sent = conn.sent();
        let order: Vec<_> = ["MULTI", "SET", "quota:daily:k1:1", "86400", "NX", "INCR", "SET", "60", "INCR", "EXEC"]
            .iter()
            .scan(0, |from, token| {
                let at = sent[*from..].find(token).map(|i| *from + i);
                if let Some(at) = at {
                    *from = at + token.len();
                }
                Some(at)
            })
            .collect();
        assert!(order.iter().all(Option::is_some), "{}", sent);
    }

    #[tokio::test]
    async fn test_empty_batch_skips_round_trip() {
        let mut conn = ScriptedConnection::default();
        run_batch(&mut conn, Vec::new(), Duration::from_secs(1)).await.unwrap();
        assert!(conn.framing.is_none());
    }

    #[tokio::test]
    async fn test_reply_count_mismatch_leaves_replies_unfilled() {
        let (queued, replies) = batch(&[("a", 60), ("b", 60)]);
        let mut conn = ScriptedConnection::replying(vec![Value::Okay, Value::Int(1)]);

        let err = run_batch(&mut conn, queued, Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err, StoreError::Data("expected 2 replies, got 1".into()));
        assert!(replies.iter().all(|r| !r.is_ready()));
    }

    #[tokio::test]
    async fn test_non_integer_reply_is_data_error() {
        let (queued, replies) = batch(&[("a", 60)]);
        let mut conn = ScriptedConnection::replying(vec![
            Value::Okay,
            Value::SimpleString("nope".into()),
        ]);

        run_batch(&mut conn, queued, Duration::from_secs(1)).await.unwrap();
        assert!(matches!(replies[0].get(), Err(StoreError::Data(_))));
    }

    #[tokio::test]
    async fn test_transport_error_is_connection_error() {
        let (queued, replies) = batch(&[("a", 60)]);
        let mut conn = ScriptedConnection {
            exec_reply: Some(Err(RedisError::from(std::io::Error::from(
                std::io::ErrorKind::BrokenPipe,
            )))),
            ..ScriptedConnection::default()
        };

        let err = run_batch(&mut conn, queued, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Connection(_)));
        assert!(!replies[0].is_ready());
    }

    #[tokio::test]
    async fn test_stalled_server_times_out() {
        let (queued, replies) = batch(&[("a", 60)]);
        let mut conn = ScriptedConnection {
            stall: true,
            ..ScriptedConnection::replying(vec![Value::Okay, Value::Int(1)])
        };

        let err = run_batch(&mut conn, queued, Duration::from_millis(50)).await.unwrap_err();
        assert_eq!(err, StoreError::Connection("no reply within 50ms".into()));
        assert!(!replies[0].is_ready());
    }

    fn config(url: String) -> StoreConfig {
        StoreConfig {
            mode: StoreMode::Redis,
            url,
            pool_size: 2,
            acquire_timeout_ms: 200,
            command_timeout_ms: 200,
        }
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_session() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let store = RedisCounterStore::new(&config(format!("redis://{}", addr))).unwrap();
        let err = match store.session().await {
            Ok(_) => panic!("session from a closed port"),
            Err(e) => e,
        };
        assert!(matches!(err, StoreError::Connection(_)));
        assert_eq!(store.status().in_use, 0);
        assert_eq!(store.backend(), "redis");
    }

    /// Runs against a real server when `REDIS_URL` is set.
    #[tokio::test]
    async fn test_live_window_counting() {
        let Ok(url) = std::env::var("REDIS_URL") else {
            return;
        };
        let store = RedisCounterStore::new(&config(url)).unwrap();
        let key = format!("quota:test:{}:0", uuid::Uuid::new_v4());

        for expected in 1..=3 {
            let mut session = store.session().await.unwrap();
            let reply = session.queue_incr(CounterCommand {
                key: key.clone(),
                window: Duration::from_secs(5),
            });
            session.exec().await.unwrap();
            assert_eq!(reply.get(), Ok(expected));
        }
    }
}
