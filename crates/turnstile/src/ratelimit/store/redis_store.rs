//! Redis-backed counting store.
//!
//! Each client key is a sorted set. The four window steps run inside a
//! single MULTI/EXEC pipeline so concurrent requests for the same key are
//! serialized by Redis.

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::Client as RedisClient;
use redis::aio::MultiplexedConnection;
use tracing::debug;

use super::CountingStore;
use crate::ratelimit::error::StoreError;

/// Counting store using Redis sorted sets.
pub struct RedisCountingStore {
    client: RedisClient,
    /// Shared multiplexed connection, dropped after any failed command so
    /// the next request reconnects.
    conn: Mutex<Option<MultiplexedConnection>>,
}

impl RedisCountingStore {
    /// Create a store from an existing client. No connection is opened
    /// until the first request.
    pub fn new(client: RedisClient) -> Self {
        Self {
            client,
            conn: Mutex::new(None),
        }
    }

    /// Create a store from a `redis://` URL.
    pub fn open(url: &str) -> Result<Self, StoreError> {
        Ok(Self::new(RedisClient::open(url)?))
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        let cached = self.conn.lock().clone();
        if let Some(conn) = cached {
            return Ok(conn);
        }

        let conn = self.client.get_multiplexed_async_connection().await?;
        *self.conn.lock() = Some(conn.clone());
        Ok(conn)
    }

    fn reset_connection(&self) {
        if self.conn.lock().take().is_some() {
            debug!("dropping cached redis connection after failure");
        }
    }
}

#[async_trait]
impl CountingStore for RedisCountingStore {
    async fn record_hit(
        &self,
        key: &str,
        member: &str,
        now: i64,
        window_secs: i64,
    ) -> Result<u64, StoreError> {
        let mut conn = self.connection().await?;
        let window_start = now - window_secs;

        let result: redis::RedisResult<(u64,)> = redis::pipe()
            .atomic()
            .zrembyscore(key, 0, window_start)
            .ignore()
            .zadd(key, member, now)
            .ignore()
            .zcard(key)
            .expire(key, window_secs)
            .ignore()
            .query_async(&mut conn)
            .await;

        match result {
            Ok((count,)) => Ok(count),
            Err(e) => {
                self.reset_connection();
                Err(e.into())
            }
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        match redis::cmd("PING").query_async::<String>(&mut conn).await {
            Ok(_) => Ok(()),
            Err(e) => {
                self.reset_connection();
                Err(e.into())
            }
        }
    }

    fn on_timeout(&self) {
        // The connection may be stuck behind a stalled reply.
        self.reset_connection();
    }
}

impl std::fmt::Debug for RedisCountingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCountingStore")
            .field("connected", &self.conn.lock().is_some())
            .finish()
    }
}
