//! Redis-backed `DistributedLock` (§5, grounded in `distributed_lock.py`).
//!
//! Lock acquisition is a single `SET NX EX`; release is a bare `DEL`. This
//! mirrors the original's unconditional delete rather than a
//! compare-and-delete Lua script, so a lock can in principle be released by
//! a holder other than the one that set it after the holder's own TTL
//! assumptions are wrong. Acceptable here: lock names are short-lived
//! scheduler-job guards, not cross-tenant resources.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::domain::error::RepositoryError;
use crate::domain::ports::DistributedLock;

const LOCK_KEY_PREFIX: &str = "wegent-sandbox:lock:";

fn lock_key(lock_name: &str) -> String {
    format!("{LOCK_KEY_PREFIX}{lock_name}")
}

pub struct RedisDistributedLock {
    conn: ConnectionManager,
}

impl RedisDistributedLock {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl DistributedLock for RedisDistributedLock {
    async fn acquire(&self, lock_name: &str, expire_secs: i64) -> Result<bool, RepositoryError> {
        let mut conn = self.conn.clone();
        let key = lock_key(lock_name);
        let result: Result<Option<String>, redis::RedisError> = redis::cmd("SET")
            .arg(&key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(expire_secs)
            .query_async(&mut conn)
            .await;
        match result {
            Ok(v) => Ok(v.is_some()),
            Err(err) => {
                tracing::warn!(error = %err, %lock_name, "acquire: redis error, treating as not-acquired");
                Ok(false)
            }
        }
    }

    async fn release(&self, lock_name: &str) -> Result<(), RepositoryError> {
        let mut conn = self.conn.clone();
        if let Err(err) = conn.del::<_, ()>(lock_key(lock_name)).await {
            tracing::warn!(error = %err, %lock_name, "release: redis error");
        }
        Ok(())
    }
}
