//! Redis-backed `HeartbeatStore` (§4.2, §6.3).

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::domain::error::HeartbeatError;
use crate::domain::models::HeartbeatKind;
use crate::domain::ports::HeartbeatStore;

pub struct RedisHeartbeatStore {
    conn: ConnectionManager,
    key_ttl_secs: u64,
}

impl RedisHeartbeatStore {
    pub fn new(conn: ConnectionManager, key_ttl_secs: u64) -> Self {
        Self { conn, key_ttl_secs }
    }
}

#[async_trait]
impl HeartbeatStore for RedisHeartbeatStore {
    async fn update_heartbeat(&self, id: &str, kind: HeartbeatKind) -> Result<(), HeartbeatError> {
        let mut conn = self.conn.clone();
        let now = chrono::Utc::now().timestamp().to_string();
        conn.set_ex::<_, _, ()>(kind.key_for(id), now, self.key_ttl_secs)
            .await?;
        Ok(())
    }

    async fn check_heartbeat(
        &self,
        id: &str,
        kind: HeartbeatKind,
        timeout_secs: i64,
    ) -> Result<bool, HeartbeatError> {
        match self.get_last_heartbeat(id, kind).await? {
            None => Ok(false),
            Some(last) => Ok(chrono::Utc::now().timestamp() - last < timeout_secs),
        }
    }

    async fn get_last_heartbeat(&self, id: &str, kind: HeartbeatKind) -> Result<Option<i64>, HeartbeatError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(kind.key_for(id)).await?;
        match raw {
            None => Ok(None),
            Some(raw) => raw
                .parse::<i64>()
                .map(Some)
                .map_err(|_| HeartbeatError::InvalidValue(kind.key_for(id))),
        }
    }

    async fn delete_heartbeat(&self, id: &str, kind: HeartbeatKind) -> Result<(), HeartbeatError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(kind.key_for(id)).await?;
        Ok(())
    }
}
