//! Redis-backed `RunningTaskTracker` (§4.3, §6.3).

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::domain::error::RepositoryError;
use crate::domain::models::TaskMetadata;
use crate::domain::ports::RunningTaskTracker;

const RUNNING_TASKS_ZSET: &str = "running_tasks:heartbeat";
const META_KEY_PREFIX: &str = "running_task:meta:";

fn meta_key(task_id: &str) -> String {
    format!("{META_KEY_PREFIX}{task_id}")
}

pub struct RedisRunningTaskTracker {
    conn: ConnectionManager,
    meta_ttl_secs: u64,
}

impl RedisRunningTaskTracker {
    pub fn new(conn: ConnectionManager, meta_ttl_secs: u64) -> Self {
        Self { conn, meta_ttl_secs }
    }
}

#[async_trait]
impl RunningTaskTracker for RedisRunningTaskTracker {
    async fn add_running_task(&self, meta: &TaskMetadata) -> Result<(), RepositoryError> {
        let mut conn = self.conn.clone();
        let key = meta_key(&meta.task_id);
        let blob = serde_json::to_string(meta).map_err(|source| RepositoryError::Corrupt {
            key: key.clone(),
            source,
        })?;
        let result: Result<(), redis::RedisError> = async {
            conn.zadd::<_, _, _, ()>(RUNNING_TASKS_ZSET, &meta.task_id, meta.start_time as f64)
                .await?;
            conn.set_ex::<_, _, ()>(&key, blob, self.meta_ttl_secs).await?;
            Ok(())
        }
        .await;
        if let Err(err) = result {
            tracing::warn!(error = %err, task_id = %meta.task_id, "add_running_task: redis error");
        }
        Ok(())
    }

    async fn remove_running_task(&self, task_id: &str) -> Result<(), RepositoryError> {
        let mut conn = self.conn.clone();
        if let Err(err) = conn.zrem::<_, _, ()>(RUNNING_TASKS_ZSET, task_id).await {
            tracing::warn!(error = %err, %task_id, "remove_running_task: failed to remove from zset");
        }
        if let Err(err) = conn.del::<_, ()>(meta_key(task_id)).await {
            tracing::warn!(error = %err, %task_id, "remove_running_task: failed to delete metadata hash");
        }
        Ok(())
    }

    async fn get_running_task_ids(&self) -> Result<Vec<String>, RepositoryError> {
        let mut conn = self.conn.clone();
        match conn.zrange(RUNNING_TASKS_ZSET, 0, -1).await {
            Ok(ids) => Ok(ids),
            Err(err) => {
                tracing::warn!(error = %err, "get_running_task_ids: redis error, degrading to empty");
                Ok(Vec::new())
            }
        }
    }

    async fn get_task_metadata(&self, task_id: &str) -> Result<Option<TaskMetadata>, RepositoryError> {
        let mut conn = self.conn.clone();
        let key = meta_key(task_id);
        let raw: Option<String> = match conn.get(&key).await {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(error = %err, %task_id, "get_task_metadata: redis error, treating as miss");
                return Ok(None);
            }
        };
        let Some(raw) = raw else { return Ok(None) };
        match serde_json::from_str::<TaskMetadata>(&raw) {
            Ok(meta) => Ok(Some(meta)),
            Err(source) => {
                tracing::error!(error = %source, %task_id, "get_task_metadata: corrupt metadata");
                Ok(None)
            }
        }
    }

    async fn get_stale_tasks(&self, max_age_secs: i64) -> Result<Vec<TaskMetadata>, RepositoryError> {
        let mut conn = self.conn.clone();
        let cutoff = (chrono::Utc::now().timestamp() - max_age_secs) as f64;
        let ids: Vec<String> = match conn
            .zrangebyscore(RUNNING_TASKS_ZSET, f64::NEG_INFINITY, cutoff)
            .await
        {
            Ok(ids) => ids,
            Err(err) => {
                tracing::warn!(error = %err, "get_stale_tasks: redis error, degrading to empty");
                return Ok(Vec::new());
            }
        };
        let mut stale = Vec::with_capacity(ids.len());
        for task_id in ids {
            if let Some(meta) = self.get_task_metadata(&task_id).await? {
                stale.push(meta);
            }
        }
        Ok(stale)
    }
}
