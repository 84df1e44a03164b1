//! Redis-backed `SandboxRepository` (§4.1, §6.3).

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::domain::error::RepositoryError;
use crate::domain::models::{Execution, Sandbox};
use crate::domain::ports::SandboxRepository;

const SESSION_HASH_PREFIX: &str = "wegent-sandbox-session:";
const SANDBOX_FIELD_NAME: &str = "__sandbox__";
const ACTIVE_SANDBOXES_ZSET: &str = "wegent-sandbox:active";
const BINDING_KEY_PREFIX: &str = "task_executor:";

fn session_key(sandbox_id: &str) -> String {
    format!("{SESSION_HASH_PREFIX}{sandbox_id}")
}

fn binding_key(task_id: &str) -> String {
    format!("{BINDING_KEY_PREFIX}{task_id}")
}

#[derive(serde::Serialize, serde::Deserialize)]
struct ExecutorBinding {
    executor_name: String,
    task_id: String,
    created_at: i64,
}

/// Single owner of Redis encoding/decoding for sandboxes, executions, the
/// active-set ZSet, and executor bindings.
pub struct RedisSandboxRepository {
    conn: ConnectionManager,
    session_ttl_secs: u64,
}

impl RedisSandboxRepository {
    pub fn new(conn: ConnectionManager, session_ttl_secs: u64) -> Self {
        Self { conn, session_ttl_secs }
    }

    fn decode<T: serde::de::DeserializeOwned>(key: &str, raw: &str) -> Result<T, RepositoryError> {
        serde_json::from_str(raw).map_err(|source| RepositoryError::Corrupt {
            key: key.to_string(),
            source,
        })
    }
}

#[async_trait]
impl SandboxRepository for RedisSandboxRepository {
    async fn save_sandbox(&self, sandbox: &Sandbox) -> Result<bool, RepositoryError> {
        if sandbox.task_id().is_none() {
            tracing::error!(sandbox_id = %sandbox.sandbox_id, "save_sandbox: missing metadata.task_id, refusing to write");
            return Ok(false);
        }
        let mut conn = self.conn.clone();
        let key = session_key(&sandbox.sandbox_id);
        let blob = serde_json::to_string(sandbox).map_err(|source| RepositoryError::Corrupt {
            key: key.clone(),
            source,
        })?;
        let now = chrono::Utc::now().timestamp() as f64;
        let result: Result<(), redis::RedisError> = async {
            conn.hset::<_, _, _, ()>(&key, SANDBOX_FIELD_NAME, &blob).await?;
            conn.expire::<_, ()>(&key, self.session_ttl_secs as i64).await?;
            conn.zadd::<_, _, _, ()>(ACTIVE_SANDBOXES_ZSET, &sandbox.sandbox_id, now)
                .await?;
            Ok(())
        }
        .await;
        match result {
            Ok(()) => Ok(true),
            Err(err) => {
                tracing::warn!(error = %err, sandbox_id = %sandbox.sandbox_id, "save_sandbox: redis error, degrading to false");
                Ok(false)
            }
        }
    }

    async fn load_sandbox(&self, sandbox_id: &str) -> Result<Option<Sandbox>, RepositoryError> {
        let mut conn = self.conn.clone();
        let key = session_key(sandbox_id);
        let raw: Option<String> = match conn.hget(&key, SANDBOX_FIELD_NAME).await {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(error = %err, %sandbox_id, "load_sandbox: redis error, treating as miss");
                return Ok(None);
            }
        };
        let Some(raw) = raw else { return Ok(None) };
        match Self::decode::<Sandbox>(&key, &raw) {
            Ok(sandbox) => Ok(Some(sandbox)),
            Err(err) => {
                tracing::error!(error = %err, %sandbox_id, "load_sandbox: corrupt stored value, treating as miss");
                Ok(None)
            }
        }
    }

    async fn delete_sandbox(&self, sandbox_id: &str) -> Result<(), RepositoryError> {
        let mut conn = self.conn.clone();
        let key = session_key(sandbox_id);
        if let Err(err) = conn.zrem::<_, _, ()>(ACTIVE_SANDBOXES_ZSET, sandbox_id).await {
            tracing::warn!(error = %err, %sandbox_id, "delete_sandbox: failed to remove from active set");
        }
        if let Err(err) = conn.del::<_, ()>(&key).await {
            tracing::warn!(error = %err, %sandbox_id, "delete_sandbox: failed to delete session hash");
        }
        Ok(())
    }

    async fn get_active_sandbox_ids(&self) -> Result<Vec<String>, RepositoryError> {
        let mut conn = self.conn.clone();
        match conn.zrange(ACTIVE_SANDBOXES_ZSET, 0, -1).await {
            Ok(ids) => Ok(ids),
            Err(err) => {
                tracing::warn!(error = %err, "get_active_sandbox_ids: redis error, degrading to empty");
                Ok(Vec::new())
            }
        }
    }

    async fn get_expired_sandbox_ids(&self, max_age_secs: i64) -> Result<Vec<String>, RepositoryError> {
        let mut conn = self.conn.clone();
        let cutoff = (chrono::Utc::now().timestamp() - max_age_secs) as f64;
        match conn
            .zrangebyscore(ACTIVE_SANDBOXES_ZSET, f64::NEG_INFINITY, cutoff)
            .await
        {
            Ok(ids) => Ok(ids),
            Err(err) => {
                tracing::warn!(error = %err, "get_expired_sandbox_ids: redis error, degrading to empty");
                Ok(Vec::new())
            }
        }
    }

    async fn remove_from_active_set(&self, sandbox_id: &str) -> Result<(), RepositoryError> {
        let mut conn = self.conn.clone();
        if let Err(err) = conn.zrem::<_, _, ()>(ACTIVE_SANDBOXES_ZSET, sandbox_id).await {
            tracing::warn!(error = %err, %sandbox_id, "remove_from_active_set: redis error");
        }
        Ok(())
    }

    async fn update_activity_timestamp(&self, sandbox_id: &str) -> Result<(), RepositoryError> {
        let mut conn = self.conn.clone();
        let now = chrono::Utc::now().timestamp() as f64;
        if let Err(err) = conn
            .zadd::<_, _, _, ()>(ACTIVE_SANDBOXES_ZSET, sandbox_id, now)
            .await
        {
            tracing::warn!(error = %err, %sandbox_id, "update_activity_timestamp: redis error");
        }
        Ok(())
    }

    async fn save_execution(&self, execution: &Execution) -> Result<bool, RepositoryError> {
        let Some(subtask_id) = execution.subtask_id().map(str::to_string) else {
            tracing::error!(execution_id = %execution.execution_id, "save_execution: missing subtask_id, refusing to write");
            return Ok(false);
        };
        let mut conn = self.conn.clone();
        let key = session_key(&execution.sandbox_id);
        let blob = serde_json::to_string(execution).map_err(|source| RepositoryError::Corrupt {
            key: key.clone(),
            source,
        })?;
        let now = chrono::Utc::now().timestamp() as f64;
        let result: Result<(), redis::RedisError> = async {
            conn.hset::<_, _, _, ()>(&key, &subtask_id, &blob).await?;
            conn.expire::<_, ()>(&key, self.session_ttl_secs as i64).await?;
            conn.zadd::<_, _, _, ()>(ACTIVE_SANDBOXES_ZSET, &execution.sandbox_id, now)
                .await?;
            Ok(())
        }
        .await;
        match result {
            Ok(()) => Ok(true),
            Err(err) => {
                tracing::warn!(error = %err, execution_id = %execution.execution_id, "save_execution: redis error, degrading to false");
                Ok(false)
            }
        }
    }

    async fn load_execution(
        &self,
        sandbox_id: &str,
        subtask_id: &str,
    ) -> Result<Option<Execution>, RepositoryError> {
        let mut conn = self.conn.clone();
        let key = session_key(sandbox_id);
        let raw: Option<String> = match conn.hget(&key, subtask_id).await {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(error = %err, %sandbox_id, %subtask_id, "load_execution: redis error, treating as miss");
                return Ok(None);
            }
        };
        let Some(raw) = raw else {
            tracing::debug!(%sandbox_id, %subtask_id, "load_execution: field not found in session hash");
            return Ok(None);
        };
        match Self::decode::<Execution>(&key, &raw) {
            Ok(execution) => Ok(Some(execution)),
            Err(err) => {
                tracing::error!(error = %err, %sandbox_id, %subtask_id, "load_execution: corrupt stored value");
                Ok(None)
            }
        }
    }

    async fn list_executions(&self, sandbox_id: &str) -> Result<Vec<Execution>, RepositoryError> {
        let mut conn = self.conn.clone();
        let key = session_key(sandbox_id);
        let fields: std::collections::HashMap<String, String> = match conn.hgetall(&key).await {
            Ok(map) => map,
            Err(err) => {
                tracing::warn!(error = %err, %sandbox_id, "list_executions: redis error, degrading to empty");
                return Ok(Vec::new());
            }
        };
        let mut executions = Vec::with_capacity(fields.len());
        for (field, raw) in fields {
            if field == SANDBOX_FIELD_NAME {
                continue;
            }
            match Self::decode::<Execution>(&key, &raw) {
                Ok(execution) => executions.push(execution),
                Err(err) => {
                    tracing::warn!(error = %err, field = %field, "list_executions: skipping unparseable field");
                }
            }
        }
        Ok(executions)
    }

    async fn save_executor_binding(
        &self,
        task_id: &str,
        executor_name: &str,
        ttl_secs: i64,
    ) -> Result<(), RepositoryError> {
        let mut conn = self.conn.clone();
        let key = binding_key(task_id);
        let binding = ExecutorBinding {
            executor_name: executor_name.to_string(),
            task_id: task_id.to_string(),
            created_at: chrono::Utc::now().timestamp(),
        };
        let Ok(blob) = serde_json::to_string(&binding) else {
            tracing::error!(%task_id, "save_executor_binding: failed to serialize binding");
            return Ok(());
        };
        if let Err(err) = conn.set_ex::<_, _, ()>(&key, blob, ttl_secs as u64).await {
            tracing::warn!(error = %err, %task_id, "save_executor_binding: redis error");
        }
        Ok(())
    }

    async fn load_executor_binding(&self, task_id: &str) -> Result<Option<String>, RepositoryError> {
        let mut conn = self.conn.clone();
        let key = binding_key(task_id);
        let raw: Option<String> = match conn.get(&key).await {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(error = %err, %task_id, "load_executor_binding: redis error, treating as miss");
                return Ok(None);
            }
        };
        let Some(raw) = raw else { return Ok(None) };
        match serde_json::from_str::<ExecutorBinding>(&raw) {
            Ok(binding) => Ok(Some(binding.executor_name)),
            Err(err) => {
                tracing::error!(error = %err, %task_id, "load_executor_binding: corrupt binding value");
                Ok(None)
            }
        }
    }
}
