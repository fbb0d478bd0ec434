//! Redis-backed credential cache, for deployments that run more than one
//! process or need sessions to survive restarts.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

use crate::error::{AppError, AppResult};

use super::kv::CredentialCache;

#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

fn unavailable(e: redis::RedisError) -> AppError {
    AppError::io("cache_unavailable".to_string(), format!("redis: {}", e))
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let client = Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl CredentialCache for RedisCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(unavailable)
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> AppResult<()> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl_secs.max(1)).await.map_err(unavailable)
    }

    async fn set_if_present(&self, key: &str, value: &str, ttl_secs: u64) -> AppResult<bool> {
        let mut conn = self.conn.clone();
        // SET .. XX replies nil when the key is gone.
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs.max(1))
            .arg("XX")
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> AppResult<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(key).await.map_err(unavailable)?;
        Ok(removed > 0)
    }
}
