use deadpool_redis::{
    Runtime,
    redis::{AsyncCommands, Script},
};
use sqlx::{PgPool, postgres::PgPoolOptions};

use crate::{ENV, api::error};

pub async fn connect_database() -> Result<PgPool, error::SystemError> {
    let database_url = &ENV.database_url;
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .acquire_slow_threshold(std::time::Duration::from_secs(3))
        .connect(database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

/// One-time phone verification codes.
#[async_trait::async_trait]
pub trait VerifyCodeStore: Send + Sync {
    async fn save_code(&self, phone: i64, code: &str, ttl: u64) -> Result<(), error::SystemError>;

    /// Returns whether `code` matches; a matching code is consumed.
    async fn check_code(&self, phone: i64, code: &str) -> Result<bool, error::SystemError>;
}

lazy_static::lazy_static! {
    // Deletes the key only if it still holds the submitted value.
    static ref CONSUME_IF_EQUAL: Script = Script::new(
        r"if redis.call('GET', KEYS[1]) == ARGV[1] then return redis.call('DEL', KEYS[1]) else return 0 end",
    );
}

#[derive(Clone)]
pub struct RedisCache {
    pool: deadpool_redis::Pool,
}

impl RedisCache {
    pub async fn new() -> Result<Self, error::SystemError> {
        Self::from_url(&ENV.redis_url)
    }

    pub fn from_url(url: &str) -> Result<Self, error::SystemError> {
        let mut cfg = deadpool_redis::Config::from_url(url);
        cfg.pool = Some(deadpool_redis::PoolConfig { max_size: 16, ..Default::default() });
        let pool = cfg.create_pool(Some(Runtime::Tokio1))?;
        Ok(Self { pool })
    }

    pub async fn set<T>(&self, key: &str, value: &T, expiration: u64) -> Result<(), error::SystemError>
    where
        T: serde::Serialize,
    {
        let mut conn = self.pool.get().await?;

        let serialized = serde_json::to_vec(value)?;

        conn.set_ex::<_, _, ()>(key, serialized, expiration).await?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl VerifyCodeStore for RedisCache {
    async fn save_code(&self, phone: i64, code: &str, ttl: u64) -> Result<(), error::SystemError> {
        self.set(&format!("verify_code:{phone}"), &code, ttl).await
    }

    async fn check_code(&self, phone: i64, code: &str) -> Result<bool, error::SystemError> {
        let mut conn = self.pool.get().await?;
        // Values are stored JSON-encoded by `set`.
        let expected = serde_json::to_string(code)?;
        let deleted: i64 = CONSUME_IF_EQUAL
            .key(format!("verify_code:{phone}"))
            .arg(expected)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "needs a running Redis at REDIS_URL"]
    async fn concurrent_checks_consume_a_code_once() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".into());
        let cache = RedisCache::from_url(&url).unwrap();
        let phone = 19_900_199_000;
        cache.save_code(phone, "123456", 60).await.unwrap();

        assert!(!cache.check_code(phone, "654321").await.unwrap());

        let (first, second) =
            tokio::join!(cache.check_code(phone, "123456"), cache.check_code(phone, "123456"));
        assert_eq!([first.unwrap(), second.unwrap()].iter().filter(|ok| **ok).count(), 1);
    }
}
