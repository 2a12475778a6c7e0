use redis::AsyncCommands;
use tracing::debug;

/// Fast-path cache in front of the transactional idempotency ledger.
/// Never authoritative: a miss or a Redis failure always falls through to
/// the database protocol.
#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    pub async fn cache_idempotent_response(
        &self,
        key: &str,
        response_json: &str,
        ttl_seconds: u64,
    ) -> Result<(), redis::RedisError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let cache_key = format!("idem:{}", key);
        conn.set_ex::<_, _, ()>(cache_key, response_json, ttl_seconds).await?;
        debug!("Cached idempotent response for key {}", key);
        Ok(())
    }

    pub async fn get_idempotent_response(
        &self,
        key: &str,
    ) -> Result<Option<String>, redis::RedisError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let cache_key = format!("idem:{}", key);
        conn.get(cache_key).await
    }
}
