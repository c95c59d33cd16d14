//! Redis error types for the local adapter.

use deadpool_redis::CreatePoolError;
use thiserror::Error;

pub type RedisError = deadpool_redis::redis::RedisError;
pub type PoolError = deadpool_redis::PoolError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Create pool error: {0}")]
    CreatePool(String),
    #[error("Inconsistent video record {0}: task id does not match status")]
    Inconsistent(String),
}

impl From<CreatePoolError> for StoreError {
    fn from(err: CreatePoolError) -> Self {
        StoreError::CreatePool(err.to_string())
    }
}
