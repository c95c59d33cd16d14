//! Local adapters for monolith deployment.

pub mod events;
pub mod http;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

pub use events::EventBroadcaster;
pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use redis::RedisPool;
