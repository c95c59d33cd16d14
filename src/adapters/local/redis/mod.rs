//! Redis adapter for local deployment.
//!
//! Implements `MetadataStore` with JSON values under the `lectio:` namespace.

mod error;
mod pool;
mod repository;

pub use error::StoreError;
pub use pool::RedisPool;

/// Redis key constants
const VIDEO_PREFIX: &str = "lectio:video:";
const TASK_PREFIX: &str = "lectio:task:";
const SEGMENTS_PREFIX: &str = "lectio:segments:";
const BUNDLE_PREFIX: &str = "lectio:bundle:";

fn key(prefix: &str, id: &str) -> String {
    format!("{}{}", prefix, id)
}
