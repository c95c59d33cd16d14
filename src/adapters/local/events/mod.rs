//! Per-video event fan-out to connected clients.

pub mod hub;

pub use hub::{EventBroadcaster, SubscriberConnection};
