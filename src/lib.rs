//! Lectio - Lecture Study Material Library
//!
//! Hexagonal Architecture:
//! - domain/: Pure business logic (video lifecycle, segments, study bundles, validation)
//! - ports/: Trait definitions
//! - adapters/: Concrete implementations
//! - application/: Generic services
//! - config: Environment configuration
//!
//! # Features
//! - `redis`: Redis-backed metadata store for the monolith (default)

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;

#[cfg(test)]
pub mod test_utils;

// Re-exports for convenience
pub use adapters::local::{EventBroadcaster, MemoryStore};
pub use application::StudyService;
pub use config::ServiceConfig;
