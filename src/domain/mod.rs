//! Domain layer - Pure business logic.

pub mod events;
pub mod retry;
pub mod segment;
pub mod study;
pub mod validation;
pub mod video;
