//! Ports - Contracts the pipeline core requires of its collaborators.

pub mod events;
pub mod generation;
pub mod index;
pub mod repository;

/// Error type returned by every collaborator port.
pub type PortError = Box<dyn std::error::Error + Send + Sync>;
