//! Application layer - Generic services that use ports.

pub mod lifecycle;
pub mod locks;
pub mod retriever;
pub mod service;
pub mod synthesizer;

pub use lifecycle::{SignalOutcome, VideoLifecycleController};
pub use retriever::{RetrievalConfig, SegmentRetriever};
pub use service::{PipelineSettings, StudyService};
pub use synthesizer::StudyMaterialSynthesizer;
