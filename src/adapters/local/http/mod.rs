//! HTTP inbound adapter.
//!
//! JSON API over [`StudyService`] plus a per-video SSE event stream.

mod error;
mod routes;
mod stream;

pub use error::ApiError;

use crate::adapters::local::events::EventBroadcaster;
use crate::application::StudyService;
use crate::ports::generation::GenerationEngine;
use crate::ports::index::ContentIndex;
use crate::ports::repository::MetadataStore;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub type SharedService<S, I, G> = Arc<StudyService<S, I, G, EventBroadcaster>>;

pub fn router<S, I, G>(service: SharedService<S, I, G>) -> Router
where
    S: MetadataStore + 'static,
    I: ContentIndex + 'static,
    G: GenerationEngine + 'static,
{
    Router::new()
        .route("/videos", post(routes::register::<S, I, G>))
        .route("/videos/:id", get(routes::status::<S, I, G>))
        .route("/videos/:id/submit", post(routes::submit::<S, I, G>))
        .route(
            "/videos/:id/study",
            post(routes::generate::<S, I, G>).get(routes::bundle::<S, I, G>),
        )
        .route("/videos/:id/segments", get(routes::segments::<S, I, G>))
        .route("/videos/:id/events", get(stream::video_events::<S, I, G>))
        .route("/webhooks/indexing", post(routes::indexing_webhook::<S, I, G>))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}
