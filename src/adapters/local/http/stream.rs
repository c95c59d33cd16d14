//! Server-Sent Events for per-video status and generation progress.

use super::error::ApiError;
use super::SharedService;
use crate::ports::generation::GenerationEngine;
use crate::ports::index::ContentIndex;
use crate::ports::repository::MetadataStore;
use axum::{
    extract::{Path, State},
    response::sse::{Event, Sse},
};
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use tracing::{info, warn};

/// GET /videos/:id/events
///
/// One JSON object per frame, with the SSE `event:` field set to the event
/// kind. Liveness pings come from the broadcaster heartbeat.
pub async fn video_events<S, I, G>(
    State(service): State<SharedService<S, I, G>>,
    Path(video_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError>
where
    S: MetadataStore + 'static,
    I: ContentIndex + 'static,
    G: GenerationEngine + 'static,
{
    let connection = service.subscribe_to_events(&video_id).await?;
    info!(
        "SSE client {} connected to video {}",
        connection.id(),
        video_id
    );

    let stream = connection.into_stream().filter_map(|event| async move {
        match serde_json::to_string(&event) {
            Ok(json) => Some(Ok(Event::default().event(event.event.as_str()).data(json))),
            Err(e) => {
                warn!("SSE: failed to serialize {} event: {}", event.event.as_str(), e);
                None
            }
        }
    });

    Ok(Sse::new(stream))
}
