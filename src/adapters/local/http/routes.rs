//! JSON handlers of the HTTP API.

use super::error::ApiError;
use super::SharedService;
use crate::application::SignalOutcome;
use crate::domain::segment::Segment;
use crate::domain::study::{GenerationOptions, StudyBundle};
use crate::domain::video::{CompletionSignal, VideoRecord};
use crate::ports::generation::GenerationEngine;
use crate::ports::index::ContentIndex;
use crate::ports::repository::MetadataStore;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub storage_uri: String,
}

#[derive(Debug, Serialize)]
pub struct CompletionResponse {
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoRecord>,
}

/// POST /videos
pub async fn register<S, I, G>(
    State(service): State<SharedService<S, I, G>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<VideoRecord>), ApiError>
where
    S: MetadataStore + 'static,
    I: ContentIndex + 'static,
    G: GenerationEngine + 'static,
{
    if request.storage_uri.trim().is_empty() {
        return Err(ApiError::BadRequest("storage_uri must not be empty".into()));
    }
    let record = service.register_video(request.storage_uri.trim()).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /videos/:id
pub async fn status<S, I, G>(
    State(service): State<SharedService<S, I, G>>,
    Path(video_id): Path<String>,
) -> Result<Json<VideoRecord>, ApiError>
where
    S: MetadataStore + 'static,
    I: ContentIndex + 'static,
    G: GenerationEngine + 'static,
{
    Ok(Json(service.video_status(&video_id).await?))
}

/// POST /videos/:id/submit
pub async fn submit<S, I, G>(
    State(service): State<SharedService<S, I, G>>,
    Path(video_id): Path<String>,
) -> Result<(StatusCode, Json<VideoRecord>), ApiError>
where
    S: MetadataStore + 'static,
    I: ContentIndex + 'static,
    G: GenerationEngine + 'static,
{
    let record = service.submit_video(&video_id).await?;
    Ok((StatusCode::ACCEPTED, Json(record)))
}

/// POST /videos/:id/study
///
/// An empty body means default options.
pub async fn generate<S, I, G>(
    State(service): State<SharedService<S, I, G>>,
    Path(video_id): Path<String>,
    body: Bytes,
) -> Result<Json<StudyBundle>, ApiError>
where
    S: MetadataStore + 'static,
    I: ContentIndex + 'static,
    G: GenerationEngine + 'static,
{
    let options: GenerationOptions = if body.iter().all(u8::is_ascii_whitespace) {
        GenerationOptions::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("invalid options: {}", e)))?
    };
    let bundle = service.generate_study_bundle(&video_id, &options).await?;
    Ok(Json(bundle))
}

/// GET /videos/:id/study
pub async fn bundle<S, I, G>(
    State(service): State<SharedService<S, I, G>>,
    Path(video_id): Path<String>,
) -> Result<Json<StudyBundle>, ApiError>
where
    S: MetadataStore + 'static,
    I: ContentIndex + 'static,
    G: GenerationEngine + 'static,
{
    service.video_status(&video_id).await?;
    service
        .study_bundle(&video_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no study bundle for video {}", video_id)))
}

/// GET /videos/:id/segments
pub async fn segments<S, I, G>(
    State(service): State<SharedService<S, I, G>>,
    Path(video_id): Path<String>,
) -> Result<Json<Vec<Segment>>, ApiError>
where
    S: MetadataStore + 'static,
    I: ContentIndex + 'static,
    G: GenerationEngine + 'static,
{
    Ok(Json(service.segments(&video_id).await?))
}

/// POST /webhooks/indexing
///
/// Always 200 for well-formed signals; ignored duplicates report `applied: false`.
pub async fn indexing_webhook<S, I, G>(
    State(service): State<SharedService<S, I, G>>,
    Json(signal): Json<CompletionSignal>,
) -> Result<Json<CompletionResponse>, ApiError>
where
    S: MetadataStore + 'static,
    I: ContentIndex + 'static,
    G: GenerationEngine + 'static,
{
    info!("Indexing webhook for task {}", signal.task_id);
    let response = match service.handle_completion(&signal).await? {
        SignalOutcome::Applied(record) => CompletionResponse {
            applied: true,
            video: Some(record),
        },
        SignalOutcome::Ignored => CompletionResponse {
            applied: false,
            video: None,
        },
    };
    Ok(Json(response))
}
