use axum::response::sse::{Event, KeepAlive};
use axum::{
    extract::{FromRequestParts, Path, State},
    http::{HeaderMap, StatusCode, request::Parts},
    response::{IntoResponse, Json, Response, Sse},
};
use serde::Serialize;
use std::{convert::Infallible, time::Duration};
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, warn};
use uuid::Uuid;
use warden_core::{
    JobId,
    api_types::{
        ApiResponse, CreateJobRequest, JobCommandResponse, JobCreatedResponse,
        JobRunningResponse, PartialReportResponse,
    },
};

use crate::infra::{
    app_state::AppState,
    errors::{AppError, AppResult},
    jobs::{
        JobCommandAccepted, JobFrame, JobResult, JobSnapshot, JobSubscription,
    },
};

const LAST_EVENT_ID_HEADER: &str = "last-event-id";

/// `{id}` path segment parsed as a job id. A malformed id is rejected with
/// the same error envelope as every other handler failure.
#[derive(Debug, Clone, Copy)]
pub struct JobPath(pub JobId);

impl<S> FromRequestParts<S> for JobPath
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let Path(id) = Path::<Uuid>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| {
                debug!("rejected job id: {}", rejection.body_text());
                AppError::bad_request("invalid_job_id")
            })?;
        Ok(JobPath(JobId(id)))
    }
}

#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobSnapshot>,
    pub count: usize,
}

pub async fn create_job_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateJobRequest>,
) -> AppResult<impl IntoResponse> {
    let created = state
        .jobs()
        .create_job(request.ids, request.notify_target.as_deref())
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::success(JobCreatedResponse {
            job_id: created.job_id,
            requested: created.requested,
            duplicates_removed: created.duplicates_removed,
        })),
    ))
}

fn command_accepted(accepted: JobCommandAccepted) -> impl IntoResponse {
    (
        StatusCode::ACCEPTED,
        Json(ApiResponse::success(JobCommandResponse {
            job_id: accepted.job_id,
            status: accepted.status,
        })),
    )
}

pub async fn pause_job_handler(
    State(state): State<AppState>,
    JobPath(job_id): JobPath,
) -> AppResult<impl IntoResponse> {
    let accepted = state.jobs().pause(job_id).await?;
    Ok(command_accepted(accepted))
}

pub async fn resume_job_handler(
    State(state): State<AppState>,
    JobPath(job_id): JobPath,
) -> AppResult<impl IntoResponse> {
    let accepted = state.jobs().resume(job_id).await?;
    Ok(command_accepted(accepted))
}

pub async fn stop_job_handler(
    State(state): State<AppState>,
    JobPath(job_id): JobPath,
) -> AppResult<impl IntoResponse> {
    let accepted = state.jobs().stop(job_id).await?;
    Ok(command_accepted(accepted))
}

pub async fn partial_report_handler(
    State(state): State<AppState>,
    JobPath(job_id): JobPath,
) -> AppResult<Json<ApiResponse<PartialReportResponse>>> {
    let partial = state.jobs().partial_report(job_id).await?;
    Ok(Json(ApiResponse::success(PartialReportResponse {
        job_id: partial.job_id,
        status: partial.status,
        cursor: partial.cursor,
        report: partial.report,
    })))
}

/// 200 with the final report once terminal, 202 while still running.
pub async fn job_result_handler(
    State(state): State<AppState>,
    JobPath(job_id): JobPath,
) -> AppResult<Response> {
    let response = match state.jobs().result(job_id).await? {
        JobResult::Finished(report) => {
            (StatusCode::OK, Json(ApiResponse::success(report))).into_response()
        }
        JobResult::Running {
            job_id,
            status,
            processed,
            requested,
        } => (
            StatusCode::ACCEPTED,
            Json(ApiResponse::success(JobRunningResponse {
                job_id,
                status,
                running: true,
                processed,
                requested,
            })),
        )
            .into_response(),
    };
    Ok(response)
}

pub async fn list_jobs_handler(
    State(state): State<AppState>,
) -> Json<ApiResponse<JobListResponse>> {
    let jobs = state.jobs().list().await;
    let count = jobs.len();
    Json(ApiResponse::success(JobListResponse { jobs, count }))
}

pub async fn job_snapshot_handler(
    State(state): State<AppState>,
    JobPath(job_id): JobPath,
) -> AppResult<Json<ApiResponse<JobSnapshot>>> {
    let snapshot = state.jobs().get(job_id).await?;
    Ok(Json(ApiResponse::success(snapshot)))
}

pub async fn job_events_sse_handler(
    State(state): State<AppState>,
    JobPath(job_id): JobPath,
    headers: HeaderMap,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let last_sequence = headers
        .get(LAST_EVENT_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.trim().parse::<u64>().ok());
    let subscription = state
        .jobs()
        .subscribe(job_id, last_sequence)
        .await?;

    Ok(Sse::new(build_job_event_stream(subscription))
        .keep_alive(default_keep_alive()))
}

/// Maps a subscription onto SSE events. The stream ends after the
/// `stream_end` frame, which closes the response.
pub fn build_job_event_stream(
    subscription: JobSubscription,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    subscription
        .into_stream()
        .filter_map(job_frame_to_event)
        .map(Ok::<Event, Infallible>)
}

fn job_frame_to_event(frame: JobFrame) -> Option<Event> {
    let name = frame.event.event_name();
    serde_json::to_string(&frame)
        .map(|data| {
            Event::default()
                .event(name)
                .id(frame.sequence.to_string())
                .data(data)
        })
        .map_err(|err| {
            warn!(
                job = %frame.job_id,
                sequence = frame.sequence,
                "failed to serialize job frame: {err}"
            );
            err
        })
        .ok()
}

fn default_keep_alive() -> KeepAlive {
    KeepAlive::new()
        .interval(Duration::from_secs(15))
        .text("keep-alive")
}
