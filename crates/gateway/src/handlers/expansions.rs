//! Expansion run handlers: trigger, status and cancellation

use super::validate;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use refgraph_common::{
    errors::{AppError, Result},
    DocumentId,
};
use refgraph_expansion::{
    ExpansionReport, ExpansionRequest, ProgressSnapshot, RunHandle, RunState,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Start an expansion run from a stored seed
#[derive(Debug, Deserialize, Validate)]
pub struct StartExpansionRequest {
    pub seed_id: DocumentId,

    /// Upper bound is `expansion.max_depth_limit`
    #[validate(range(min = 1))]
    pub max_depth: Option<u32>,

    /// Upper bound is `expansion.max_concurrency`
    #[validate(range(min = 1))]
    pub concurrency: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct StartExpansionResponse {
    pub run_id: Uuid,
    pub seed_id: DocumentId,
    pub state: RunState,
    pub status_url: String,
}

#[derive(Debug, Serialize)]
pub struct RunStatusResponse {
    pub run_id: Uuid,
    pub seed_id: DocumentId,
    pub state: RunState,
    pub progress: ProgressSnapshot,
    /// Present once the run reached a terminal state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ExpansionReport>,
}

impl RunStatusResponse {
    fn from_handle(handle: &RunHandle) -> Self {
        Self {
            run_id: handle.run_id(),
            seed_id: handle.seed_id(),
            state: handle.state(),
            progress: handle.progress(),
            report: handle.report(),
        }
    }
}

/// Trigger a run; returns immediately with the run id
pub async fn start_expansion(
    State(state): State<AppState>,
    Json(request): Json<StartExpansionRequest>,
) -> Result<(StatusCode, Json<StartExpansionResponse>)> {
    validate(&request)?;

    let expansion = ExpansionRequest {
        seed_id: request.seed_id,
        max_depth: request.max_depth,
        concurrency: request.concurrency,
    };
    let handle = state.controller.start(expansion)?;
    let run_id = handle.run_id();

    tracing::info!(
        run_id = %run_id,
        seed_id = %request.seed_id,
        "Expansion run accepted"
    );

    let response = StartExpansionResponse {
        run_id,
        seed_id: handle.seed_id(),
        state: handle.state(),
        status_url: format!("/v1/expansions/{}", run_id),
    };
    state.runs.insert(handle);

    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// Current state, progress and (when finished) the report of a run
pub async fn get_expansion(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<RunStatusResponse>> {
    let handle = find_run(&state, run_id)?;
    Ok(Json(RunStatusResponse::from_handle(&handle)))
}

/// Request cancellation; completed work stays in the graph
pub async fn cancel_expansion(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<(StatusCode, Json<RunStatusResponse>)> {
    let handle = find_run(&state, run_id)?;
    if !handle.cancel() {
        return Err(AppError::RunAlreadyFinished {
            id: run_id.to_string(),
        });
    }

    tracing::info!(run_id = %run_id, "Expansion run cancellation requested");
    Ok((
        StatusCode::ACCEPTED,
        Json(RunStatusResponse::from_handle(&handle)),
    ))
}

fn find_run(state: &AppState, run_id: Uuid) -> Result<RunHandle> {
    state.runs.get(&run_id).ok_or_else(|| AppError::RunNotFound {
        id: run_id.to_string(),
    })
}
