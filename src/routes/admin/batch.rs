use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use serde::Deserialize;

use crate::auth::AdminAuth;
use crate::constants::MAX_MANUAL_BATCH_SIZE;
use crate::extractors::JsonBody;
use crate::response::{ok, AppError};
use crate::scoring::types::Priority;
use crate::state::AppState;
use crate::store::operations::batch_runs::BatchTrigger;
use crate::workers::batch_scoring::BatchOptions;
use crate::workers::collection_index;

pub fn router() -> Router<AppState> {
    Router::new().route("/run", post(run_batch))
}

pub fn collections_router() -> Router<AppState> {
    Router::new().route("/run", post(run_collections))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunBatchRequest {
    limit: Option<usize>,
    min_priority: Option<Priority>,
}

/// Synchronous manual run; the response carries the batch report.
async fn run_batch(
    _admin: AdminAuth,
    State(state): State<AppState>,
    body: Option<JsonBody<RunBatchRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let req = body.map(|JsonBody(req)| req).unwrap_or_default();
    let default_limit = state.engine().get_config().await.batch.batch_size;
    let limit = req.limit.unwrap_or(default_limit);
    if limit == 0 || limit > MAX_MANUAL_BATCH_SIZE {
        return Err(AppError::bad_request(
            "INVALID_LIMIT",
            &format!("limit must be within 1..={MAX_MANUAL_BATCH_SIZE}"),
        ));
    }

    let report = state
        .batch_worker()
        .run_with(BatchOptions {
            trigger: BatchTrigger::Manual,
            limit,
            min_priority: req.min_priority.unwrap_or(Priority::Low),
        })
        .await?;
    Ok(ok(report))
}

async fn run_collections(
    _admin: AdminAuth,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let config = state.engine().get_config().await;
    let mut indices = Vec::new();
    for collection_id in state.store().list_collections()? {
        indices.push(collection_index::recompute_collection(
            state.store(),
            &collection_id,
            &config.collection,
        )?);
    }
    tracing::info!(collections = indices.len(), "Manual collection index run complete");
    Ok(ok(indices))
}
