pub mod batch;
pub mod settings;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::Serialize;

use crate::auth::AdminAuth;
use crate::constants::BATCH_HISTORY_LIMIT;
use crate::response::{ok, AppError};
use crate::state::AppState;
use crate::store::operations::batch_runs::BatchReport;
use crate::store::operations::dirty_queue::QueueStats;
use crate::workers::batch_scoring::WorkerStats;

pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/batch", batch::router())
        .nest("/collections", batch::collections_router())
        .nest("/config", settings::router())
        .route("/queue", get(queue_overview))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueueOverview {
    queue: QueueStats,
    worker: WorkerStats,
    last_run: Option<BatchReport>,
    recent_runs: Vec<BatchReport>,
}

async fn queue_overview(
    _admin: AdminAuth,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let config = state.engine().get_config().await;
    let claim_timeout = chrono::Duration::seconds(config.batch.claim_timeout_secs);
    let queue = state.store().dirty_queue_stats(claim_timeout)?;
    let recent_runs = state.store().recent_batch_runs(BATCH_HISTORY_LIMIT)?;

    Ok(ok(QueueOverview {
        queue,
        worker: state.batch_worker().stats(),
        last_run: recent_runs.first().cloned(),
        recent_runs,
    }))
}
