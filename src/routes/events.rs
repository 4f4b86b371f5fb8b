use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::extractors::JsonBody;
use crate::response::{created, AppError};
use crate::scoring::types::ComparisonOutcome;
use crate::services::ingest::{self, Ingested};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/comparisons", post(record_comparison))
        .route("/sliders", post(record_slider))
        .route("/favorites", post(record_favorite))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EventReceipt<E: Serialize> {
    #[serde(flatten)]
    ingested: Ingested<E>,
    priority_run_triggered: bool,
}

/// High-priority events kick a small background batch so the affected items
/// update before the next scheduled run. The response never waits on it.
fn receipt<E: Serialize>(state: &AppState, ingested: Ingested<E>) -> EventReceipt<E> {
    let priority_run_triggered = ingested.wants_priority_run()
        && state.config().worker.enable_priority_trigger
        && state.batch_worker().trigger_priority();
    EventReceipt {
        ingested,
        priority_run_triggered,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ComparisonRequest {
    item_a: String,
    item_b: String,
    outcome: ComparisonOutcome,
    voter_id: String,
    #[serde(default)]
    super_vote: bool,
}

async fn record_comparison(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ComparisonRequest>,
) -> Result<impl IntoResponse, AppError> {
    let ingested = ingest::ingest_comparison(
        state.store(),
        &req.item_a,
        &req.item_b,
        req.outcome,
        &req.voter_id,
        req.super_vote,
    )?;
    Ok(created(receipt(&state, ingested)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SliderRequest {
    voter_id: String,
    item_id: String,
    raw_score: f64,
}

async fn record_slider(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<SliderRequest>,
) -> Result<impl IntoResponse, AppError> {
    let ingested = ingest::ingest_slider(state.store(), &req.voter_id, &req.item_id, req.raw_score)?;
    Ok(created(receipt(&state, ingested)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FavoriteRequest {
    voter_id: String,
    item_id: String,
}

async fn record_favorite(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<FavoriteRequest>,
) -> Result<impl IntoResponse, AppError> {
    let ingested = ingest::ingest_favorite(state.store(), &req.voter_id, &req.item_id)?;
    Ok(created(receipt(&state, ingested)))
}
