use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::extractors::JsonBody;
use crate::response::{created, ok, AppError};
use crate::scoring::types::Priority;
use crate::state::AppState;
use crate::store::operations::dirty_queue::DirtyEntry;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(register_item))
        .route("/:item_id", get(get_item))
        .route("/:item_id/state", get(get_item_state))
        .route("/:item_id/dirty", post(mark_item_dirty))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterItemRequest {
    item_id: String,
    collection_id: String,
}

async fn register_item(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RegisterItemRequest>,
) -> Result<impl IntoResponse, AppError> {
    let item = state
        .store()
        .register_item(req.item_id.trim(), req.collection_id.trim())?;
    tracing::info!(item_id = %item.item_id, collection_id = %item.collection_id, "Item registered");
    Ok(created(item))
}

async fn get_item(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let item = state
        .store()
        .get_item(&item_id)?
        .ok_or_else(|| AppError::not_found("Item not found"))?;
    Ok(ok(item))
}

/// Stored rating state plus the score it would compose to right now. Pending
/// events are not folded here; that is the batch worker's job.
async fn get_item_state(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let config = state.engine().get_config().await;
    let preview = state
        .engine()
        .preview_item(&item_id, &config)?
        .ok_or_else(|| AppError::not_found("Item not found"))?;
    let dirty = state.store().get_dirty_entry(&item_id)?;
    Ok(ok(ItemStateView { preview, dirty }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ItemStateView {
    #[serde(flatten)]
    preview: crate::scoring::engine::ItemPreview,
    dirty: Option<DirtyEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarkDirtyRequest {
    #[serde(default)]
    priority: Priority,
}

async fn mark_item_dirty(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
    body: Option<JsonBody<MarkDirtyRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let priority = body.map(|JsonBody(req)| req.priority).unwrap_or_default();
    if !state.store().item_exists(&item_id)? {
        return Err(AppError::not_found("Item not found"));
    }
    let entry = state.store().mark_dirty(&item_id, priority)?;
    let triggered = priority == Priority::High
        && state.config().worker.enable_priority_trigger
        && state.batch_worker().trigger_priority();
    Ok(ok(serde_json::json!({
        "entry": entry,
        "priorityRunTriggered": triggered,
    })))
}
