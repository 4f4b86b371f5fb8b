use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

use crate::response::{ok, AppError};
use crate::state::AppState;
use crate::workers::collection_index;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:collection_id/index", get(get_collection_index))
        .route("/:collection_id/items", get(list_collection_items))
}

#[derive(Debug, Default, Deserialize)]
struct IndexQuery {
    #[serde(default)]
    refresh: bool,
}

/// Cached aggregate from the last collection run; computed on demand when
/// missing or when `?refresh=true`.
async fn get_collection_index(
    State(state): State<AppState>,
    Path(collection_id): Path<String>,
    Query(query): Query<IndexQuery>,
) -> Result<impl IntoResponse, AppError> {
    if !query.refresh {
        if let Some(index) = state.store().get_collection_index(&collection_id)? {
            return Ok(ok(index));
        }
    }

    if state.store().list_collection_items(&collection_id)?.is_empty() {
        return Err(AppError::not_found("Collection not found"));
    }
    let config = state.engine().get_config().await;
    let index =
        collection_index::recompute_collection(state.store(), &collection_id, &config.collection)?;
    Ok(ok(index))
}

async fn list_collection_items(
    State(state): State<AppState>,
    Path(collection_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let items = state.store().list_collection_items(&collection_id)?;
    if items.is_empty() {
        return Err(AppError::not_found("Collection not found"));
    }
    Ok(ok(serde_json::json!({
        "collectionId": collection_id,
        "items": items,
    })))
}
