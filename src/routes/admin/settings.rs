use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::Serialize;

use crate::auth::AdminAuth;
use crate::extractors::JsonBody;
use crate::response::{ok, AppError};
use crate::scoring::config::ScoringConfig;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_config).put(update_config))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigView {
    /// Last accepted runtime version; `None` while running on startup config.
    version: Option<u32>,
    config: ScoringConfig,
}

async fn get_config(
    _admin: AdminAuth,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let config = state.engine().get_config().await;
    let version = state
        .store()
        .latest_scoring_config()?
        .map(|saved| saved.version);
    Ok(ok(ConfigView { version, config }))
}

/// Validate, apply and record a new scoring config. Takes effect from the
/// next claimed item; runs in progress keep the config they started with.
async fn update_config(
    _admin: AdminAuth,
    State(state): State<AppState>,
    JsonBody(config): JsonBody<ScoringConfig>,
) -> Result<impl IntoResponse, AppError> {
    state.engine().reload_config(config.clone()).await?;
    let saved = state.store().save_scoring_config(&config)?;
    tracing::info!(version = saved.version, "Scoring config updated via admin API");
    Ok(ok(ConfigView {
        version: Some(saved.version),
        config,
    }))
}
