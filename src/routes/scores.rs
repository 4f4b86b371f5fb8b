use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::response::{ok, AppError};
use crate::scoring::types::{PublishState, PublishedScore, ScoreBreakdown};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/:item_id", get(get_score))
}

/// Public view of the last published score. Gate bookkeeping stays internal
/// apart from the state name.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScoreView {
    item_id: String,
    score: f64,
    confidence: f64,
    provisional: bool,
    breakdown: ScoreBreakdown,
    vote_count: u64,
    state: PublishState,
    published_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl From<PublishedScore> for ScoreView {
    fn from(s: PublishedScore) -> Self {
        Self {
            item_id: s.item_id,
            score: s.score,
            confidence: s.confidence,
            provisional: s.provisional,
            breakdown: s.breakdown,
            vote_count: s.vote_count,
            state: s.state,
            published_at: s.published_at,
            updated_at: s.updated_at,
        }
    }
}

async fn get_score(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if !state.store().item_exists(&item_id)? {
        return Err(AppError::not_found("Item not found"));
    }
    let score = match state.store().get_published_score(&item_id)? {
        Some(score) => score,
        None => {
            let neutral = state.engine().get_config().await.slider.neutral_value;
            PublishedScore::unscored(&item_id, neutral)
        }
    };
    Ok(ok(ScoreView::from(score)))
}
