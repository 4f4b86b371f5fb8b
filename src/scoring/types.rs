use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scoring::config::{EloConfig, ReliabilityConfig};

/// Upper bound on remembered distinct opponents / raters per item. The gate only
/// needs small counts, so the sets stop growing once they hit this size.
pub const DISTINCT_TRACKING_CAP: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStream {
    Comparisons,
    Sliders,
    Favorites,
}

impl EventStream {
    pub const ALL: [EventStream; 3] = [Self::Comparisons, Self::Sliders, Self::Favorites];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Comparisons => "comparisons",
            Self::Sliders => "sliders",
            Self::Favorites => "favorites",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOutcome {
    ItemA,
    ItemB,
    NoPreference,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonEvent {
    pub id: u64,
    pub item_a: String,
    pub item_b: String,
    pub outcome: ComparisonOutcome,
    pub voter_id: String,
    pub super_vote: bool,
    pub created_at: DateTime<Utc>,
}

impl ComparisonEvent {
    /// `(winner, loser)` for resolved votes.
    pub fn resolved(&self) -> Option<(&str, &str)> {
        match self.outcome {
            ComparisonOutcome::ItemA => Some((&self.item_a, &self.item_b)),
            ComparisonOutcome::ItemB => Some((&self.item_b, &self.item_a)),
            ComparisonOutcome::NoPreference => None,
        }
    }

    pub fn opponent_of(&self, item_id: &str) -> Option<&str> {
        if self.item_a == item_id {
            Some(&self.item_b)
        } else if self.item_b == item_id {
            Some(&self.item_a)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SliderEvent {
    pub id: u64,
    pub item_id: String,
    pub voter_id: String,
    pub raw_score: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteEvent {
    pub id: u64,
    pub item_id: String,
    pub voter_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRatingState {
    pub item_id: String,
    pub rating_mean: f64,
    pub rating_uncertainty: f64,
    pub slider_weighted_sum: f64,
    pub slider_weight: f64,
    pub favorite_weighted_sum: f64,
    pub avg_voter_reliability: f64,
    pub total_comparisons: u64,
    pub total_slider_ratings: u64,
    pub total_favorites: u64,
    pub last_comparison_event_id: u64,
    pub last_slider_event_id: u64,
    pub last_favorite_event_id: u64,
    #[serde(default)]
    pub distinct_opponents: BTreeSet<String>,
    #[serde(default)]
    pub distinct_slider_raters: BTreeSet<String>,
    #[serde(default)]
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl ItemRatingState {
    pub fn new(item_id: &str, elo: &EloConfig, reliability: &ReliabilityConfig) -> Self {
        Self {
            item_id: item_id.to_string(),
            rating_mean: elo.initial_rating,
            rating_uncertainty: elo.initial_uncertainty,
            slider_weighted_sum: 0.0,
            slider_weight: 0.0,
            favorite_weighted_sum: 0.0,
            avg_voter_reliability: reliability.initial,
            total_comparisons: 0,
            total_slider_ratings: 0,
            total_favorites: 0,
            last_comparison_event_id: 0,
            last_slider_event_id: 0,
            last_favorite_event_id: 0,
            distinct_opponents: BTreeSet::new(),
            distinct_slider_raters: BTreeSet::new(),
            version: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn watermark(&self, stream: EventStream) -> u64 {
        match stream {
            EventStream::Comparisons => self.last_comparison_event_id,
            EventStream::Sliders => self.last_slider_event_id,
            EventStream::Favorites => self.last_favorite_event_id,
        }
    }

    pub fn advance_watermark(&mut self, stream: EventStream, event_id: u64) {
        let slot = match stream {
            EventStream::Comparisons => &mut self.last_comparison_event_id,
            EventStream::Sliders => &mut self.last_slider_event_id,
            EventStream::Favorites => &mut self.last_favorite_event_id,
        };
        *slot = (*slot).max(event_id);
    }

    pub fn note_opponent(&mut self, opponent_id: &str) {
        if self.distinct_opponents.len() < DISTINCT_TRACKING_CAP {
            self.distinct_opponents.insert(opponent_id.to_string());
        }
    }

    pub fn note_slider_rater(&mut self, voter_id: &str) {
        if self.distinct_slider_raters.len() < DISTINCT_TRACKING_CAP {
            self.distinct_slider_raters.insert(voter_id.to_string());
        }
    }

    pub fn has_events(&self) -> bool {
        self.total_comparisons > 0 || self.total_slider_ratings > 0 || self.total_favorites > 0
    }

    pub fn vote_count(&self) -> u64 {
        self.total_comparisons + self.total_slider_ratings + self.total_favorites
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterCalibration {
    pub voter_id: String,
    pub slider_mean: f64,
    pub slider_variance: f64,
    /// Welford running sum of squared deviations.
    pub slider_m2: f64,
    pub slider_sample_count: u64,
    pub reliability_score: f64,
    pub comparisons_judged: u64,
    #[serde(default)]
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl VoterCalibration {
    pub fn new(voter_id: &str, reliability: &ReliabilityConfig) -> Self {
        Self {
            voter_id: voter_id.to_string(),
            slider_mean: 0.0,
            slider_variance: 0.0,
            slider_m2: 0.0,
            slider_sample_count: 0,
            reliability_score: reliability.initial,
            comparisons_judged: 0,
            version: 0,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PublishState {
    Unscored,
    ProvisionalPublished,
    Published,
    StalePendingRepublish,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub rating_component: f64,
    pub slider_component: f64,
    pub favorite_component: f64,
}

/// Output of the composer before the publish gate has looked at it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposedScore {
    pub score: f64,
    pub confidence: f64,
    pub provisional: bool,
    pub breakdown: ScoreBreakdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedScore {
    pub item_id: String,
    pub score: f64,
    pub confidence: f64,
    pub provisional: bool,
    pub breakdown: ScoreBreakdown,
    pub vote_count: u64,
    pub state: PublishState,
    pub published_at: Option<DateTime<Utc>>,
    /// Set once a non-provisional score has gone out.
    pub published_at_full_confidence: bool,
    pub updated_at: DateTime<Utc>,
}

impl PublishedScore {
    pub fn unscored(item_id: &str, neutral: f64) -> Self {
        Self {
            item_id: item_id.to_string(),
            score: neutral,
            confidence: 0.0,
            provisional: true,
            breakdown: ScoreBreakdown {
                rating_component: neutral,
                slider_component: neutral,
                favorite_component: 0.0,
            },
            vote_count: 0,
            state: PublishState::Unscored,
            published_at: None,
            published_at_full_confidence: false,
            updated_at: Utc::now(),
        }
    }

    pub fn is_published(&self) -> bool {
        self.state != PublishState::Unscored
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low = 0,
    Normal = 1,
    High = 2,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionIndex {
    pub collection_id: String,
    pub index_score: f64,
    pub confidence: f64,
    pub provisional: bool,
    pub mean: f64,
    pub std: f64,
    pub trimmed_mean: f64,
    pub trimmed_std: f64,
    pub cohesion_penalty: f64,
    pub coverage_fraction: f64,
    pub vote_depth_fraction: f64,
    pub coverage_score: f64,
    pub scored_items: usize,
    pub total_items: usize,
    pub computed_at: DateTime<Utc>,
}
