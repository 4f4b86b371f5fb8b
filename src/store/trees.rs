pub const ITEMS: &str = "items";
pub const COLLECTION_ITEMS: &str = "collection_items";

// Event streams
pub const COMPARISON_EVENTS: &str = "comparison_events";
pub const SLIDER_EVENTS: &str = "slider_events";
pub const FAVORITE_EVENTS: &str = "favorite_events";
pub const ITEM_EVENT_INDEX: &str = "item_event_index";

// Derived state
pub const ITEM_STATES: &str = "item_states";
pub const VOTER_STATES: &str = "voter_states";
pub const PUBLISHED_SCORES: &str = "published_scores";
pub const COLLECTION_INDICES: &str = "collection_indices";

// Batch bookkeeping
pub const DIRTY_QUEUE: &str = "dirty_queue";
pub const BATCH_RUNS: &str = "batch_runs";

pub const CONFIG_VERSIONS: &str = "config_versions";
