pub mod batch_runs;
pub mod collections;
pub mod commit;
pub mod dirty_queue;
pub mod events;
pub mod item_states;
pub mod items;
pub mod scoring_configs;
pub mod voters;
