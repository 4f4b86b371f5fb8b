/// Maximum compare-and-swap attempts before giving up with `CasRetryExhausted`.
pub const MAX_CAS_RETRIES: u32 = 20;

/// Batch history entries returned by the admin queue endpoint.
pub const BATCH_HISTORY_LIMIT: usize = 20;

/// Upper bound on `limit` for manual batch runs.
pub const MAX_MANUAL_BATCH_SIZE: usize = 2_000;

/// Admin tokens shorter than this leave the admin API disabled.
pub const MIN_ADMIN_TOKEN_LEN: usize = 16;

pub const MAX_SLIDER_SCORE: f64 = 100.0;

/// Grace periods longer than a week are rejected as configuration errors.
pub const MAX_GRACE_PERIOD_MINUTES: i64 = 7 * 24 * 60;

/// Slack added on top of a batch run's own time budget before the scheduler
/// gives up on it.
pub const RUN_DEADLINE_MARGIN_SECS: u64 = 60;
