/// Longest booking a single request may cover, in days (inclusive range).
pub const MAX_RANGE_DAYS: i64 = 366;

/// Upper bound on how far `suggest_alternatives` may look ahead.
pub const MAX_HORIZON_DAYS: u32 = 366;

/// Default look-ahead for alternative dates.
pub const DEFAULT_HORIZON_DAYS: u32 = 60;

/// Default number of alternative ranges returned with an unavailable answer.
pub const DEFAULT_MAX_SUGGESTIONS: usize = 3;

pub const MAX_SUGGESTIONS: usize = 31;

pub const MAX_SPACE_TYPE_LEN: usize = 64;

pub const MAX_SPACE_TYPES: usize = 64;

/// Largest accepted control-protocol line, in bytes.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Reservations returned by one `list_reservations` request.
pub const MAX_LIST_RESULTS: usize = 10_000;

/// Scheduler interval bounds, in minutes.
pub const MIN_INTERVAL_MINUTES: u32 = 15;
pub const MAX_INTERVAL_MINUTES: u32 = 1440;

/// Longest `creation_timeout_days` the scheduler accepts.
pub const MAX_CREATION_TIMEOUT_DAYS: u32 = 3650;

/// Longest expiration or completion window, in hours.
pub const MAX_WINDOW_HOURS: u32 = 8760;
