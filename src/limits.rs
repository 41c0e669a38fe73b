/// Matching dates a single bulk edit may touch.
pub const MAX_BULK_DATES: usize = 90;

/// Widest window, in days, a slot listing may cover.
pub const MAX_LIST_WINDOW_DAYS: i64 = 366;

/// Rows a single guide calendar may hold.
pub const MAX_SLOTS_PER_GUIDE: usize = 50_000;

/// Rows accepted by one `insert_slots` batch.
pub const MAX_INSERT_BATCH: usize = MAX_BULK_DATES * 3;

pub const MAX_TENANTS: usize = 1_000;
pub const MAX_TENANT_NAME_LEN: usize = 128;

/// Journal records larger than this are treated as corrupt on replay.
pub const MAX_JOURNAL_RECORD_LEN: usize = 64 * 1024;
