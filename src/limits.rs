//! Hard bounds on request sizes.

/// Longest equipment name accepted.
pub const MAX_NAME_LEN: usize = 200;

/// Longest category accepted.
pub const MAX_CATEGORY_LEN: usize = 100;

/// Longest rejection/cancellation reason accepted.
pub const MAX_REASON_LEN: usize = 1_000;

/// Widest availability calendar window, in days.
pub const MAX_CALENDAR_DAYS: i64 = 366;

pub const DEFAULT_PER_PAGE: usize = 10;
pub const MAX_PER_PAGE: usize = 100;

/// Approved reservations cannot be cancelled once their start is closer than this.
pub const CANCEL_LEAD_TIME_HOURS: i64 = 24;
