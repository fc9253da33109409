use crate::model::{DAY_MS, Ms};

pub const MAX_VENUES: usize = 10_000;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_COURT_NUMBER_LEN: usize = 64;
pub const MAX_BOOKED_BY_LEN: usize = 256;
pub const MAX_COURTS_PER_VENUE: u32 = 256;
pub const MAX_BOOKINGS_PER_VENUE: usize = 1_000_000;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2100-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// A single booking may not exceed one week.
pub const MAX_SPAN_DURATION_MS: Ms = 7 * DAY_MS;
/// Availability and schedule queries may not exceed one year.
pub const MAX_QUERY_WINDOW_MS: Ms = 366 * DAY_MS;
