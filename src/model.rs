use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds. The only time type.
pub type Ms = i64;

pub const HOUR_MS: Ms = 3_600_000;
pub const DAY_MS: Ms = 24 * HOUR_MS;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// Checked constructor for untrusted input.
    pub fn try_new(start: Ms, end: Ms) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Intervals that merely touch at an endpoint do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Intersection with `window`. Caller guarantees the two overlap.
    pub fn clamp_to(&self, window: &Span) -> Span {
        Span::new(self.start.max(window.start), self.end.min(window.end))
    }
}

/// A committed reservation of one court.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub venue_id: Ulid,
    pub court_number: String,
    pub span: Span,
    pub booked_by: String,
    /// Creation instant.
    pub booking_date: Ms,
}

/// Owner written on every slot produced by the daily grid generator.
pub const AUTO_SLOT_OWNER: &str = "AUTO";

/// A pre-generated one-hour unit on a court.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: Ulid,
    pub venue_id: Ulid,
    pub court_number: String,
    pub span: Span,
    pub booked_by: String,
}

/// Uniqueness key of a slot within its venue.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotKey {
    pub court_number: String,
    pub start: Ms,
    pub end: Ms,
}

impl SlotKey {
    pub fn new(court_number: &str, span: &Span) -> Self {
        Self {
            court_number: court_number.to_string(),
            start: span.start,
            end: span.end,
        }
    }
}

/// Bookings of a single court, sorted by `span.start`.
#[derive(Debug, Clone, Default)]
pub struct CourtSchedule {
    pub bookings: Vec<Booking>,
}

impl CourtSchedule {
    /// Insert booking maintaining sort order by span.start.
    pub fn insert(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.span.start, |b| b.span.start)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    pub fn remove(&mut self, id: Ulid) -> Option<Booking> {
        let pos = self.bookings.iter().position(|b| b.id == id)?;
        Some(self.bookings.remove(pos))
    }

    pub fn is_empty(&self) -> bool {
        self.bookings.is_empty()
    }

    /// Bookings whose span overlaps the query window.
    /// Uses binary search to skip bookings starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Booking> {
        // Everything at index >= right_bound starts at or after query.end → can't overlap.
        let right_bound = self
            .bookings
            .partition_point(|b| b.span.start < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.span.end > query.start)
    }
}

#[derive(Debug, Clone)]
pub struct VenueState {
    pub id: Ulid,
    pub name: String,
    /// Number of physical courts. Informational for admission; drives
    /// availability reporting and the slot grid.
    pub max_courts: u32,
    pub created_at: Ms,
    /// Court number → bookings on that court.
    pub courts: BTreeMap<String, CourtSchedule>,
    pub slots: BTreeMap<SlotKey, Slot>,
    /// Set under the write lock when the venue is deleted, so handles taken
    /// before the removal stop accepting writes.
    pub retired: bool,
}

impl VenueState {
    pub fn new(id: Ulid, name: String, max_courts: u32, created_at: Ms) -> Self {
        Self {
            id,
            name,
            max_courts,
            created_at,
            courts: BTreeMap::new(),
            slots: BTreeMap::new(),
            retired: false,
        }
    }

    pub fn info(&self) -> VenueInfo {
        VenueInfo {
            id: self.id,
            name: self.name.clone(),
            max_courts: self.max_courts,
            created_at: self.created_at,
        }
    }

    pub fn insert_booking(&mut self, booking: Booking) {
        self.courts
            .entry(booking.court_number.clone())
            .or_default()
            .insert(booking);
    }

    pub fn remove_booking(&mut self, court_number: &str, id: Ulid) -> Option<Booking> {
        let court = self.courts.get_mut(court_number)?;
        let removed = court.remove(id);
        if court.is_empty() {
            self.courts.remove(court_number);
        }
        removed
    }

    pub fn find_booking(&self, id: Ulid) -> Option<&Booking> {
        self.bookings().find(|b| b.id == id)
    }

    pub fn bookings(&self) -> impl Iterator<Item = &Booking> {
        self.courts.values().flat_map(|c| c.bookings.iter())
    }

    pub fn booking_count(&self) -> usize {
        self.courts.values().map(|c| c.bookings.len()).sum()
    }

    /// Bookings across every court of the venue that overlap `query`.
    pub fn overlapping_bookings(&self, query: &Span) -> impl Iterator<Item = &Booking> {
        self.courts.values().flat_map(move |c| c.overlapping(query))
    }

    /// Court names used by the slot grid: `Court 1` ..= `Court {max_courts}`.
    pub fn grid_courts(&self) -> impl Iterator<Item = String> {
        (1..=self.max_courts).map(court_label)
    }
}

pub fn court_label(n: u32) -> String {
    format!("Court {n}")
}

/// Sort key for court names: `Court {n}` by number, then any other name
/// lexicographically.
pub fn court_order(name: &str) -> (u32, &str) {
    let index = name
        .strip_prefix("Court ")
        .and_then(|n| n.parse::<u32>().ok())
        .unwrap_or(u32::MAX);
    (index, name)
}

/// WAL record format. Flat, no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    VenueCreated {
        id: Ulid,
        name: String,
        max_courts: u32,
        created_at: Ms,
    },
    VenueUpdated {
        id: Ulid,
        name: String,
        max_courts: u32,
    },
    VenueDeleted {
        id: Ulid,
    },
    BookingCreated {
        id: Ulid,
        venue_id: Ulid,
        court_number: String,
        span: Span,
        booked_by: String,
        booking_date: Ms,
    },
    BookingDeleted {
        id: Ulid,
        venue_id: Ulid,
        court_number: String,
    },
    SlotCreated {
        id: Ulid,
        venue_id: Ulid,
        court_number: String,
        span: Span,
        booked_by: String,
    },
}

impl Event {
    pub fn venue_id(&self) -> Ulid {
        match self {
            Event::VenueCreated { id, .. }
            | Event::VenueUpdated { id, .. }
            | Event::VenueDeleted { id } => *id,
            Event::BookingCreated { venue_id, .. }
            | Event::BookingDeleted { venue_id, .. }
            | Event::SlotCreated { venue_id, .. } => *venue_id,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VenueInfo {
    pub id: Ulid,
    pub name: String,
    pub max_courts: u32,
    pub created_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingWithVenue {
    pub booking: Booking,
    pub venue: VenueInfo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotInfo {
    pub slot: Slot,
    /// True when a booking on the same court overlaps the slot.
    pub is_slot_booked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityInfo {
    pub venue_id: Ulid,
    pub venue_name: String,
    pub max_courts: u32,
    pub booked_courts: u32,
    pub available_courts: u32,
    pub window: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourtScheduleInfo {
    pub court_number: String,
    pub bookings: Vec<Booking>,
    /// Sub-spans of the query window with no booking on this court.
    pub free: Vec<Span>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotGenerationReport {
    /// Midnight (UTC) of the day the grid was generated for.
    pub target_day: Ms,
    pub created_count: usize,
    pub skipped_count: usize,
    pub failed_count: usize,
    pub created: Vec<Slot>,
}

/// Partition of the booking list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BookingFilter {
    #[default]
    All,
    /// `end >= now`, ascending by start.
    Active,
    /// `end < now`, ascending by end.
    Expired,
}

impl FromStr for BookingFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(BookingFilter::All),
            "active" => Ok(BookingFilter::Active),
            "expired" => Ok(BookingFilter::Expired),
            other => Err(format!("unknown booking filter: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking(court: &str, start: Ms, end: Ms) -> Booking {
        Booking {
            id: Ulid::new(),
            venue_id: Ulid::new(),
            court_number: court.into(),
            span: Span::new(start, end),
            booked_by: "tester".into(),
            booking_date: 0,
        }
    }

    #[test]
    fn span_overlap() {
        let ten = 10 * HOUR_MS;
        let eleven = 11 * HOUR_MS;
        let a = Span::new(ten, eleven);
        let touching = Span::new(eleven, 12 * HOUR_MS);
        let straddling = Span::new(ten + HOUR_MS / 2, eleven + HOUR_MS / 2);
        assert!(!a.overlaps(&touching)); // adjacent, not overlapping
        assert!(!touching.overlaps(&a));
        assert!(a.overlaps(&straddling));
        assert!(straddling.overlaps(&a));
    }

    #[test]
    fn span_overlap_containment() {
        let outer = Span::new(100, 400);
        let inner = Span::new(150, 300);
        assert!(outer.overlaps(&inner));
        assert!(inner.overlaps(&outer));
        assert!(outer.overlaps(&outer));
    }

    #[test]
    fn span_single_ms_overlap() {
        assert!(Span::new(100, 201).overlaps(&Span::new(200, 300)));
    }

    #[test]
    fn span_try_new_rejects_empty_and_inverted() {
        assert!(Span::try_new(100, 100).is_none());
        assert!(Span::try_new(200, 100).is_none());
        assert_eq!(Span::try_new(100, 200), Some(Span::new(100, 200)));
    }

    #[test]
    fn span_clamp() {
        let window = Span::new(100, 200);
        assert_eq!(Span::new(50, 150).clamp_to(&window), Span::new(100, 150));
        assert_eq!(Span::new(120, 300).clamp_to(&window), Span::new(120, 200));
    }

    #[test]
    fn court_schedule_ordering() {
        let mut court = CourtSchedule::default();
        court.insert(booking("Court 1", 300, 400));
        court.insert(booking("Court 1", 100, 200));
        court.insert(booking("Court 1", 200, 300));
        let starts: Vec<Ms> = court.bookings.iter().map(|b| b.span.start).collect();
        assert_eq!(starts, vec![100, 200, 300]);
    }

    #[test]
    fn court_schedule_remove() {
        let mut court = CourtSchedule::default();
        let b = booking("Court 1", 100, 200);
        let id = b.id;
        court.insert(b);
        assert!(court.remove(Ulid::new()).is_none());
        assert_eq!(court.remove(id).map(|b| b.id), Some(id));
        assert!(court.is_empty());
    }

    #[test]
    fn overlapping_skips_past_and_future() {
        let mut court = CourtSchedule::default();
        court.insert(booking("Court 1", 100, 200));
        court.insert(booking("Court 1", 450, 600));
        court.insert(booking("Court 1", 1000, 1100));

        let hits: Vec<_> = court.overlapping(&Span::new(500, 800)).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].span, Span::new(450, 600));
    }

    #[test]
    fn overlapping_adjacent_not_included() {
        let mut court = CourtSchedule::default();
        court.insert(booking("Court 1", 100, 200));
        assert_eq!(court.overlapping(&Span::new(200, 300)).count(), 0);
        assert_eq!(court.overlapping(&Span::new(0, 100)).count(), 0);
    }

    #[test]
    fn overlapping_long_booking_spanning_query() {
        let mut court = CourtSchedule::default();
        court.insert(booking("Court 1", 0, 10_000));
        assert_eq!(court.overlapping(&Span::new(500, 600)).count(), 1);
    }

    #[test]
    fn venue_bookings_grouped_by_court() {
        let mut venue = VenueState::new(Ulid::new(), "Arena".into(), 2, 0);
        let a = booking("Court 1", 100, 200);
        let b = booking("Court 2", 100, 200);
        let a_id = a.id;
        venue.insert_booking(a);
        venue.insert_booking(b);
        assert_eq!(venue.booking_count(), 2);
        assert_eq!(venue.overlapping_bookings(&Span::new(150, 160)).count(), 2);

        assert!(venue.remove_booking("Court 2", a_id).is_none());
        assert!(venue.remove_booking("Court 1", a_id).is_some());
        assert!(!venue.courts.contains_key("Court 1"));
        assert_eq!(venue.booking_count(), 1);
    }

    #[test]
    fn court_order_is_numeric() {
        let mut courts = vec!["Court 10", "Annex", "Court 2", "Court 1"];
        courts.sort_by(|a, b| court_order(a).cmp(&court_order(b)));
        assert_eq!(courts, ["Court 1", "Court 2", "Court 10", "Annex"]);
    }

    #[test]
    fn grid_courts_are_one_based() {
        let venue = VenueState::new(Ulid::new(), "Arena".into(), 3, 0);
        let courts: Vec<String> = venue.grid_courts().collect();
        assert_eq!(courts, vec!["Court 1", "Court 2", "Court 3"]);
    }

    #[test]
    fn booking_filter_parse() {
        assert_eq!("ACTIVE".parse::<BookingFilter>(), Ok(BookingFilter::Active));
        assert_eq!("expired".parse::<BookingFilter>(), Ok(BookingFilter::Expired));
        assert_eq!("all".parse::<BookingFilter>(), Ok(BookingFilter::All));
        assert!("upcoming".parse::<BookingFilter>().is_err());
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::BookingCreated {
            id: Ulid::new(),
            venue_id: Ulid::new(),
            court_number: "Court 3".into(),
            span: Span::new(1000, 2000),
            booked_by: "Alice".into(),
            booking_date: 500,
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
