use std::collections::BTreeSet;

use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::{court_free_spans, venue_availability};
use super::conflict::validate_span;
use super::{Engine, EngineError, SharedVenueState};

fn validate_window(start: Ms, end: Ms) -> Result<Span, EngineError> {
    let window = validate_span(start, end)?;
    if window.duration_ms() > MAX_QUERY_WINDOW_MS {
        return Err(EngineError::LimitExceeded("query window too wide"));
    }
    Ok(window)
}

impl Engine {
    /// All venues, sorted by name.
    pub async fn list_venues(&self) -> Vec<VenueInfo> {
        let states: Vec<SharedVenueState> = self.venues.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(states.len());
        for vs in states {
            let guard = vs.read().await;
            if !guard.retired {
                out.push(guard.info());
            }
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub async fn get_venue(&self, id: Ulid) -> Result<VenueInfo, EngineError> {
        let vs = self.get_venue_state(&id).ok_or(EngineError::VenueNotFound(id))?;
        let guard = vs.read().await;
        if guard.retired {
            return Err(EngineError::VenueNotFound(id));
        }
        Ok(guard.info())
    }

    pub async fn get_booking(&self, id: Ulid) -> Result<BookingWithVenue, EngineError> {
        let venue_id = self
            .get_venue_for_booking(&id)
            .ok_or(EngineError::BookingNotFound(id))?;
        let vs = self
            .get_venue_state(&venue_id)
            .ok_or(EngineError::BookingNotFound(id))?;
        let guard = vs.read().await;
        let booking = guard
            .find_booking(id)
            .cloned()
            .ok_or(EngineError::BookingNotFound(id))?;
        Ok(BookingWithVenue { booking, venue: guard.info() })
    }

    /// Bookings partitioned by `filter` relative to `now`, each paired with
    /// its venue. `venue_id` narrows the listing to one venue.
    pub async fn list_bookings(
        &self,
        filter: BookingFilter,
        venue_id: Option<Ulid>,
        now: Ms,
    ) -> Result<Vec<BookingWithVenue>, EngineError> {
        let states: Vec<SharedVenueState> = match venue_id {
            Some(id) => vec![self.get_venue_state(&id).ok_or(EngineError::VenueNotFound(id))?],
            None => self.venues.iter().map(|e| e.value().clone()).collect(),
        };

        let mut out = Vec::new();
        for vs in states {
            let guard = vs.read().await;
            if guard.retired {
                if venue_id.is_some() {
                    return Err(EngineError::VenueNotFound(guard.id));
                }
                continue;
            }
            let venue = guard.info();
            let keep = |b: &Booking| match filter {
                BookingFilter::All => true,
                BookingFilter::Active => b.span.end >= now,
                BookingFilter::Expired => b.span.end < now,
            };
            out.extend(guard.bookings().filter(|b| keep(*b)).map(|b| BookingWithVenue {
                booking: b.clone(),
                venue: venue.clone(),
            }));
        }

        match filter {
            BookingFilter::Expired => {
                out.sort_by_key(|e| (e.booking.span.end, e.booking.span.start, e.booking.id))
            }
            BookingFilter::All | BookingFilter::Active => {
                out.sort_by_key(|e| (e.booking.span.start, e.booking.span.end, e.booking.id))
            }
        }
        Ok(out)
    }

    /// How many courts of a venue are free over `[start, end)`.
    pub async fn get_availability(
        &self,
        venue_id: Ulid,
        start: Ms,
        end: Ms,
    ) -> Result<AvailabilityInfo, EngineError> {
        let window = validate_window(start, end)?;
        let vs = self
            .get_venue_state(&venue_id)
            .ok_or(EngineError::VenueNotFound(venue_id))?;
        let guard = vs.read().await;
        if guard.retired {
            return Err(EngineError::VenueNotFound(venue_id));
        }
        Ok(venue_availability(&guard, &window))
    }

    /// Per-court bookings and free time over `[start, end)`. Covers the grid
    /// courts plus any other court holding a booking in the window.
    pub async fn get_court_schedule(
        &self,
        venue_id: Ulid,
        start: Ms,
        end: Ms,
    ) -> Result<Vec<CourtScheduleInfo>, EngineError> {
        let window = validate_window(start, end)?;
        let vs = self
            .get_venue_state(&venue_id)
            .ok_or(EngineError::VenueNotFound(venue_id))?;
        let guard = vs.read().await;
        if guard.retired {
            return Err(EngineError::VenueNotFound(venue_id));
        }

        let grid: Vec<String> = guard.grid_courts().collect();
        let extra: BTreeSet<&String> = guard
            .courts
            .iter()
            .filter(|&(name, court)| !grid.contains(name) && court.overlapping(&window).next().is_some())
            .map(|(name, _)| name)
            .collect();

        let schedule = grid
            .iter()
            .chain(extra)
            .map(|name| {
                let court = guard.courts.get(name);
                CourtScheduleInfo {
                    court_number: name.clone(),
                    bookings: court
                        .map(|c| c.overlapping(&window).cloned().collect())
                        .unwrap_or_default(),
                    free: court_free_spans(court, &window),
                }
            })
            .collect();
        Ok(schedule)
    }

    /// Generated slots of a venue, ordered by court then start, optionally
    /// limited to those overlapping `window`.
    pub async fn list_slots(
        &self,
        venue_id: Ulid,
        window: Option<(Ms, Ms)>,
    ) -> Result<Vec<SlotInfo>, EngineError> {
        let window = window.map(|(s, e)| validate_window(s, e)).transpose()?;
        let vs = self
            .get_venue_state(&venue_id)
            .ok_or(EngineError::VenueNotFound(venue_id))?;
        let guard = vs.read().await;
        if guard.retired {
            return Err(EngineError::VenueNotFound(venue_id));
        }

        let mut slots: Vec<SlotInfo> = guard
            .slots
            .values()
            .filter(|s| window.is_none_or(|w| s.span.overlaps(&w)))
            .map(|s| SlotInfo {
                is_slot_booked: guard
                    .courts
                    .get(&s.court_number)
                    .is_some_and(|c| c.overlapping(&s.span).next().is_some()),
                slot: s.clone(),
            })
            .collect();
        // Map order is by court name as a string; "Court 10" belongs after "Court 2".
        slots.sort_by(|a, b| {
            court_order(&a.slot.court_number)
                .cmp(&court_order(&b.slot.court_number))
                .then(a.slot.span.start.cmp(&b.slot.span.start))
        });
        Ok(slots)
    }
}
