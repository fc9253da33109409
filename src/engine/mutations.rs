use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use tokio::sync::{RwLock, oneshot};
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{check_no_conflict, now_ms, validate_max_courts, validate_span, validate_text};
use super::{Engine, EngineError, SharedVenueState, WalCommand};

impl Engine {
    pub async fn create_venue(&self, name: &str, max_courts: u32) -> Result<VenueInfo, EngineError> {
        let name = validate_text("name", name, MAX_NAME_LEN)?;
        validate_max_courts(max_courts)?;
        let _commit = self.commit_gate.read().await;
        if self.venues.len() >= MAX_VENUES {
            return Err(EngineError::LimitExceeded("too many venues"));
        }

        // Reserve the name before the WAL append; two creates racing on the
        // same name see the entry atomically.
        let id = Ulid::new();
        match self.names.entry(name.clone()) {
            Entry::Occupied(_) => return Err(EngineError::DuplicateName(name)),
            Entry::Vacant(slot) => {
                slot.insert(id);
            }
        }

        let created_at = now_ms();
        let event = Event::VenueCreated { id, name: name.clone(), max_courts, created_at };
        if let Err(e) = self.wal_append(&event).await {
            self.names.remove(&name);
            return Err(e);
        }
        let vs = VenueState::new(id, name, max_courts, created_at);
        let info = vs.info();
        self.venues.insert(id, Arc::new(RwLock::new(vs)));
        self.notify.send(id, &event);
        metrics::gauge!(crate::observability::VENUES_ACTIVE).set(self.venues.len() as f64);
        info!(venue_id = %id, name = %info.name, max_courts, "venue created");
        Ok(info)
    }

    /// Rename and/or resize a venue. Fields left as `None` keep their value.
    pub async fn update_venue(
        &self,
        id: Ulid,
        name: Option<&str>,
        max_courts: Option<u32>,
    ) -> Result<VenueInfo, EngineError> {
        let new_name = name
            .map(|n| validate_text("name", n, MAX_NAME_LEN))
            .transpose()?;
        if let Some(mc) = max_courts {
            validate_max_courts(mc)?;
        }
        let _commit = self.commit_gate.read().await;
        let mut guard = self.venue_write(id).await?;

        let old_name = guard.name.clone();
        let name = new_name.unwrap_or_else(|| old_name.clone());
        let max_courts = max_courts.unwrap_or(guard.max_courts);
        let renamed = name != old_name;
        if renamed {
            match self.names.entry(name.clone()) {
                Entry::Occupied(_) => return Err(EngineError::DuplicateName(name)),
                Entry::Vacant(slot) => {
                    slot.insert(id);
                }
            }
        }

        let event = Event::VenueUpdated { id, name: name.clone(), max_courts };
        if let Err(e) = self.persist_and_apply(&mut guard, &event).await {
            if renamed {
                self.names.remove(&name);
            }
            return Err(e);
        }
        if renamed {
            self.names.remove(&old_name);
        }
        info!(venue_id = %id, name = %name, max_courts, "venue updated");
        Ok(guard.info())
    }

    /// Delete a venue that holds no bookings. Its generated slots go with it.
    pub async fn delete_venue(&self, id: Ulid) -> Result<(), EngineError> {
        let _commit = self.commit_gate.read().await;
        let mut guard = self.venue_write(id).await?;
        let bookings = guard.booking_count();
        if bookings > 0 {
            return Err(EngineError::VenueHasBookings { id, bookings });
        }

        let event = Event::VenueDeleted { id };
        self.wal_append(&event).await?;
        guard.retired = true;
        self.venues.remove(&id);
        self.names.remove(&guard.name);
        self.notify.send(id, &event);
        self.notify.remove(&id);
        metrics::gauge!(crate::observability::VENUES_ACTIVE).set(self.venues.len() as f64);
        info!(venue_id = %id, slots = guard.slots.len(), "venue deleted");
        Ok(())
    }

    /// Reserve `court_number` at `venue_id` for `[start, end)`.
    ///
    /// Admission is per-court exclusivity: the request is rejected when any
    /// booking on the same court overlaps it. The venue write lock is held
    /// from the conflict check until the booking is applied, so concurrent
    /// requests for the same court are serialized and exactly one wins.
    pub async fn create_booking(
        &self,
        venue_id: Ulid,
        court_number: &str,
        start: Ms,
        end: Ms,
        booked_by: &str,
    ) -> Result<Booking, EngineError> {
        let court_number = validate_text("court_number", court_number, MAX_COURT_NUMBER_LEN)?;
        let booked_by = validate_text("booked_by", booked_by, MAX_BOOKED_BY_LEN)?;
        let span = validate_span(start, end)?;
        if span.duration_ms() > MAX_SPAN_DURATION_MS {
            return Err(EngineError::LimitExceeded("booking too long"));
        }

        let _commit = self.commit_gate.read().await;
        let mut guard = self.venue_write(venue_id).await?;
        if guard.booking_count() >= MAX_BOOKINGS_PER_VENUE {
            return Err(EngineError::LimitExceeded("too many bookings on venue"));
        }
        if let Err(e) = check_no_conflict(&guard, &court_number, &span) {
            metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            debug!(venue_id = %venue_id, court = %court_number, "booking rejected: {e}");
            return Err(e);
        }

        let booking = Booking {
            id: Ulid::new(),
            venue_id,
            court_number,
            span,
            booked_by,
            booking_date: now_ms(),
        };
        let event = Event::BookingCreated {
            id: booking.id,
            venue_id,
            court_number: booking.court_number.clone(),
            span,
            booked_by: booking.booked_by.clone(),
            booking_date: booking.booking_date,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(crate::observability::BOOKINGS_CREATED_TOTAL).increment(1);
        info!(
            booking_id = %booking.id,
            venue_id = %venue_id,
            court = %booking.court_number,
            start = span.start,
            end = span.end,
            "booking created"
        );
        Ok(booking)
    }

    /// Remove a booking, returning the removed record.
    pub async fn delete_booking(&self, id: Ulid) -> Result<Booking, EngineError> {
        let _commit = self.commit_gate.read().await;
        let mut guard = self.resolve_booking_write(id).await?;
        let booking = guard
            .find_booking(id)
            .cloned()
            .ok_or(EngineError::BookingNotFound(id))?;

        let event = Event::BookingDeleted {
            id,
            venue_id: guard.id,
            court_number: booking.court_number.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(crate::observability::BOOKINGS_DELETED_TOTAL).increment(1);
        info!(booking_id = %id, venue_id = %booking.venue_id, "booking deleted");
        Ok(booking)
    }

    /// Compact the WAL by rewriting it with only the events needed to recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _exclusive = self.commit_gate.write().await;

        let states: Vec<SharedVenueState> =
            self.venues.iter().map(|e| e.value().clone()).collect();
        let mut events = Vec::new();
        let mut venues = 0usize;
        for vs in states {
            let guard = vs.read().await;
            if !guard.retired {
                venues += 1;
                emit_venue(&guard, &mut events);
            }
        }

        let events_len = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        info!(venues, events = events_len, "WAL compacted");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

/// Minimal event sequence that recreates one venue.
fn emit_venue(vs: &VenueState, events: &mut Vec<Event>) {
    events.push(Event::VenueCreated {
        id: vs.id,
        name: vs.name.clone(),
        max_courts: vs.max_courts,
        created_at: vs.created_at,
    });
    for slot in vs.slots.values() {
        events.push(Event::SlotCreated {
            id: slot.id,
            venue_id: vs.id,
            court_number: slot.court_number.clone(),
            span: slot.span,
            booked_by: slot.booked_by.clone(),
        });
    }
    for booking in vs.bookings() {
        events.push(Event::BookingCreated {
            id: booking.id,
            venue_id: vs.id,
            court_number: booking.court_number.clone(),
            span: booking.span,
            booked_by: booking.booked_by.clone(),
            booking_date: booking.booking_date,
        });
    }
}
