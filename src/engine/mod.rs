mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
mod slots;

pub use availability::{court_free_spans, merge_overlapping, subtract_intervals, venue_availability};
pub use conflict::now_ms;
pub use error::{EngineError, ErrorKind};
pub use slots::{SLOT_FIRST_HOUR, SLOT_LAST_HOUR, next_day_midnight};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock, mpsc, oneshot};
use tracing::{debug, error, info};
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedVenueState = Arc<RwLock<VenueState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
    #[cfg(test)]
    FailNextAppends { count: u64 },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Drain every Append already queued behind it (the batch window).
/// 3. Buffer the whole batch, then one flush_sync.
/// 4. Respond to every sender with the batch result.
///
/// Exits once every `Engine` handle (and so every sender) is dropped.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let WalCommand::Append { event, response } = cmd else {
            handle_non_append(&mut wal, cmd);
            continue;
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;

        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    // Non-append commands run after the current batch is durable.
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        commit_batch(&mut wal, &mut batch);
        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
    debug!("WAL writer stopped");
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    let result = match append_err {
        Some(e) => Err(e),
        None => wal.flush_sync(),
    };
    // Every caller in a failed batch sees the error, so none of its frames
    // may survive into the log.
    if result.is_err()
        && let Err(e) = wal.discard_unsynced()
    {
        error!(error = %e, "failed to roll back WAL batch");
    }
    result
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        #[cfg(test)]
        WalCommand::FailNextAppends { count } => wal.fail_next_appends(count),
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// The booking engine: venue registry, court bookings and slot grid, all
/// persisted through the WAL and held in memory.
///
/// Every venue's state sits behind its own `RwLock`. Writes that must check
/// existing state before committing (booking creation, slot generation,
/// venue deletion) hold the venue's write lock across the check, the WAL
/// append, and the in-memory apply.
pub struct Engine {
    pub(super) venues: DashMap<Ulid, SharedVenueState>,
    /// Venue name → venue id. Enforces name uniqueness.
    pub(super) names: DashMap<String, Ulid>,
    /// Reverse lookup: booking id → venue id.
    pub(super) booking_to_venue: DashMap<Ulid, Ulid>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Held shared by every mutation and exclusively by WAL compaction, so a
    /// compaction snapshot never races an in-flight commit.
    pub(super) commit_gate: RwLock<()>,
    pub notify: Arc<NotifyHub>,
}

/// Apply an event to a venue. Caller holds the venue lock.
fn apply_to_venue(vs: &mut VenueState, event: &Event, booking_map: &DashMap<Ulid, Ulid>) {
    match event {
        Event::VenueUpdated { name, max_courts, .. } => {
            vs.name = name.clone();
            vs.max_courts = *max_courts;
        }
        Event::BookingCreated {
            id,
            venue_id,
            court_number,
            span,
            booked_by,
            booking_date,
        } => {
            vs.insert_booking(Booking {
                id: *id,
                venue_id: *venue_id,
                court_number: court_number.clone(),
                span: *span,
                booked_by: booked_by.clone(),
                booking_date: *booking_date,
            });
            booking_map.insert(*id, *venue_id);
        }
        Event::BookingDeleted { id, court_number, .. } => {
            vs.remove_booking(court_number, *id);
            booking_map.remove(id);
        }
        Event::SlotCreated {
            id,
            venue_id,
            court_number,
            span,
            booked_by,
        } => {
            vs.slots.insert(
                SlotKey::new(court_number, span),
                Slot {
                    id: *id,
                    venue_id: *venue_id,
                    court_number: court_number.clone(),
                    span: *span,
                    booked_by: booked_by.clone(),
                },
            );
        }
        // VenueCreated/Deleted are handled at the DashMap level, not here
        Event::VenueCreated { .. } | Event::VenueDeleted { .. } => {}
    }
}

impl Engine {
    /// Replay the WAL at `wal_path` and start the group-commit writer.
    /// Must be called inside a tokio runtime.
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let (wal, events) = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            venues: DashMap::new(),
            names: DashMap::new(),
            booking_to_venue: DashMap::new(),
            wal_tx,
            commit_gate: RwLock::new(()),
            notify,
        };

        // We're the sole owner of these Arcs during replay, so try_write always
        // succeeds instantly. Never use blocking_write here: this runs inside
        // an async context.
        for event in &events {
            match event {
                Event::VenueCreated { id, name, max_courts, created_at } => {
                    let vs = VenueState::new(*id, name.clone(), *max_courts, *created_at);
                    engine.venues.insert(*id, Arc::new(RwLock::new(vs)));
                    engine.names.insert(name.clone(), *id);
                }
                Event::VenueDeleted { id } => {
                    if let Some((_, vs)) = engine.venues.remove(id) {
                        let guard = vs.try_read().expect("replay: uncontended read");
                        engine.names.remove(&guard.name);
                        for booking in guard.bookings() {
                            engine.booking_to_venue.remove(&booking.id);
                        }
                    }
                }
                other => {
                    let venue_id = other.venue_id();
                    if let Some(entry) = engine.venues.get(&venue_id) {
                        let vs = entry.clone();
                        let mut guard = vs.try_write().expect("replay: uncontended write");
                        if let Event::VenueUpdated { name, .. } = other
                            && *name != guard.name
                        {
                            engine.names.remove(&guard.name);
                            engine.names.insert(name.clone(), venue_id);
                        }
                        apply_to_venue(&mut guard, other, &engine.booking_to_venue);
                    }
                }
            }
        }

        if !events.is_empty() {
            info!(
                events = events.len(),
                venues = engine.venues.len(),
                bookings = engine.booking_to_venue.len(),
                "replayed WAL"
            );
        }
        metrics::gauge!(crate::observability::VENUES_ACTIVE).set(engine.venues.len() as f64);

        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// Make the WAL writer fail the next `count` appends.
    #[cfg(test)]
    pub(super) async fn fail_next_wal_appends(&self, count: u64) {
        let _ = self.wal_tx.send(WalCommand::FailNextAppends { count }).await;
    }

    pub fn get_venue_state(&self, id: &Ulid) -> Option<SharedVenueState> {
        self.venues.get(id).map(|e| e.value().clone())
    }

    pub fn venue_count(&self) -> usize {
        self.venues.len()
    }

    pub fn get_venue_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_to_venue.get(booking_id).map(|e| *e.value())
    }

    /// WAL-append + apply + notify in one call.
    pub(super) async fn persist_and_apply(
        &self,
        vs: &mut VenueState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_venue(vs, event, &self.booking_to_venue);
        self.notify.send(vs.id, event);
        Ok(())
    }

    /// Lookup venue, acquire its write lock, and reject retired venues.
    pub(super) async fn venue_write(
        &self,
        venue_id: Ulid,
    ) -> Result<OwnedRwLockWriteGuard<VenueState>, EngineError> {
        let vs = self
            .get_venue_state(&venue_id)
            .ok_or(EngineError::VenueNotFound(venue_id))?;
        let guard = vs.write_owned().await;
        if guard.retired {
            return Err(EngineError::VenueNotFound(venue_id));
        }
        Ok(guard)
    }

    /// Lookup booking → venue, acquire the venue write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: Ulid,
    ) -> Result<OwnedRwLockWriteGuard<VenueState>, EngineError> {
        let venue_id = self
            .get_venue_for_booking(&booking_id)
            .ok_or(EngineError::BookingNotFound(booking_id))?;
        self.venue_write(venue_id)
            .await
            .map_err(|_| EngineError::BookingNotFound(booking_id))
    }
}
