use tracing::{info, warn};
use ulid::Ulid;

use crate::model::*;

use super::{Engine, EngineError, SharedVenueState};

/// First and last hour-of-day (UTC) of the daily grid. The last slot covers
/// `[16:00, 17:00)`.
pub const SLOT_FIRST_HOUR: i64 = 9;
pub const SLOT_LAST_HOUR: i64 = 16;

/// Midnight UTC of the day after `now`.
pub fn next_day_midnight(now: Ms) -> Ms {
    now.div_euclid(DAY_MS) * DAY_MS + DAY_MS
}

/// Hourly spans of the grid on the day starting at `day`.
fn grid_spans(day: Ms) -> impl Iterator<Item = Span> {
    (SLOT_FIRST_HOUR..=SLOT_LAST_HOUR).map(move |h| {
        let start = day + h * HOUR_MS;
        Span::new(start, start + HOUR_MS)
    })
}

impl Engine {
    /// Materialize tomorrow's grid for every venue: one hourly slot per court
    /// from 09:00 to 17:00 UTC. Slots that already exist are skipped, so
    /// re-running for the same day only reports skips.
    ///
    /// Each venue is handled under its write lock, so concurrent runs never
    /// create the same slot twice. A failed write is counted and the run
    /// moves on.
    pub async fn generate_daily_slots(&self, now: Ms) -> Result<SlotGenerationReport, EngineError> {
        let _commit = self.commit_gate.read().await;

        let mut venues: Vec<(Ulid, SharedVenueState)> = self
            .venues
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        if venues.is_empty() {
            return Err(EngineError::NoVenues);
        }
        venues.sort_by_key(|(id, _)| *id);

        let target_day = next_day_midnight(now);
        let mut report = SlotGenerationReport {
            target_day,
            created_count: 0,
            skipped_count: 0,
            failed_count: 0,
            created: Vec::new(),
        };

        for (venue_id, vs) in venues {
            let mut guard = vs.write().await;
            if guard.retired {
                continue;
            }
            let courts: Vec<String> = guard.grid_courts().collect();
            for court in &courts {
                for span in grid_spans(target_day) {
                    if guard.slots.contains_key(&SlotKey::new(court, &span)) {
                        report.skipped_count += 1;
                        continue;
                    }
                    let slot = Slot {
                        id: Ulid::new(),
                        venue_id,
                        court_number: court.clone(),
                        span,
                        booked_by: AUTO_SLOT_OWNER.to_string(),
                    };
                    let event = Event::SlotCreated {
                        id: slot.id,
                        venue_id,
                        court_number: slot.court_number.clone(),
                        span,
                        booked_by: slot.booked_by.clone(),
                    };
                    match self.persist_and_apply(&mut guard, &event).await {
                        Ok(()) => {
                            report.created_count += 1;
                            report.created.push(slot);
                        }
                        Err(e) => {
                            report.failed_count += 1;
                            warn!(venue_id = %venue_id, court = %court, start = span.start, "slot not created: {e}");
                        }
                    }
                }
            }
        }

        metrics::counter!(crate::observability::SLOTS_CREATED_TOTAL)
            .increment(report.created_count as u64);
        metrics::counter!(crate::observability::SLOTS_SKIPPED_TOTAL)
            .increment(report.skipped_count as u64);
        metrics::counter!(crate::observability::SLOTS_FAILED_TOTAL)
            .increment(report.failed_count as u64);
        info!(
            target_day,
            created = report.created_count,
            skipped = report.skipped_count,
            failed = report.failed_count,
            "daily slots generated"
        );
        Ok(report)
    }
}
