//! Wire shapes for the HTTP API. Instants travel as RFC 3339 strings and are
//! converted to unix milliseconds at this boundary.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::EngineError;
use crate::model::*;

/// Parse an instant. Accepts RFC 3339 with an offset, or a naive ISO-8601
/// date-time which is taken as UTC.
pub fn parse_instant(field: &str, raw: &str) -> Result<Ms, EngineError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.timestamp_millis());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(naive.and_utc().timestamp_millis());
        }
    }
    Err(EngineError::invalid(format!("{field}: not a valid timestamp: {raw:?}")))
}

pub fn format_instant(ms: Ms) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| ms.to_string())
}

// ── Requests ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateVenueRequest {
    pub name: String,
    pub max_courts: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateVenueRequest {
    pub name: Option<String>,
    pub max_courts: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateBookingRequest {
    pub venue_id: Ulid,
    pub court_number: String,
    pub start_time: String,
    pub end_time: String,
    pub booked_by: String,
}

/// `?start=&end=` on venue read endpoints.
#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    #[serde(alias = "startTime")]
    pub start: Option<String>,
    #[serde(alias = "endTime")]
    pub end: Option<String>,
}

impl WindowQuery {
    /// Both bounds, parsed. Either one missing is an error.
    pub fn required(&self) -> Result<(Ms, Ms), EngineError> {
        match self.optional()? {
            Some(window) => Ok(window),
            None => Err(EngineError::invalid("start and end are required")),
        }
    }

    /// `None` when neither bound is given.
    pub fn optional(&self) -> Result<Option<(Ms, Ms)>, EngineError> {
        match (&self.start, &self.end) {
            (None, None) => Ok(None),
            (Some(s), Some(e)) => Ok(Some((parse_instant("start", s)?, parse_instant("end", e)?))),
            _ => Err(EngineError::invalid("start and end must be given together")),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingListQuery {
    pub status: Option<String>,
    #[serde(alias = "venue_id")]
    pub venue_id: Option<Ulid>,
}

// ── Responses ───────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VenueDto {
    pub id: Ulid,
    pub name: String,
    pub max_courts: u32,
    pub created_at: String,
}

impl From<VenueInfo> for VenueDto {
    fn from(v: VenueInfo) -> Self {
        Self {
            id: v.id,
            name: v.name,
            max_courts: v.max_courts,
            created_at: format_instant(v.created_at),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingDto {
    pub id: Ulid,
    pub venue_id: Ulid,
    pub court_number: String,
    pub start_time: String,
    pub end_time: String,
    pub booked_by: String,
    pub booking_date: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub venue: Option<VenueDto>,
}

impl From<Booking> for BookingDto {
    fn from(b: Booking) -> Self {
        Self {
            id: b.id,
            venue_id: b.venue_id,
            court_number: b.court_number,
            start_time: format_instant(b.span.start),
            end_time: format_instant(b.span.end),
            booked_by: b.booked_by,
            booking_date: format_instant(b.booking_date),
            venue: None,
        }
    }
}

impl From<BookingWithVenue> for BookingDto {
    fn from(bw: BookingWithVenue) -> Self {
        Self {
            venue: Some(bw.venue.into()),
            ..BookingDto::from(bw.booking)
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotDto {
    pub id: Ulid,
    pub venue_id: Ulid,
    pub court_number: String,
    pub start_time: String,
    pub end_time: String,
    pub booked_by: String,
    pub is_slot_booked: bool,
}

impl SlotDto {
    fn new(slot: Slot, is_slot_booked: bool) -> Self {
        Self {
            id: slot.id,
            venue_id: slot.venue_id,
            court_number: slot.court_number,
            start_time: format_instant(slot.span.start),
            end_time: format_instant(slot.span.end),
            booked_by: slot.booked_by,
            is_slot_booked,
        }
    }
}

impl From<SlotInfo> for SlotDto {
    fn from(s: SlotInfo) -> Self {
        Self::new(s.slot, s.is_slot_booked)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotGenerationDto {
    pub target_day: String,
    pub created_count: usize,
    pub skipped_count: usize,
    pub failed_count: usize,
    pub created: Vec<SlotDto>,
}

impl From<SlotGenerationReport> for SlotGenerationDto {
    fn from(r: SlotGenerationReport) -> Self {
        Self {
            target_day: format_instant(r.target_day),
            created_count: r.created_count,
            skipped_count: r.skipped_count,
            failed_count: r.failed_count,
            // Freshly generated slots have no bookings checked against them.
            created: r.created.into_iter().map(|s| SlotDto::new(s, false)).collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityDto {
    pub venue_id: Ulid,
    pub venue_name: String,
    pub max_courts: u32,
    pub booked_courts: u32,
    pub available_courts: u32,
    pub start_time: String,
    pub end_time: String,
}

impl From<AvailabilityInfo> for AvailabilityDto {
    fn from(a: AvailabilityInfo) -> Self {
        Self {
            venue_id: a.venue_id,
            venue_name: a.venue_name,
            max_courts: a.max_courts,
            booked_courts: a.booked_courts,
            available_courts: a.available_courts,
            start_time: format_instant(a.window.start),
            end_time: format_instant(a.window.end),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanDto {
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourtScheduleDto {
    pub court_number: String,
    pub bookings: Vec<BookingDto>,
    pub free: Vec<SpanDto>,
}

impl From<CourtScheduleInfo> for CourtScheduleDto {
    fn from(c: CourtScheduleInfo) -> Self {
        Self {
            court_number: c.court_number,
            bookings: c.bookings.into_iter().map(Into::into).collect(),
            free: c
                .free
                .into_iter()
                .map(|s| SpanDto {
                    start_time: format_instant(s.start),
                    end_time: format_instant(s.end),
                })
                .collect(),
        }
    }
}

/// One server-sent event payload on `/venues/{id}/events`.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeDto {
    VenueUpdated { name: String, max_courts: u32 },
    VenueDeleted,
    BookingCreated { booking_id: Ulid, court_number: String, start_time: String, end_time: String },
    BookingDeleted { booking_id: Ulid, court_number: String },
    SlotCreated { slot_id: Ulid, court_number: String, start_time: String, end_time: String },
}

impl ChangeDto {
    /// `None` for events that never reach a venue stream.
    pub fn from_event(event: &Event) -> Option<Self> {
        Some(match event {
            Event::VenueCreated { .. } => return None,
            Event::VenueUpdated { name, max_courts, .. } => ChangeDto::VenueUpdated {
                name: name.clone(),
                max_courts: *max_courts,
            },
            Event::VenueDeleted { .. } => ChangeDto::VenueDeleted,
            Event::BookingCreated { id, court_number, span, .. } => ChangeDto::BookingCreated {
                booking_id: *id,
                court_number: court_number.clone(),
                start_time: format_instant(span.start),
                end_time: format_instant(span.end),
            },
            Event::BookingDeleted { id, court_number, .. } => ChangeDto::BookingDeleted {
                booking_id: *id,
                court_number: court_number.clone(),
            },
            Event::SlotCreated { id, court_number, span, .. } => ChangeDto::SlotCreated {
                slot_id: *id,
                court_number: court_number.clone(),
                start_time: format_instant(span.start),
                end_time: format_instant(span.end),
            },
        })
    }
}
