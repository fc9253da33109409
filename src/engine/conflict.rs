use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub fn now_ms() -> Ms {
    chrono::Utc::now().timestamp_millis()
}

/// Build a span from untrusted bounds: `end` must be strictly after `start`
/// and both must fall inside the supported timestamp range.
pub(crate) fn validate_span(start: Ms, end: Ms) -> Result<Span, EngineError> {
    let span = Span::try_new(start, end)
        .ok_or_else(|| EngineError::invalid("end time must be after start time"))?;
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    Ok(span)
}

/// Trimmed, non-empty, bounded text field.
pub(crate) fn validate_text(field: &'static str, value: &str, max_len: usize) -> Result<String, EngineError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::invalid(format!("{field} is required")));
    }
    if trimmed.len() > max_len {
        return Err(EngineError::invalid(format!("{field} too long (max {max_len} bytes)")));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn validate_max_courts(max_courts: u32) -> Result<(), EngineError> {
    if max_courts == 0 {
        return Err(EngineError::invalid("max_courts must be at least 1"));
    }
    if max_courts > MAX_COURTS_PER_VENUE {
        return Err(EngineError::LimitExceeded("too many courts"));
    }
    Ok(())
}

/// Per-court exclusivity: any existing booking on the same court whose span
/// overlaps `span` rejects the request. Caller holds the venue write lock.
pub(crate) fn check_no_conflict(venue: &VenueState, court_number: &str, span: &Span) -> Result<(), EngineError> {
    let Some(court) = venue.courts.get(court_number) else {
        return Ok(());
    };
    match court.overlapping(span).next() {
        Some(existing) => Err(EngineError::Conflict(existing.id)),
        None => Ok(()),
    }
}
