use std::convert::Infallible;

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use futures::Stream;
use futures::stream;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use ulid::Ulid;

use crate::engine::now_ms;
use crate::model::BookingFilter;

use super::AppState;
use super::dto::*;
use super::error::{ApiError, ApiResult};

type IdPath = Result<Path<Ulid>, PathRejection>;

/// GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "status": "ok", "venues": state.engine.venue_count() }))
}

// ── Venues ──────────────────────────────────────────────────────

/// POST /venues
pub async fn create_venue(
    State(state): State<AppState>,
    payload: Result<Json<CreateVenueRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<VenueDto>)> {
    let Json(req) = payload?;
    let venue = state.engine.create_venue(&req.name, req.max_courts).await?;
    Ok((StatusCode::CREATED, Json(venue.into())))
}

/// GET /venues
pub async fn list_venues(State(state): State<AppState>) -> Json<Vec<VenueDto>> {
    let venues = state.engine.list_venues().await;
    Json(venues.into_iter().map(Into::into).collect())
}

/// GET /venues/{id}
pub async fn get_venue(State(state): State<AppState>, path: IdPath) -> ApiResult<Json<VenueDto>> {
    let Path(id) = path?;
    Ok(Json(state.engine.get_venue(id).await?.into()))
}

/// PUT /venues/{id}
pub async fn update_venue(
    State(state): State<AppState>,
    path: IdPath,
    payload: Result<Json<UpdateVenueRequest>, JsonRejection>,
) -> ApiResult<Json<VenueDto>> {
    let Path(id) = path?;
    let Json(req) = payload?;
    let venue = state
        .engine
        .update_venue(id, req.name.as_deref(), req.max_courts)
        .await?;
    Ok(Json(venue.into()))
}

/// DELETE /venues/{id}
pub async fn delete_venue(State(state): State<AppState>, path: IdPath) -> ApiResult<StatusCode> {
    let Path(id) = path?;
    state.engine.delete_venue(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /venues/{id}/availability?start=&end=
pub async fn get_availability(
    State(state): State<AppState>,
    path: IdPath,
    query: Result<Query<WindowQuery>, QueryRejection>,
) -> ApiResult<Json<AvailabilityDto>> {
    let Path(id) = path?;
    let Query(window) = query?;
    let (start, end) = window.required()?;
    Ok(Json(state.engine.get_availability(id, start, end).await?.into()))
}

/// GET /venues/{id}/schedule?start=&end=
pub async fn get_schedule(
    State(state): State<AppState>,
    path: IdPath,
    query: Result<Query<WindowQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<CourtScheduleDto>>> {
    let Path(id) = path?;
    let Query(window) = query?;
    let (start, end) = window.required()?;
    let schedule = state.engine.get_court_schedule(id, start, end).await?;
    Ok(Json(schedule.into_iter().map(Into::into).collect()))
}

/// GET /venues/{id}/slots?start=&end=
pub async fn list_slots(
    State(state): State<AppState>,
    path: IdPath,
    query: Result<Query<WindowQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<SlotDto>>> {
    let Path(id) = path?;
    let Query(window) = query?;
    let slots = state.engine.list_slots(id, window.optional()?).await?;
    Ok(Json(slots.into_iter().map(Into::into).collect()))
}

/// GET /venues/{id}/events: committed changes to the venue as server-sent
/// events. The stream ends when the venue is deleted.
pub async fn venue_events(
    State(state): State<AppState>,
    path: IdPath,
) -> ApiResult<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>> {
    let Path(id) = path?;
    let rx = state.engine.notify.subscribe(id);
    // Subscribe first so nothing committed after the existence check is missed.
    if let Err(e) = state.engine.get_venue(id).await {
        drop(rx);
        state.engine.notify.release(&id);
        return Err(e.into());
    }

    let events = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let Some(change) = ChangeDto::from_event(&event) else { continue };
                    let data = serde_json::to_string(&change).unwrap_or_default();
                    return Some((Ok(SseEvent::default().event("change").data(data)), rx));
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event stream lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

// ── Bookings ────────────────────────────────────────────────────

/// POST /bookings
pub async fn create_booking(
    State(state): State<AppState>,
    payload: Result<Json<CreateBookingRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<BookingDto>)> {
    let Json(req) = payload?;
    let start = parse_instant("startTime", &req.start_time)?;
    let end = parse_instant("endTime", &req.end_time)?;
    let booking = state
        .engine
        .create_booking(req.venue_id, &req.court_number, start, end, &req.booked_by)
        .await?;
    Ok((StatusCode::CREATED, Json(booking.into())))
}

/// GET /bookings?status=all|active|expired&venueId=
pub async fn list_bookings(
    State(state): State<AppState>,
    query: Result<Query<BookingListQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<BookingDto>>> {
    let Query(q) = query?;
    let filter = match q.status.as_deref() {
        None => BookingFilter::All,
        Some(s) => s.parse().map_err(ApiError::invalid)?,
    };
    let bookings = state.engine.list_bookings(filter, q.venue_id, now_ms()).await?;
    Ok(Json(bookings.into_iter().map(Into::into).collect()))
}

/// GET /bookings/{id}
pub async fn get_booking(State(state): State<AppState>, path: IdPath) -> ApiResult<Json<BookingDto>> {
    let Path(id) = path?;
    Ok(Json(state.engine.get_booking(id).await?.into()))
}

/// DELETE /bookings/{id}: returns the removed booking.
pub async fn delete_booking(State(state): State<AppState>, path: IdPath) -> ApiResult<Json<BookingDto>> {
    let Path(id) = path?;
    Ok(Json(state.engine.delete_booking(id).await?.into()))
}

// ── Slots ───────────────────────────────────────────────────────

/// POST /slots/generate
pub async fn generate_slots(State(state): State<AppState>) -> ApiResult<Json<SlotGenerationDto>> {
    let report = state.engine.generate_daily_slots(now_ms()).await?;
    Ok(Json(report.into()))
}
