//! HTTP surface over the engine. One route per engine operation, JSON in
//! and out.

pub mod dto;
mod error;
mod handlers;

pub use error::{ApiError, ApiResult, ErrorBody};

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::{MatchedPath, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::engine::Engine;
use crate::observability;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .nest("/venues", venue_routes())
        .nest("/bookings", booking_routes())
        .route("/slots/generate", post(handlers::generate_slots))
        .route_layer(middleware::from_fn(track_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { engine })
}

fn venue_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::create_venue).get(handlers::list_venues))
        .route(
            "/{id}",
            get(handlers::get_venue)
                .put(handlers::update_venue)
                .delete(handlers::delete_venue),
        )
        .route("/{id}/availability", get(handlers::get_availability))
        .route("/{id}/schedule", get(handlers::get_schedule))
        .route("/{id}/slots", get(handlers::list_slots))
        .route("/{id}/events", get(handlers::venue_events))
}

fn booking_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::create_booking).get(handlers::list_bookings))
        .route("/{id}", get(handlers::get_booking).delete(handlers::delete_booking))
}

/// Request count and latency per matched route.
async fn track_metrics(req: Request, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());
    let method = req.method().to_string();
    let started = Instant::now();

    let response = next.run(req).await;

    let status = observability::status_class(response.status().as_u16());
    metrics::counter!(
        observability::REQUESTS_TOTAL,
        "method" => method.clone(),
        "route" => route.clone(),
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        observability::REQUEST_DURATION_SECONDS,
        "method" => method,
        "route" => route
    )
    .record(started.elapsed().as_secs_f64());
    response
}
