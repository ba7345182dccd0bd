use axum::{middleware, Router};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};
use tracing::Level;

use crate::api::api_routes;

use super::middleware::{log_requests, recover_panics};
use super::AppState;

pub fn create_app(state: AppState) -> Router {
    with_middleware(api_routes(), state)
}

/// Wrap `routes` in the service's middleware chain and attach the state.
///
/// Outermost first: request span, panic recovery, request logging,
/// write timeout, then the route handler.
pub fn with_middleware(routes: Router<AppState>, state: AppState) -> Router {
    // Span only; the request event itself comes from `log_requests`
    let trace = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(())
        .on_response(())
        .on_failure(());

    routes
        .layer(TimeoutLayer::new(state.settings.write_timeout()))
        .layer(middleware::from_fn(log_requests))
        .layer(middleware::from_fn(recover_panics))
        .layer(trace)
        .with_state(state)
}
