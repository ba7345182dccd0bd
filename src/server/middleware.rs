use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures::FutureExt;
use tracing::Level;

use crate::api::HEALTH_PATH;

/// Emit one structured event per request once the response is ready.
///
/// Liveness probes on the health path are not logged.
pub async fn log_requests(req: Request<Body>, next: Next) -> Response {
    if req.uri().path() == HEALTH_PATH {
        return next.run(req).await;
    }

    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned();

    let response = next.run(req).await;

    let status = response.status();
    let duration = start.elapsed();

    macro_rules! request_event {
        ($level:expr) => {
            tracing::event!(
                $level,
                method = %method,
                path = %path,
                user_agent = %user_agent,
                status = status.as_u16(),
                duration = ?duration,
                "request"
            )
        };
    }

    let level = level_for_status(status);
    if level == Level::ERROR {
        request_event!(Level::ERROR);
    } else if level == Level::WARN {
        request_event!(Level::WARN);
    } else {
        request_event!(Level::INFO);
    }

    response
}

pub fn level_for_status(status: StatusCode) -> Level {
    if status.is_server_error() {
        Level::ERROR
    } else if status.is_client_error() {
        Level::WARN
    } else {
        Level::INFO
    }
}

/// Turn a panic anywhere downstream into a 500 for this request only.
pub async fn recover_panics(req: Request<Body>, next: Next) -> Response {
    let path = req.uri().path().to_owned();

    match AssertUnwindSafe(next.run(req)).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            tracing::error!(
                cause = %panic_message(panic.as_ref()),
                path = %path,
                "panic recovered"
            );

            let status = StatusCode::INTERNAL_SERVER_ERROR;
            (status, status.canonical_reason().unwrap_or_default()).into_response()
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else if let Some(err) = panic.downcast_ref::<Box<dyn std::error::Error + Send + Sync>>() {
        err.to_string()
    } else {
        "unknown panic payload".to_string()
    }
}
