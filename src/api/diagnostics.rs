//! Database diagnostic endpoint.

use axum::{extract::State, Extension, Json};

use crate::diagnostics::{self, DatabaseInfo, RequestContext};
use crate::error::Result;
use crate::server::AppState;

/// Report the connected database's name and server version.
///
/// Queries run under the request's [`RequestContext`] when an outer layer
/// supplied one, otherwise under the configured request timeout. Failures
/// are logged by [`AppError`](crate::error::AppError) and reach the client
/// as a generic 500.
pub async fn database_info(
    State(state): State<AppState>,
    ctx: Option<Extension<RequestContext>>,
) -> Result<Json<DatabaseInfo>> {
    let ctx = match ctx {
        Some(Extension(ctx)) => ctx,
        None => RequestContext::with_timeout(state.settings.request_timeout()),
    };
    let info = diagnostics::fetch_info(&state.pool, &ctx).await?;
    Ok(Json(info))
}
