//! HTTP route handlers for the config service.
//!
//! Anything not routed here, including an unsupported method on a known
//! path, answers `404 Not Found`. `GET` routes register an explicit `HEAD`
//! handler so axum's implicit `HEAD` does not answer for them.

pub mod secrets;
pub mod system;
pub mod ui;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Router,
};
use provision_core::ProvisionError;
use tower_http::trace::TraceLayer;

use crate::AppState;

/// Create the config service router.
///
/// Routes are organized as:
/// - `/`, `/index.html` - operator UI
/// - `/api_key`, `/api_uri` - secrets
/// - `/reboot` - device restart
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(ui::routes())
        .merge(secrets::routes())
        .merge(system::routes())
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub(crate) async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Failure response carrying the error text.
pub(crate) fn error_response(err: &ProvisionError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, err.to_string()).into_response()
}
