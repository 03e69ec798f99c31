//! Device control routes.
//!
//! ### `POST /reboot`
//! Restarts the device. On hardware the restart happens before a response
//! is written; a restart primitive that returns yields `200 OK`.

use axum::{extract::State, http::StatusCode, routing::post, Router};

use super::not_found;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/reboot", post(reboot).fallback(not_found))
}

/// POST /reboot
async fn reboot(State(state): State<AppState>) -> StatusCode {
    state.handlers.reboot(state.rebooter.as_ref());
    StatusCode::OK
}
