//! Secret routes.
//!
//! # Endpoints
//!
//! ### `GET /api_key`, `GET /api_uri`
//! Returns the current value as `text/plain`. An absent API key is an empty
//! body; an absent endpoint is the compiled default.
//!
//! ### `POST /api_key`
//! The body is the raw key; one trailing line ending is dropped. The key is
//! durably stored before the control thread is signalled.
//!
//! ### `POST /api_uri`
//! Stores the endpoint override. Does not signal.
//!
//! Stores run on the blocking pool; the durable commit syncs to disk.
//! `HEAD` is not routed and answers `404`.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use provision_core::SecretName;
use tracing::error;

use super::{error_response, not_found};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api_key",
            get(get_api_key)
                .head(not_found)
                .post(post_api_key)
                .fallback(not_found),
        )
        .route(
            "/api_uri",
            get(get_api_uri)
                .head(not_found)
                .post(post_api_uri)
                .fallback(not_found),
        )
}

/// GET /api_key
async fn get_api_key(State(state): State<AppState>) -> Response {
    read(&state, SecretName::ApiKey)
}

/// POST /api_key
async fn post_api_key(State(state): State<AppState>, body: Bytes) -> Response {
    write(state, SecretName::ApiKey, body).await
}

/// GET /api_uri
async fn get_api_uri(State(state): State<AppState>) -> Response {
    read(&state, SecretName::ApiUri)
}

/// POST /api_uri
async fn post_api_uri(State(state): State<AppState>, body: Bytes) -> Response {
    write(state, SecretName::ApiUri, body).await
}

fn read(state: &AppState, name: SecretName) -> Response {
    match state.handlers.read_secret(name) {
        Ok(value) => value.into_response(),
        Err(err) => error_response(&err),
    }
}

async fn write(state: AppState, name: SecretName, body: Bytes) -> Response {
    let stored =
        tokio::task::spawn_blocking(move || state.handlers.write_secret(name, &body)).await;
    match stored {
        Ok(Ok(())) => StatusCode::OK.into_response(),
        Ok(Err(err)) => error_response(&err),
        Err(err) => {
            error!("POST /{} aborted - kind=StorageFailure: {}", name, err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
