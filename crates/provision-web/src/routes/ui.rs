//! Operator UI.

use axum::{response::Html, routing::get, Router};
use provision_core::INDEX_HTML;

use super::not_found;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index).head(not_found).fallback(not_found))
        .route("/index.html", get(index).head(not_found).fallback(not_found))
}

/// GET / and GET /index.html
async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}
