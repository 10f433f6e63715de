use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::adapters::inbound::http::{catalog_queries, create_entry, health};
use crate::shell::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/entries", post(create_entry::handle).get(catalog_queries::list_all))
        .route("/entries/{id}", get(catalog_queries::get_by_id))
        .route("/entries/owner/{owner_id}", get(catalog_queries::list_by_owner))
        .route("/health", get(health::handle))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
