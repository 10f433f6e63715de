use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::adapters::inbound::http::create_entry::error;
use crate::application::errors::ReadError;
use crate::shell::state::AppState;

fn read_error(e: ReadError) -> axum::response::Response {
    match e {
        ReadError::NotFound(_) => error(StatusCode::NOT_FOUND, e.to_string()),
        ReadError::Unavailable(_) => error(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    }
}

pub async fn get_by_id(State(state): State<AppState>, Path(id): Path<i64>) -> impl IntoResponse {
    match state.reader.get_by_id(id).await {
        Ok(entry) => Json(entry).into_response(),
        Err(e) => read_error(e),
    }
}

pub async fn list_by_owner(
    State(state): State<AppState>,
    Path(owner_id): Path<i64>,
) -> impl IntoResponse {
    match state.reader.list_by_owner(owner_id).await {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => read_error(e),
    }
}

pub async fn list_all(State(state): State<AppState>) -> impl IntoResponse {
    match state.reader.list_all().await {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => read_error(e),
    }
}
