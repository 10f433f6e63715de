use axum::{
    Json,
    extract::State,
    extract::rejection::JsonRejection,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::Serialize;

use crate::application::create_entry::CreateEntry;
use crate::application::errors::{CreateEntryError, PublishError};
use crate::shell::state::AppState;

/// Identity of the caller, set by the authenticating gateway in front of the service.
pub const PRINCIPAL_HEADER: &str = "x-principal";

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
}

pub fn error(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

pub async fn handle(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<CreateEntry>, JsonRejection>,
) -> impl IntoResponse {
    let Some(principal) = headers
        .get(PRINCIPAL_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|p| !p.is_empty())
    else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let Json(command) = match body {
        Ok(b) => b,
        Err(rejection) => return error(StatusCode::UNPROCESSABLE_ENTITY, rejection.body_text()),
    };

    match state.create_handler.handle(principal, command).await {
        Ok(entry) => (StatusCode::CREATED, Json(entry)).into_response(),
        Err(e @ CreateEntryError::Forbidden { .. }) => error(StatusCode::FORBIDDEN, e.to_string()),
        Err(CreateEntryError::Invalid(message)) => error(StatusCode::UNPROCESSABLE_ENTITY, message),
        Err(CreateEntryError::Publish(e @ PublishError::Unavailable(_))) => {
            error(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
        Err(e) => error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[cfg(test)]
mod create_entry_http_inbound_tests {
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode},
        routing::post,
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::core::catalog_entry::codec::decode_event;
    use crate::test_support::fixtures::app_state::{TOPIC, TestApp, test_app};

    use super::handle;

    const BODY: &str =
        r#"{"title":"Haircut","description":"Classic cut and wash","price":20.0,"owner_id":7}"#;

    fn app(test_app: &TestApp) -> Router {
        Router::new()
            .route("/entries", post(handle))
            .with_state(test_app.state.clone())
    }

    fn request(principal: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::post("/entries").header("content-type", "application/json");
        if let Some(principal) = principal {
            builder = builder.header("x-principal", principal);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn it_should_return_201_with_the_created_entry() {
        let test_app = test_app(true).await;

        let response = app(&test_app).oneshot(request(Some("7"), BODY)).await.unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["id"], 1);
        assert_eq!(json["price"], 20.0);
        assert_eq!(json["created_at"], "2024-01-01T10:00:00Z");

        let records = test_app.broker.records(TOPIC).await;
        assert_eq!(records.len(), 1);
        assert_eq!(decode_event(&records[0]).unwrap().id, 1);
        assert_eq!(test_app.cache.len().await, 1);
    }

    #[tokio::test]
    async fn it_should_accept_the_legacy_specialist_id_field() {
        let test_app = test_app(true).await;
        let body = r#"{"title":"Massage","price":"45.50","specialist_id":9}"#;

        let response = app(&test_app).oneshot(request(Some("admin"), body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn it_should_return_401_without_a_principal() {
        let test_app = test_app(true).await;

        let response = app(&test_app).oneshot(request(None, BODY)).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn it_should_return_403_for_another_owner() {
        let test_app = test_app(true).await;

        let response = app(&test_app).oneshot(request(Some("8"), BODY)).await.unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(test_app.broker.records(TOPIC).await.is_empty());
    }

    #[tokio::test]
    async fn it_should_return_422_on_invalid_json() {
        let test_app = test_app(true).await;

        let response = app(&test_app).oneshot(request(Some("7"), "not-json")).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn it_should_return_422_on_a_negative_price() {
        let test_app = test_app(true).await;
        let body = r#"{"title":"Haircut","price":-1,"owner_id":7}"#;

        let response = app(&test_app).oneshot(request(Some("7"), body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn it_should_return_422_on_a_price_the_store_cannot_hold() {
        let test_app = test_app(true).await;
        let body = r#"{"title":"Haircut","price":"100000000.00","owner_id":7}"#;

        let response = app(&test_app).oneshot(request(Some("7"), body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(test_app.broker.records(TOPIC).await.is_empty());
        assert_eq!(test_app.cache.len().await, 0);
    }

    #[tokio::test]
    async fn it_should_return_503_when_the_broker_never_became_ready() {
        let test_app = test_app(false).await;

        let response = app(&test_app).oneshot(request(Some("7"), BODY)).await.unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(test_app.cache.len().await, 0);
    }
}
