use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

use crate::application::handshake::ConnectionState;
use crate::shell::state::AppState;

#[derive(Serialize)]
pub struct HealthBody {
    pub publisher: &'static str,
}

/// 200 only while the publisher can emit events.
pub async fn handle(State(state): State<AppState>) -> impl IntoResponse {
    let publisher = state.publisher.state().await;
    let status = if publisher == ConnectionState::Ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(HealthBody {
            publisher: publisher.as_str(),
        }),
    )
}

#[cfg(test)]
mod health_http_inbound_tests {
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode},
        routing::get,
    };
    use rstest::rstest;
    use tower::ServiceExt;

    use crate::test_support::fixtures::app_state::test_app;

    use super::handle;

    #[rstest]
    #[case(true, StatusCode::OK)]
    #[case(false, StatusCode::SERVICE_UNAVAILABLE)]
    #[tokio::test]
    async fn it_should_report_the_publisher_state(
        #[case] broker_reachable: bool,
        #[case] expected: StatusCode,
    ) {
        let test_app = test_app(broker_reachable).await;
        let app = Router::new()
            .route("/health", get(handle))
            .with_state(test_app.state);

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), expected);
    }
}
