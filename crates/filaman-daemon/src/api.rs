//! REST API handlers

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use filaman_core::{FilamanError, FilamentRecord};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::state::{AppState, DeviceError};

/// API error response
#[derive(Serialize)]
struct ApiError {
    error: String,
}

impl ApiError {
    fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}

fn device_error_response(err: DeviceError) -> Response {
    let status = match &err {
        DeviceError::Device(FilamanError::DeviceUnavailable { .. }) => StatusCode::SERVICE_UNAVAILABLE,
        DeviceError::Device(FilamanError::TypeMismatch { .. }) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(error = %err, status = status.as_u16(), "Device request failed");
    (status, Json(ApiError::new(err.to_string()))).into_response()
}

/// Read presence flags
pub async fn get_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.get_status().await {
        Ok(status) => Json(status).into_response(),
        Err(e) => device_error_response(e),
    }
}

/// Read the record on the current tag
pub async fn nfc_read(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.get_record().await {
        Ok(record) => Json(record).into_response(),
        Err(e) => device_error_response(e),
    }
}

/// Write and commit a record
pub async fn nfc_write(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<FilamentRecord>, JsonRejection>,
) -> impl IntoResponse {
    let record = match payload {
        Ok(Json(record)) => record,
        Err(rejection) => {
            debug!(error = %rejection.body_text(), "Rejected tag write body");
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiError::new(rejection.body_text())),
            )
                .into_response();
        }
    };

    info!(id = record.id, name = %record.name, "Tag write requested");

    match state.set_record(record).await {
        Ok(()) => Json(serde_json::json!({"status": "OK"})).into_response(),
        Err(e) => device_error_response(e),
    }
}

/// Run the presence interrupt handler on demand
pub async fn refresh(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.on_presence_interrupt().await {
        Ok(event) => Json(event).into_response(),
        Err(e) => device_error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use crate::server::router;
    use crate::state::tests::{test_state, DEV};
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let (bus, state) = test_state();
        bus.set_register(DEV, 0x00, &[1]);

        let response = router(state)
            .oneshot(get("/server/filaman/status"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({"present": true, "nfc_valid": false})
        );
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let (bus, state) = test_state();
        let app = router(state);

        let record = json!({
            "id": 7,
            "name": "PLA",
            "spool_weight": 200,
            "total_weight": 950,
            "pressure_advance": 0.5
        });
        let response = app
            .clone()
            .oneshot(post_json("/server/filaman/nfc_write", record.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"status": "OK"}));
        assert_eq!(bus.register(DEV, 0x07), Some(vec![0b0000_0010]));

        let response = app.oneshot(get("/server/filaman/nfc_read")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, record);
    }

    #[tokio::test]
    async fn test_type_mismatch_is_bad_request() {
        let (bus, state) = test_state();
        let response = router(state)
            .oneshot(post_json(
                "/server/filaman/nfc_write",
                json!({
                    "id": 1,
                    "name": "PLA",
                    "spool_weight": 200,
                    "total_weight": 1000,
                    "extr_temp": 212.5
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(bus.transactions().is_empty());
    }

    #[tokio::test]
    async fn test_write_ignores_unknown_string_field() {
        let (bus, state) = test_state();
        let response = router(state)
            .oneshot(post_json(
                "/server/filaman/nfc_write",
                json!({
                    "id": 8,
                    "name": "PLA",
                    "spool_weight": 200,
                    "total_weight": 1000,
                    "vendor": "Prusament"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(bus.register(DEV, 0x07), Some(vec![0]));
        assert_eq!(bus.write_addresses().last(), Some(&0x0F));
    }

    #[tokio::test]
    async fn test_malformed_body_is_json_bad_request() {
        let (bus, state) = test_state();
        let response = router(state)
            .oneshot(post_json(
                "/server/filaman/nfc_write",
                json!({"id": 1, "name": "PLA"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["error"].is_string());
        assert!(bus.transactions().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_device_is_503() {
        let (bus, state) = test_state();
        bus.detach(DEV);

        let response = router(state)
            .oneshot(get("/server/filaman/nfc_read"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(body_json(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_refresh_returns_event() {
        let (bus, state) = test_state();
        bus.set_register(DEV, 0x00, &[1]);

        let response = router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/server/filaman/refresh")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["present"], true);
        assert!(json.get("id").is_none());
    }
}
