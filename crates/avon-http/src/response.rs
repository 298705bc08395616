//! Core outcomes as HTTP responses.

use avon_core::{Encoding, Outcome, Payload};
use avon_types::AvonError;
use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};

/// Header carrying the record timestamp (microseconds) of a payload.
pub const TIME_HEADER: &str = "x-avon-time";

/// HTTP status for a failed request.
pub fn status_for(error: &AvonError) -> StatusCode {
    match error {
        AvonError::UnknownModel(_) => StatusCode::NOT_FOUND,
        AvonError::CapabilityNotInstalled { .. } => StatusCode::NOT_IMPLEMENTED,
        AvonError::InterfaceMismatch { .. } => StatusCode::CONFLICT,
        AvonError::OutOfBounds { .. }
        | AvonError::Malformed(_)
        | AvonError::InvalidInterface(_) => StatusCode::BAD_REQUEST,
        AvonError::BackendFailure { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// An [`AvonError`] answered as its mapped status with the error as a JSON
/// body.
#[derive(Debug)]
pub struct ApiError(pub AvonError);

impl From<AvonError> for ApiError {
    fn from(e: AvonError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (status_for(&self.0), Json(self.0)).into_response()
    }
}

/// A successful payload.  Empty payloads are `204 No Content`; others carry
/// their content type and capture time.
pub struct PayloadResponse(pub Payload);

impl IntoResponse for PayloadResponse {
    fn into_response(self) -> Response {
        let Payload {
            time,
            encoding,
            body,
        } = self.0;
        if encoding == Encoding::Empty {
            return StatusCode::NO_CONTENT.into_response();
        }
        let mut response = body.into_response();
        let headers = response.headers_mut();
        if let Some(content_type) = encoding.content_type() {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
        headers.insert(TIME_HEADER, HeaderValue::from(time));
        response
    }
}

pub fn outcome_response(outcome: Outcome) -> Response {
    match outcome {
        Ok(payload) => PayloadResponse(payload).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use avon_types::{InterfaceKind, Operation};
    use axum::body::to_bytes;

    use super::*;

    #[test]
    fn error_statuses() {
        assert_eq!(status_for(&AvonError::UnknownModel("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(&AvonError::CapabilityNotInstalled {
                interface: InterfaceKind::Fiducial,
                operation: Operation::GetConfig,
            }),
            StatusCode::NOT_IMPLEMENTED
        );
        assert_eq!(
            status_for(&AvonError::InterfaceMismatch {
                model: "laser0".into(),
                registered: InterfaceKind::Ranger,
                requested: InterfaceKind::Fiducial,
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&AvonError::OutOfBounds {
                what: "samples".into(),
                count: 2000,
                max: 1024,
            }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_for(&AvonError::Malformed("eof".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&AvonError::BackendFailure {
                model: "robot0".into(),
                operation: Operation::GetPva,
                details: "stalled".into(),
            }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&AvonError::RegistrationClosed),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn empty_payload_is_no_content() {
        let response = outcome_response(Ok(Payload::empty()));
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.headers().get(TIME_HEADER).is_none());
    }

    #[tokio::test]
    async fn error_body_is_json() {
        let response = outcome_response(Err(AvonError::UnknownModel("ghost".into())));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let back: AvonError = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, AvonError::UnknownModel("ghost".into()));
    }

    #[test]
    fn payload_carries_content_type_and_time() {
        let response = outcome_response(Ok(Payload {
            time: 42,
            encoding: Encoding::Json,
            body: b"{}".to_vec(),
        }));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(response.headers()[TIME_HEADER], "42");
    }
}
