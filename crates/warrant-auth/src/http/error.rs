//! Error responses.
//!
//! Callers only ever see the generic public message. Signature failures,
//! expiry and unmet claim requirements are indistinguishable externally.

use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::AuthError;

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = error_details(&self);

        if status.is_server_error() {
            tracing::error!(category = %self.category(), error = %self, "Request failed");
        } else {
            tracing::debug!(category = %self.category(), error = %self, "Request rejected");
        }

        let message = self.public_message();
        let body = json!({
            "error": code,
            "error_description": message,
        });

        let mut headers = HeaderMap::new();
        if status == StatusCode::UNAUTHORIZED {
            headers.insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Bearer error=\"invalid_token\""),
            );
        }

        (status, headers, Json(body)).into_response()
    }
}

/// Returns the HTTP status and error code for an error.
fn error_details(error: &AuthError) -> (StatusCode, &'static str) {
    match error {
        AuthError::InvalidToken { .. } | AuthError::ClaimsNotConform => {
            (StatusCode::UNAUTHORIZED, "invalid_token")
        }
        AuthError::InvalidRefreshToken { .. } | AuthError::RefreshLimitExceeded { .. } => {
            (StatusCode::BAD_REQUEST, "invalid_grant")
        }
        AuthError::KeyGeneration { .. }
        | AuthError::KeyDecode { .. }
        | AuthError::UnsupportedAlgorithm { .. }
        | AuthError::PeerFetch { .. }
        | AuthError::Storage { .. }
        | AuthError::Configuration { .. }
        | AuthError::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "server_error"),
    }
}
