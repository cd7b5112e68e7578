// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Check-in error taxonomy.
//!
//! Every failure a check-in attempt can hit is one of these variants. Token,
//! location, and identity errors are recovered at the request boundary and
//! rendered to the user with an appropriate status code; ledger and upstream
//! failures surface as a failed check-in with no automatic retry (the user
//! rescans). Archival failures are logged only and never affect the
//! triggering request.
//!
//! Detail strings carried by variants are for logs; the user-visible text is
//! the `Display` message, which never includes secrets or upstream payloads.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum CheckInError {
    /// The QR token's validity window has passed.
    #[error("This QR code has expired. Ask for a fresh one and scan again.")]
    TokenExpired,

    /// Malformed, unsigned, or tampered token. Fail closed.
    #[error("This QR code is not valid.")]
    TokenInvalid,

    /// No token query parameter was supplied.
    #[error("No check-in token was provided.")]
    TokenMissing,

    /// Latitude or longitude absent from a location claim.
    #[error("Location data is missing from the request.")]
    LocationDataMissing,

    /// Claimed position is outside the allowed radius. The measured
    /// distance is reported so the user can tell how far off they are.
    #[error("You are about {distance_meters:.0} m from the check-in point, outside the allowed radius.")]
    LocationOutOfRange { distance_meters: f64 },

    /// The external identity round trip did not produce an identity.
    #[error("Sign-in with the identity provider failed. Please scan the QR code and try again.")]
    IdentityHandoffFailed(String),

    /// The attendance row could not be written. Not queued, not retried.
    #[error("Your check-in could not be recorded. Please scan the QR code and try again.")]
    LedgerWriteFailed(String),

    /// Best-effort archival failed after a successful write. Log-only.
    #[error("Ledger archival failed.")]
    ArchivalFailed(String),

    /// Identity or storage provider unreachable.
    #[error("A required upstream service is unavailable. Please try again shortly.")]
    UpstreamUnavailable(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    error_code: String,
}

impl CheckInError {
    /// Stable machine-readable code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            CheckInError::TokenExpired => "token_expired",
            CheckInError::TokenInvalid => "token_invalid",
            CheckInError::TokenMissing => "token_missing",
            CheckInError::LocationDataMissing => "location_data_missing",
            CheckInError::LocationOutOfRange { .. } => "location_out_of_range",
            CheckInError::IdentityHandoffFailed(_) => "identity_handoff_failed",
            CheckInError::LedgerWriteFailed(_) => "ledger_write_failed",
            CheckInError::ArchivalFailed(_) => "archival_failed",
            CheckInError::UpstreamUnavailable(_) => "upstream_unavailable",
        }
    }

    /// HTTP status this error is surfaced with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            CheckInError::TokenMissing | CheckInError::LocationDataMissing => {
                StatusCode::BAD_REQUEST
            }
            CheckInError::TokenExpired
            | CheckInError::TokenInvalid
            | CheckInError::LocationOutOfRange { .. } => StatusCode::FORBIDDEN,
            CheckInError::IdentityHandoffFailed(_) | CheckInError::LedgerWriteFailed(_) => {
                StatusCode::BAD_GATEWAY
            }
            CheckInError::ArchivalFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CheckInError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Internal detail for logs, if the variant carries one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            CheckInError::IdentityHandoffFailed(d)
            | CheckInError::LedgerWriteFailed(d)
            | CheckInError::ArchivalFailed(d)
            | CheckInError::UpstreamUnavailable(d) => Some(d),
            _ => None,
        }
    }
}

impl IntoResponse for CheckInError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(ErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn status_mapping() {
        assert_eq!(
            CheckInError::TokenMissing.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            CheckInError::TokenExpired.status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            CheckInError::TokenInvalid.status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            CheckInError::UpstreamUnavailable("conn refused".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn out_of_range_message_reports_whole_meters() {
        let err = CheckInError::LocationOutOfRange {
            distance_meters: 500.4,
        };
        assert!(err.to_string().contains("500 m"));
    }

    #[test]
    fn display_never_contains_detail() {
        let err = CheckInError::LedgerWriteFailed("token=super-secret".into());
        assert!(!err.to_string().contains("super-secret"));
        assert_eq!(err.detail(), Some("token=super-secret"));
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = CheckInError::TokenExpired.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        assert_eq!(body["error_code"], "token_expired");
    }
}
