// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Location claims for gated check-ins.

use axum::{extract::State, Json};
use axum_extra::extract::cookie::SignedCookieJar;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::CheckInError;
use crate::geo::Coordinates;
use crate::session::establish_session;
use crate::state::AppState;

#[derive(Deserialize, ToSchema)]
pub struct VerifyLocationRequest {
    /// The check-in token the QR code carried.
    pub token: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VerifyLocationResponse {
    pub success: bool,
    /// Where to send the browser next (identity provider), on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    /// Human-readable rejection, including the measured distance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Evaluate a device-reported location against the reference point.
///
/// An out-of-bounds claim is a *negative result*, not an error: the
/// response reports the measured distance and the client may retry.
#[utoipa::path(
    post,
    path = "/verify_location",
    request_body = VerifyLocationRequest,
    tag = "CheckIn",
    responses(
        (status = 200, description = "Claim evaluated", body = VerifyLocationResponse),
        (status = 400, description = "Missing or non-numeric coordinates"),
        (status = 403, description = "Token expired or invalid")
    )
)]
pub async fn verify_location(
    State(app): State<AppState>,
    jar: SignedCookieJar,
    Json(request): Json<VerifyLocationRequest>,
) -> Result<(SignedCookieJar, Json<VerifyLocationResponse>), CheckInError> {
    // Malformed claims are rejected before the evaluator ever runs.
    let claim = match (request.latitude, request.longitude) {
        (Some(latitude), Some(longitude)) if latitude.is_finite() && longitude.is_finite() => {
            Coordinates {
                latitude,
                longitude,
            }
        }
        _ => return Err(CheckInError::LocationDataMissing),
    };

    let (jar, session_id) = establish_session(jar);

    match app
        .orchestrator
        .verify_location(&request.token, claim, session_id)
        .await
    {
        Ok(redirect_url) => Ok((
            jar,
            Json(VerifyLocationResponse {
                success: true,
                redirect_url: Some(redirect_url),
                message: None,
            }),
        )),
        Err(rejection @ CheckInError::LocationOutOfRange { .. }) => Ok((
            jar,
            Json(VerifyLocationResponse {
                success: false,
                redirect_url: None,
                message: Some(rejection.to_string()),
            }),
        )),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::app_state;
    use axum::extract::FromRef;
    use axum_extra::extract::cookie::Key;

    fn empty_jar(state: &AppState) -> SignedCookieJar {
        SignedCookieJar::new(Key::from_ref(state))
    }

    fn request(token: &str, latitude: Option<f64>, longitude: Option<f64>) -> VerifyLocationRequest {
        VerifyLocationRequest {
            token: token.to_string(),
            latitude,
            longitude,
        }
    }

    #[tokio::test]
    async fn claim_at_the_reference_point_succeeds_with_a_redirect() {
        let (state, _sheet) = app_state();
        let jar = empty_jar(&state);
        let token = state.tokens.issue().unwrap();

        let (_jar, Json(body)) = verify_location(
            State(state),
            jar,
            Json(request(&token, Some(36.0760254), Some(136.2129435))),
        )
        .await
        .unwrap();

        assert!(body.success);
        assert!(body
            .redirect_url
            .unwrap()
            .starts_with("https://accounts.example.com/auth"));
        assert!(body.message.is_none());
    }

    #[tokio::test]
    async fn faraway_claim_is_a_negative_result_with_the_distance() {
        let (state, _sheet) = app_state();
        let jar = empty_jar(&state);
        let token = state.tokens.issue().unwrap();

        // ~500 m north of the reference point.
        let (_jar, Json(body)) = verify_location(
            State(state),
            jar,
            Json(request(&token, Some(36.0805224), Some(136.2129435))),
        )
        .await
        .unwrap();

        assert!(!body.success);
        assert!(body.redirect_url.is_none());
        assert!(body.message.unwrap().contains("500 m"));
    }

    #[tokio::test]
    async fn missing_coordinates_are_a_bad_request() {
        let (state, _sheet) = app_state();
        let token = state.tokens.issue().unwrap();

        let jar = empty_jar(&state);
        let err = verify_location(State(state.clone()), jar, Json(request(&token, None, Some(1.0))))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckInError::LocationDataMissing));

        let jar = empty_jar(&state);
        let err = verify_location(
            State(state),
            jar,
            Json(request(&token, Some(f64::NAN), Some(1.0))),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CheckInError::LocationDataMissing));
    }

    #[tokio::test]
    async fn invalid_token_is_an_error_not_a_negative_result() {
        let (state, _sheet) = app_state();
        let jar = empty_jar(&state);

        let err = verify_location(
            State(state),
            jar,
            Json(request("garbage", Some(36.0760254), Some(136.2129435))),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, CheckInError::TokenInvalid));
    }
}
