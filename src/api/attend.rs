// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The check-in entry point and the identity-provider callback.
//!
//! `GET /attend` is where a scanned QR code lands: the token is validated
//! and the client is either redirected straight to the provider or shown
//! the location-confirmation step. `GET /callback` is where the provider
//! sends the user afterwards; the pending check-in is correlated through
//! the signed session cookie and completed with a ledger write.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::SignedCookieJar;
use serde::Deserialize;
use tracing::warn;

use super::pages;
use crate::checkin::Entry;
use crate::error::CheckInError;
use crate::session::{establish_session, session_from_jar};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct AttendQuery {
    pub token: Option<String>,
}

pub async fn attend(
    State(app): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    jar: SignedCookieJar,
    Query(query): Query<AttendQuery>,
) -> Response {
    let (jar, session_id) = establish_session(jar);
    let origin = addr.ip().to_string();

    match app
        .orchestrator
        .begin(query.token.as_deref(), &origin, session_id)
        .await
    {
        Ok(Entry::Redirect { authorization_url }) => {
            (jar, Redirect::to(&authorization_url)).into_response()
        }
        Ok(Entry::LocationGate) => {
            let token = query.token.unwrap_or_default();
            (jar, pages::location_gate_page(&token)).into_response()
        }
        Err(e) => {
            warn!(error_code = e.error_code(), origin = %origin, "check-in entry rejected");
            pages::error_page(&e)
        }
    }
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    pub state: Option<String>,
    pub code: Option<String>,
    pub error: Option<String>,
}

pub async fn callback(
    State(app): State<AppState>,
    jar: SignedCookieJar,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let Some(session_id) = session_from_jar(&jar) else {
        return pages::error_page(&CheckInError::IdentityHandoffFailed(
            "callback arrived without a session".to_string(),
        ));
    };

    if let Some(denial) = query.error {
        warn!(provider_error = %denial, "identity provider denied the authorization");
        return pages::error_page(&CheckInError::IdentityHandoffFailed(denial));
    }

    let (Some(state), Some(code)) = (query.state, query.code) else {
        return pages::error_page(&CheckInError::IdentityHandoffFailed(
            "callback is missing state or code".to_string(),
        ));
    };

    match app.orchestrator.complete(session_id, &state, &code).await {
        Ok(record) => pages::success_page(&record.display_name).into_response(),
        Err(e) => {
            warn!(error_code = e.error_code(), detail = e.detail(), "check-in completion failed");
            pages::error_page(&e)
        }
    }
}
