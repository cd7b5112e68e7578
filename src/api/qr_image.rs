// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! QR image delivery.
//!
//! `GET /qr_image.png` serves a PNG whose payload is the `/attend` entry
//! URL with a freshly issued token. A scheduled trigger can prerender the
//! image through `GET /cron/generate-qr`; the cached copy is served until
//! its embedded token expires, after which rendering falls back to
//! on-demand.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use utoipa::{IntoParams, ToSchema};

use super::pages;
use crate::qr::render_qr_png;
use crate::state::{AppState, PrerenderedQr};

pub async fn qr_image(State(app): State<AppState>) -> Response {
    if let Some(cached) = app.qr_cache.read().await.clone() {
        if cached.expires_at > Utc::now() {
            return png_response(cached.png);
        }
    }

    match render_current(&app) {
        Ok(prerendered) => png_response(prerendered.png),
        Err(e) => {
            error!(error = %e, "QR image rendering failed");
            pages::internal_error_page()
        }
    }
}

#[derive(Deserialize, IntoParams)]
pub struct CronQuery {
    pub secret: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct GenerateQrResponse {
    pub status: String,
    /// When the prerendered image's token stops being valid.
    pub expires_at: chrono::DateTime<Utc>,
}

/// Refresh the prerendered QR image. Guarded by a shared secret so only
/// the scheduled trigger can rotate the cached code.
#[utoipa::path(
    get,
    path = "/cron/generate-qr",
    params(CronQuery),
    tag = "CheckIn",
    responses(
        (status = 200, description = "Image regenerated", body = GenerateQrResponse),
        (status = 401, description = "Missing or wrong secret")
    )
)]
pub async fn generate_qr(State(app): State<AppState>, Query(query): Query<CronQuery>) -> Response {
    let authorized = matches!(
        (&app.config.cron_secret, query.secret.as_deref()),
        (Some(expected), Some(given)) if expected == given
    );
    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": "missing or wrong secret",
                "error_code": "cron_unauthorized"
            })),
        )
            .into_response();
    }

    match render_current(&app) {
        Ok(prerendered) => {
            let expires_at = prerendered.expires_at;
            *app.qr_cache.write().await = Some(prerendered);
            info!(%expires_at, "prerendered QR image refreshed");
            Json(GenerateQrResponse {
                status: "ok".to_string(),
                expires_at,
            })
            .into_response()
        }
        Err(e) => {
            error!(error = %e, "QR image rendering failed");
            pages::internal_error_page()
        }
    }
}

fn render_current(app: &AppState) -> Result<PrerenderedQr, Box<dyn std::error::Error + Send + Sync>> {
    let token = app.tokens.issue()?;
    let url = format!("{}/attend?token={}", app.config.public_base_url, token);
    let png = render_qr_png(&url)?;
    Ok(PrerenderedQr {
        png,
        expires_at: Utc::now() + Duration::seconds(app.tokens.ttl_secs()),
    })
}

fn png_response(png: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, "image/png"),
            // Every fetch may carry a new token; never cache.
            (header::CACHE_CONTROL, "no-store"),
        ],
        png,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::app_state;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn qr_image_is_a_png() {
        let (state, _sheet) = app_state();
        let response = qr_image(State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "image/png"
        );

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[tokio::test]
    async fn cron_without_secret_is_unauthorized() {
        let (state, _sheet) = app_state();
        let response = generate_qr(State(state), Query(CronQuery { secret: None })).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn cron_with_wrong_secret_is_unauthorized() {
        let (state, _sheet) = app_state();
        let response = generate_qr(
            State(state),
            Query(CronQuery {
                secret: Some("wrong".to_string()),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn cron_with_the_right_secret_fills_the_cache() {
        let (state, _sheet) = app_state();
        let response = generate_qr(
            State(state.clone()),
            Query(CronQuery {
                secret: Some("cron-secret".to_string()),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let cached = state.qr_cache.read().await.clone().expect("cached image");
        assert!(cached.expires_at > Utc::now());
        assert_eq!(&cached.png[..8], b"\x89PNG\r\n\x1a\n");
    }
}
