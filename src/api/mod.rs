// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::state::AppState;

pub mod attend;
pub mod health;
pub mod location;
pub mod pages;
pub mod qr_image;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(pages::index))
        .route("/qr_image.png", get(qr_image::qr_image))
        .route("/attend", get(attend::attend))
        .route("/verify_location", post(location::verify_location))
        .route("/callback", get(attend::callback))
        .route("/cron/generate-qr", get(qr_image::generate_qr))
        .route("/health", get(health::health))
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        location::verify_location,
        qr_image::generate_qr,
        health::health
    ),
    components(
        schemas(
            location::VerifyLocationRequest,
            location::VerifyLocationResponse,
            qr_image::GenerateQrResponse,
            health::HealthResponse
        )
    ),
    tags(
        (name = "CheckIn", description = "Token-gated attendance check-in"),
        (name = "Health", description = "Service health")
    )
)]
struct ApiDoc;
