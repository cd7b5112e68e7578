// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{env, net::SocketAddr, sync::Arc};

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use attend_server::{
    api::router,
    config::AppConfig,
    identity::{IdentityHandoff, OAuthIdentityProvider},
    ledger::{GoogleSheetsStore, InMemorySheet, SheetStore, LEDGER_HEADER},
    state::AppState,
};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env().expect("Failed to load configuration");

    let identity: Arc<dyn IdentityHandoff> = Arc::new(
        OAuthIdentityProvider::new(&config.oauth, &config.public_base_url)
            .expect("Failed to build identity provider client"),
    );

    let store: Arc<dyn SheetStore> = match &config.sheets {
        Some(sheets) => Arc::new(
            GoogleSheetsStore::new(sheets, &config.worksheet_name)
                .expect("Failed to build Sheets client"),
        ),
        None => {
            warn!("no Sheets service account configured; using the in-memory ledger (rows are lost on restart)");
            Arc::new(InMemorySheet::new(
                LEDGER_HEADER.iter().map(|s| s.to_string()).collect(),
            ))
        }
    };

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("Failed to parse bind address");

    let state = AppState::build(config, identity, store);
    let app = router(state);

    info!("attend-server listening on http://{addr} (docs at /docs)");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listen address");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("HTTP server failed");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    }
}
