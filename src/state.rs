// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::checkin::Orchestrator;
use crate::config::AppConfig;
use crate::identity::IdentityHandoff;
use crate::ledger::{LedgerWriter, SheetStore};
use crate::policy::AccessPolicy;
use crate::session::SessionStore;
use crate::token::TokenService;

/// A QR image rendered ahead of time by the cron trigger, served until its
/// embedded token expires.
#[derive(Clone)]
pub struct PrerenderedQr {
    pub png: Vec<u8>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub tokens: Arc<TokenService>,
    pub orchestrator: Arc<Orchestrator>,
    pub qr_cache: Arc<RwLock<Option<PrerenderedQr>>>,
    cookie_key: Key,
}

impl AppState {
    /// Wire the collaborators together around `config`. The identity
    /// provider and the sheet store are injected so the same wiring serves
    /// production and tests.
    pub fn build(
        config: AppConfig,
        identity: Arc<dyn IdentityHandoff>,
        store: Arc<dyn SheetStore>,
    ) -> Self {
        let config = Arc::new(config);
        let tokens = Arc::new(TokenService::new(
            &config.token_secret,
            config.token_ttl_secs,
        ));
        let sessions = Arc::new(SessionStore::new());
        let ledger = Arc::new(LedgerWriter::new(
            store,
            config.worksheet_name.clone(),
            config.sheet_row_limit,
            config.utc_offset_hours,
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            tokens.clone(),
            AccessPolicy::new(config.trusted_origin_prefixes.clone()),
            config.reference_point,
            config.proximity_radius_meters,
            identity,
            ledger,
            sessions,
        ));

        // Config validation guarantees the secret is long enough to
        // derive from.
        let cookie_key = Key::derive_from(config.session_secret.as_bytes());

        Self {
            config,
            tokens,
            orchestrator,
            qr_cache: Arc::new(RwLock::new(None)),
            cookie_key,
        }
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Key {
        state.cookie_key.clone()
    }
}
