// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Pending check-in session store.
//!
//! The identity handoff spans a redirect/callback pair, so a check-in's
//! in-flight state has to survive the context switch. Each browser session
//! (correlated by a signed cookie) owns at most one pending check-in: the
//! orchestrator stage plus the CSRF-style `state` value the provider must
//! echo back. Inserting again overwrites the previous pending check-in, and
//! an abandoned one is dropped by the expiry sweep; no thread or lock is
//! held across the external hop.

use std::collections::HashMap;

use axum_extra::extract::cookie::{Cookie, SameSite, SignedCookieJar};
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::checkin::Stage;

/// Cookie carrying the session id.
pub const SESSION_COOKIE: &str = "attend_sid";

/// Pending check-ins older than this are dropped on the next sweep.
const DEFAULT_MAX_AGE_SECS: i64 = 1800;

/// One suspended check-in, waiting for the provider callback.
#[derive(Debug, Clone)]
pub struct PendingCheckIn {
    pub stage: Stage,
    pub oauth_state: String,
    pub created_at: DateTime<Utc>,
}

impl PendingCheckIn {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            oauth_state: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
        }
    }
}

/// In-memory map of session id → pending check-in.
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, PendingCheckIn>>,
    max_age: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::with_max_age(Duration::seconds(DEFAULT_MAX_AGE_SECS))
    }

    pub fn with_max_age(max_age: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_age,
        }
    }

    /// Record a pending check-in, replacing any previous one for this
    /// session. Expired entries from other sessions are swept here so the
    /// map stays bounded without a background task.
    pub async fn insert(&self, session_id: Uuid, pending: PendingCheckIn) {
        let mut sessions = self.sessions.write().await;
        let cutoff = Utc::now() - self.max_age;
        sessions.retain(|_, p| p.created_at > cutoff);
        sessions.insert(session_id, pending);
    }

    pub async fn get(&self, session_id: Uuid) -> Option<PendingCheckIn> {
        self.sessions.read().await.get(&session_id).cloned()
    }

    /// Remove and return the pending check-in, if any.
    pub async fn remove(&self, session_id: Uuid) -> Option<PendingCheckIn> {
        self.sessions.write().await.remove(&session_id)
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// The session id carried by the signed cookie, if present and well-formed.
pub fn session_from_jar(jar: &SignedCookieJar) -> Option<Uuid> {
    jar.get(SESSION_COOKIE)
        .and_then(|cookie| Uuid::parse_str(cookie.value()).ok())
}

/// Reuse the caller's session or mint a fresh one. `SameSite=Lax` so the
/// cookie still rides along on the top-level redirect back from the
/// identity provider.
pub fn establish_session(jar: SignedCookieJar) -> (SignedCookieJar, Uuid) {
    if let Some(id) = session_from_jar(&jar) {
        return (jar, id);
    }

    let id = Uuid::new_v4();
    let cookie = Cookie::build((SESSION_COOKIE, id.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();
    (jar.add(cookie), id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sessions_do_not_share_pending_state() {
        let store = SessionStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        store
            .insert(a, PendingCheckIn::new(Stage::AwaitingIdentity))
            .await;

        assert!(store.get(a).await.is_some());
        assert!(store.get(b).await.is_none());
    }

    #[tokio::test]
    async fn insert_overwrites_previous_pending_check_in() {
        let store = SessionStore::new();
        let id = Uuid::new_v4();

        let first = PendingCheckIn::new(Stage::AwaitingIdentity);
        let first_state = first.oauth_state.clone();
        store.insert(id, first).await;
        store
            .insert(id, PendingCheckIn::new(Stage::AwaitingIdentity))
            .await;

        let current = store.get(id).await.expect("pending check-in");
        assert_ne!(current.oauth_state, first_state);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn remove_clears_the_entry() {
        let store = SessionStore::new();
        let id = Uuid::new_v4();

        store
            .insert(id, PendingCheckIn::new(Stage::AwaitingIdentity))
            .await;
        assert!(store.remove(id).await.is_some());
        assert!(store.get(id).await.is_none());
        assert!(store.remove(id).await.is_none());
    }

    #[tokio::test]
    async fn expired_entries_are_swept_on_insert() {
        let store = SessionStore::with_max_age(Duration::seconds(60));
        let stale = Uuid::new_v4();

        let mut old = PendingCheckIn::new(Stage::AwaitingIdentity);
        old.created_at = Utc::now() - Duration::seconds(120);
        store.insert(stale, old).await;

        store
            .insert(Uuid::new_v4(), PendingCheckIn::new(Stage::AwaitingIdentity))
            .await;

        assert!(store.get(stale).await.is_none());
    }
}
