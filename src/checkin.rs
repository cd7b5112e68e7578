// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Check-in Orchestrator
//!
//! The state machine tying token validation, the access policy, the
//! proximity gate, the identity handoff, and the ledger write together:
//!
//! ```text
//! AwaitingToken -> TokenValidated -> DirectAuth ----------\
//!                        \-> AwaitingLocation              v
//!                                 \-> LocationVerified -> AwaitingIdentity
//!                                                              v
//!                        Done <- RecordWritten <- IdentityResolved
//! ```
//!
//! with an error kind absorbing any step. The identity handoff spans an
//! external redirect/callback round trip, so the machine suspends at
//! `AwaitingIdentity` by persisting the stage and a CSRF state value in
//! the caller's session, and resumes when the callback arrives with that
//! same state value. A rejected location claim keeps the attempt at
//! `AwaitingLocation`; retrying is the client's business.

use std::sync::Arc;

use tracing::{error, info};
use uuid::Uuid;

use crate::error::CheckInError;
use crate::geo::{self, Coordinates};
use crate::identity::{IdentityError, IdentityHandoff};
use crate::ledger::{AttendanceRecord, LedgerWriter};
use crate::policy::AccessPolicy;
use crate::session::{PendingCheckIn, SessionStore};
use crate::token::TokenService;

/// Stages a check-in attempt moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    AwaitingToken,
    TokenValidated,
    /// Trusted origin; the identity handoff starts immediately.
    DirectAuth,
    /// Untrusted origin; a location claim must arrive first.
    AwaitingLocation,
    LocationVerified,
    /// Suspended across the external provider round trip.
    AwaitingIdentity,
    IdentityResolved,
    RecordWritten,
    Done,
}

/// Events that drive the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    TokenAccepted,
    ProximityWaived,
    ProximityRequired,
    LocationAccepted,
    LocationRejected,
    HandoffStarted,
    IdentityReturned,
    RecordAppended,
    Completed,
}

impl Stage {
    /// Next stage for `event`, or `None` when the event is illegal here.
    pub fn advance(self, event: Event) -> Option<Stage> {
        use Event::*;
        use Stage::*;

        match (self, event) {
            (AwaitingToken, TokenAccepted) => Some(TokenValidated),
            (TokenValidated, ProximityWaived) => Some(DirectAuth),
            (TokenValidated, ProximityRequired) => Some(AwaitingLocation),
            // A rejected claim is not an absorbing error; the client may
            // submit another claim against the same token.
            (AwaitingLocation, LocationRejected) => Some(AwaitingLocation),
            (AwaitingLocation, LocationAccepted) => Some(LocationVerified),
            (DirectAuth, HandoffStarted) | (LocationVerified, HandoffStarted) => {
                Some(AwaitingIdentity)
            }
            (AwaitingIdentity, IdentityReturned) => Some(IdentityResolved),
            (IdentityResolved, RecordAppended) => Some(RecordWritten),
            (RecordWritten, Completed) => Some(Done),
            _ => None,
        }
    }
}

/// Where a freshly validated token sends the client next.
#[derive(Debug)]
pub enum Entry {
    /// Trusted origin: redirect straight to the identity provider.
    Redirect { authorization_url: String },
    /// Untrusted origin: show the location-confirmation step.
    LocationGate,
}

/// Drives one check-in attempt through the stages above.
pub struct Orchestrator {
    tokens: Arc<TokenService>,
    policy: AccessPolicy,
    reference_point: Coordinates,
    proximity_radius_meters: f64,
    identity: Arc<dyn IdentityHandoff>,
    ledger: Arc<LedgerWriter>,
    sessions: Arc<SessionStore>,
}

impl Orchestrator {
    pub fn new(
        tokens: Arc<TokenService>,
        policy: AccessPolicy,
        reference_point: Coordinates,
        proximity_radius_meters: f64,
        identity: Arc<dyn IdentityHandoff>,
        ledger: Arc<LedgerWriter>,
        sessions: Arc<SessionStore>,
    ) -> Self {
        Self {
            tokens,
            policy,
            reference_point,
            proximity_radius_meters,
            identity,
            ledger,
            sessions,
        }
    }

    /// Entry point for a scanned QR code: validate the token, then decide
    /// between the direct path and the proximity gate.
    pub async fn begin(
        &self,
        token: Option<&str>,
        client_origin: &str,
        session_id: Uuid,
    ) -> Result<Entry, CheckInError> {
        let token = token.ok_or(CheckInError::TokenMissing)?;
        self.tokens.validate(token).into_result()?;
        let stage = step(Stage::AwaitingToken, Event::TokenAccepted)?;

        if self.policy.requires_proximity_check(client_origin) {
            step(stage, Event::ProximityRequired)?;
            info!(origin = %client_origin, "check-in gated on proximity");
            return Ok(Entry::LocationGate);
        }

        let stage = step(stage, Event::ProximityWaived)?;
        let authorization_url = self.suspend_for_identity(stage, session_id).await?;
        info!(origin = %client_origin, "check-in proceeding directly to identity handoff");
        Ok(Entry::Redirect { authorization_url })
    }

    /// Evaluate a location claim for a gated check-in. On success the
    /// identity handoff begins; out-of-bounds claims report the measured
    /// distance and leave the attempt retryable.
    pub async fn verify_location(
        &self,
        token: &str,
        claim: Coordinates,
        session_id: Uuid,
    ) -> Result<String, CheckInError> {
        // The claim arrives in a separate request; the token gates it the
        // same way it gated entry.
        self.tokens.validate(token).into_result()?;
        let stage = step(Stage::AwaitingToken, Event::TokenAccepted)?;
        let stage = step(stage, Event::ProximityRequired)?;

        let proximity = geo::evaluate(claim, self.reference_point, self.proximity_radius_meters);
        if !proximity.within_bounds {
            step(stage, Event::LocationRejected)?;
            info!(
                distance_meters = proximity.distance_meters.round(),
                "location claim out of bounds"
            );
            return Err(CheckInError::LocationOutOfRange {
                distance_meters: proximity.distance_meters,
            });
        }

        let stage = step(stage, Event::LocationAccepted)?;
        info!(
            distance_meters = proximity.distance_meters.round(),
            "location claim within bounds"
        );
        self.suspend_for_identity(stage, session_id).await
    }

    /// Resume a suspended check-in from the provider callback: correlate
    /// the state value, resolve the identity, write the ledger row.
    pub async fn complete(
        &self,
        session_id: Uuid,
        callback_state: &str,
        code: &str,
    ) -> Result<AttendanceRecord, CheckInError> {
        // Single use: the pending check-in is consumed whatever happens
        // next. A failed completion means rescanning the QR code.
        let pending = self.sessions.remove(session_id).await.ok_or_else(|| {
            CheckInError::IdentityHandoffFailed("no pending check-in for this session".to_string())
        })?;

        if pending.stage != Stage::AwaitingIdentity {
            return Err(CheckInError::IdentityHandoffFailed(format!(
                "pending check-in is at {:?}, not awaiting identity",
                pending.stage
            )));
        }
        if pending.oauth_state != callback_state {
            return Err(CheckInError::IdentityHandoffFailed(
                "callback state does not match the pending check-in".to_string(),
            ));
        }

        let identity = self.identity.resolve(code).await.map_err(|e| match e {
            IdentityError::Unreachable(detail) => CheckInError::UpstreamUnavailable(detail),
            other => CheckInError::IdentityHandoffFailed(other.to_string()),
        })?;
        let stage = step(Stage::AwaitingIdentity, Event::IdentityReturned)?;

        let record = self.ledger.record_now(&identity);
        if let Err(e) = self.ledger.append(&record).await {
            error!(
                error_code = e.error_code(),
                detail = e.detail(),
                email = %record.email,
                "attendance record write failed"
            );
            return Err(e);
        }
        let stage = step(stage, Event::RecordAppended)?;

        // The write is committed; archival is best-effort housekeeping
        // and runs detached so it can never affect this check-in.
        Arc::clone(&self.ledger).spawn_archival();

        step(stage, Event::Completed)?;
        info!(email = %record.email, "check-in recorded");
        Ok(record)
    }

    /// Park the attempt at `AwaitingIdentity` in the session store and
    /// hand back the provider URL to redirect the user to.
    async fn suspend_for_identity(
        &self,
        stage: Stage,
        session_id: Uuid,
    ) -> Result<String, CheckInError> {
        let stage = step(stage, Event::HandoffStarted)?;
        let pending = PendingCheckIn::new(stage);
        let authorization_url = self.identity.authorization_url(&pending.oauth_state);
        self.sessions.insert(session_id, pending).await;
        Ok(authorization_url)
    }
}

/// Advance the machine, folding an out-of-order event into the error
/// taxonomy. The fixed call sequences above keep this from firing; it
/// exists so a future misordering fails closed instead of panicking.
fn step(stage: Stage, event: Event) -> Result<Stage, CheckInError> {
    stage.advance(event).ok_or_else(|| {
        CheckInError::IdentityHandoffFailed(format!(
            "check-in cannot accept {event:?} while at {stage:?}"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::identity::Identity;
    use crate::ledger::{InMemorySheet, LEDGER_HEADER};

    const REFERENCE: Coordinates = Coordinates {
        latitude: 36.0760254,
        longitude: 136.2129435,
    };

    struct StubProvider {
        fail_resolve: AtomicBool,
        unreachable: AtomicBool,
    }

    impl StubProvider {
        fn new() -> Self {
            Self {
                fail_resolve: AtomicBool::new(false),
                unreachable: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl IdentityHandoff for StubProvider {
        fn authorization_url(&self, state: &str) -> String {
            format!("https://accounts.example.com/auth?state={state}")
        }

        async fn resolve(&self, _code: &str) -> Result<Identity, IdentityError> {
            if self.unreachable.load(Ordering::SeqCst) {
                return Err(IdentityError::Unreachable("connection refused".to_string()));
            }
            if self.fail_resolve.load(Ordering::SeqCst) {
                return Err(IdentityError::Exchange("bad code".to_string()));
            }
            Ok(Identity {
                email: "taro@example.com".to_string(),
                display_name: "Taro".to_string(),
            })
        }
    }

    struct Fixture {
        orchestrator: Orchestrator,
        tokens: Arc<TokenService>,
        sessions: Arc<SessionStore>,
        sheet: Arc<InMemorySheet>,
        provider: Arc<StubProvider>,
    }

    fn fixture_with_limit(row_limit: usize) -> Fixture {
        let tokens = Arc::new(TokenService::new("orchestrator-test-secret", 600));
        let sessions = Arc::new(SessionStore::new());
        let sheet = Arc::new(InMemorySheet::new(
            LEDGER_HEADER.iter().map(|s| s.to_string()).collect(),
        ));
        let ledger = Arc::new(LedgerWriter::new(
            sheet.clone(),
            "Attendance".to_string(),
            row_limit,
            9,
        ));
        let provider = Arc::new(StubProvider::new());

        let orchestrator = Orchestrator::new(
            tokens.clone(),
            AccessPolicy::new(vec!["127.0.0.1".to_string()]),
            REFERENCE,
            100.0,
            provider.clone(),
            ledger,
            sessions.clone(),
        );

        Fixture {
            orchestrator,
            tokens,
            sessions,
            sheet,
            provider,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_limit(1000)
    }

    // --- stage machine ---

    #[test]
    fn direct_path_walks_the_machine_to_done() {
        let stage = Stage::AwaitingToken
            .advance(Event::TokenAccepted)
            .and_then(|s| s.advance(Event::ProximityWaived))
            .and_then(|s| s.advance(Event::HandoffStarted))
            .and_then(|s| s.advance(Event::IdentityReturned))
            .and_then(|s| s.advance(Event::RecordAppended))
            .and_then(|s| s.advance(Event::Completed));
        assert_eq!(stage, Some(Stage::Done));
    }

    #[test]
    fn gated_path_walks_the_machine_to_done() {
        let stage = Stage::AwaitingToken
            .advance(Event::TokenAccepted)
            .and_then(|s| s.advance(Event::ProximityRequired))
            .and_then(|s| s.advance(Event::LocationAccepted))
            .and_then(|s| s.advance(Event::HandoffStarted))
            .and_then(|s| s.advance(Event::IdentityReturned))
            .and_then(|s| s.advance(Event::RecordAppended))
            .and_then(|s| s.advance(Event::Completed));
        assert_eq!(stage, Some(Stage::Done));
    }

    #[test]
    fn rejected_location_keeps_the_attempt_retryable() {
        let stage = Stage::AwaitingLocation.advance(Event::LocationRejected);
        assert_eq!(stage, Some(Stage::AwaitingLocation));
    }

    #[test]
    fn out_of_order_events_are_illegal() {
        assert_eq!(Stage::AwaitingToken.advance(Event::Completed), None);
        assert_eq!(Stage::TokenValidated.advance(Event::IdentityReturned), None);
        assert_eq!(Stage::AwaitingIdentity.advance(Event::TokenAccepted), None);
        assert_eq!(Stage::Done.advance(Event::Completed), None);
        // The proximity gate cannot be skipped once required.
        assert_eq!(Stage::AwaitingLocation.advance(Event::HandoffStarted), None);
    }

    // --- begin ---

    #[tokio::test]
    async fn trusted_origin_goes_straight_to_the_provider() {
        let f = fixture();
        let token = f.tokens.issue().unwrap();
        let session_id = Uuid::new_v4();

        let entry = f
            .orchestrator
            .begin(Some(&token), "127.0.0.1", session_id)
            .await
            .unwrap();

        let Entry::Redirect { authorization_url } = entry else {
            panic!("expected a direct redirect");
        };
        let pending = f.sessions.get(session_id).await.expect("pending check-in");
        assert_eq!(pending.stage, Stage::AwaitingIdentity);
        assert!(authorization_url.contains(&pending.oauth_state));
    }

    #[tokio::test]
    async fn untrusted_origin_is_sent_to_the_location_gate() {
        let f = fixture();
        let token = f.tokens.issue().unwrap();
        let session_id = Uuid::new_v4();

        let entry = f
            .orchestrator
            .begin(Some(&token), "203.0.113.9", session_id)
            .await
            .unwrap();

        assert!(matches!(entry, Entry::LocationGate));
        // Nothing is pending until the location is verified.
        assert!(f.sessions.get(session_id).await.is_none());
    }

    #[tokio::test]
    async fn begin_rejects_missing_bad_and_expired_tokens() {
        let f = fixture();
        let session_id = Uuid::new_v4();

        let err = f
            .orchestrator
            .begin(None, "127.0.0.1", session_id)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckInError::TokenMissing));

        let err = f
            .orchestrator
            .begin(Some("garbage"), "127.0.0.1", session_id)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckInError::TokenInvalid));

        let stale = f
            .tokens
            .issue_at(chrono::Utc::now() - chrono::Duration::seconds(3600))
            .unwrap();
        let err = f
            .orchestrator
            .begin(Some(&stale), "127.0.0.1", session_id)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckInError::TokenExpired));
    }

    // --- verify_location ---

    #[tokio::test]
    async fn claim_at_the_reference_point_starts_the_handoff() {
        let f = fixture();
        let token = f.tokens.issue().unwrap();
        let session_id = Uuid::new_v4();

        let url = f
            .orchestrator
            .verify_location(&token, REFERENCE, session_id)
            .await
            .unwrap();

        let pending = f.sessions.get(session_id).await.expect("pending check-in");
        assert_eq!(pending.stage, Stage::AwaitingIdentity);
        assert!(url.contains(&pending.oauth_state));
    }

    #[tokio::test]
    async fn faraway_claim_reports_the_measured_distance() {
        let f = fixture();
        let token = f.tokens.issue().unwrap();
        // ~500 m north of the reference point.
        let claim = Coordinates {
            latitude: 36.0805224,
            longitude: 136.2129435,
        };

        let err = f
            .orchestrator
            .verify_location(&token, claim, Uuid::new_v4())
            .await
            .unwrap_err();

        let CheckInError::LocationOutOfRange { distance_meters } = err else {
            panic!("expected an out-of-range rejection");
        };
        let rounded = distance_meters.round() as i64;
        assert!((499..=501).contains(&rounded), "distance was {rounded} m");
    }

    #[tokio::test]
    async fn verify_location_revalidates_the_token() {
        let f = fixture();
        let err = f
            .orchestrator
            .verify_location("garbage", REFERENCE, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, CheckInError::TokenInvalid));
    }

    // --- complete ---

    async fn suspended_session(f: &Fixture) -> (Uuid, String) {
        let token = f.tokens.issue().unwrap();
        let session_id = Uuid::new_v4();
        f.orchestrator
            .begin(Some(&token), "127.0.0.1", session_id)
            .await
            .unwrap();
        let pending = f.sessions.get(session_id).await.unwrap();
        (session_id, pending.oauth_state)
    }

    #[tokio::test]
    async fn callback_writes_one_record_and_clears_the_session() {
        let f = fixture();
        let (session_id, state) = suspended_session(&f).await;

        let record = f
            .orchestrator
            .complete(session_id, &state, "auth-code")
            .await
            .unwrap();

        assert_eq!(record.email, "taro@example.com");
        let rows = f.sheet.rows().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][1], "taro@example.com");
        assert_eq!(rows[0][2], "Taro");
        assert!(f.sessions.get(session_id).await.is_none());
    }

    #[tokio::test]
    async fn callback_without_a_pending_check_in_fails() {
        let f = fixture();
        let err = f
            .orchestrator
            .complete(Uuid::new_v4(), "state", "code")
            .await
            .unwrap_err();
        assert!(matches!(err, CheckInError::IdentityHandoffFailed(_)));
    }

    #[tokio::test]
    async fn mismatched_state_is_rejected_and_consumes_the_attempt() {
        let f = fixture();
        let (session_id, _state) = suspended_session(&f).await;

        let err = f
            .orchestrator
            .complete(session_id, "forged-state", "code")
            .await
            .unwrap_err();
        assert!(matches!(err, CheckInError::IdentityHandoffFailed(_)));

        // Fail closed: the pending check-in is gone, no replay window.
        assert!(f.sessions.get(session_id).await.is_none());
        assert!(f.sheet.rows().await.is_empty());
    }

    #[tokio::test]
    async fn provider_failure_surfaces_as_handoff_failed() {
        let f = fixture();
        let (session_id, state) = suspended_session(&f).await;
        f.provider.fail_resolve.store(true, Ordering::SeqCst);

        let err = f
            .orchestrator
            .complete(session_id, &state, "code")
            .await
            .unwrap_err();
        assert!(matches!(err, CheckInError::IdentityHandoffFailed(_)));
        assert!(f.sheet.rows().await.is_empty());
    }

    #[tokio::test]
    async fn unreachable_provider_surfaces_as_upstream_unavailable() {
        let f = fixture();
        let (session_id, state) = suspended_session(&f).await;
        f.provider.unreachable.store(true, Ordering::SeqCst);

        let err = f
            .orchestrator
            .complete(session_id, &state, "code")
            .await
            .unwrap_err();
        assert!(matches!(err, CheckInError::UpstreamUnavailable(_)));
    }

    #[tokio::test]
    async fn over_threshold_write_still_succeeds_while_archival_runs_detached() {
        let f = fixture_with_limit(1);
        for _ in 0..2 {
            let (session_id, state) = suspended_session(&f).await;
            f.orchestrator
                .complete(session_id, &state, "code")
                .await
                .unwrap();
        }

        // Third check-in pushes past the limit; the write must succeed
        // regardless of what archival does afterwards.
        let (session_id, state) = suspended_session(&f).await;
        f.orchestrator
            .complete(session_id, &state, "code")
            .await
            .unwrap();
    }
}
