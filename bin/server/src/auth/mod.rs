//! Authorization surface of the CSDT server.
//!
//! This module provides:
//! - The `Authorized` extractor, which runs the access gate for a route
//! - Session routes: who am I, logout, open, and lookup
//!
//! # Authorization Model
//!
//! Each route declares its [`Requirement`](csdt_access::Requirement) as an
//! `Extension` layer. The extractor reads it together with the bearer token
//! and hands both to the [`AccessGate`]. Routes without a declared
//! requirement only need a valid session.
//!
//! Login itself happens elsewhere. Once a subject is authenticated, the
//! login service calls `POST /auth/sessions` with a general administrator
//! session and receives the token to hand to the client.

pub mod middleware;
pub mod routes;

use chrono::Duration;
use csdt_access::{AccessGate, AccessPolicy, AuditSink, Clock, SessionIssuer, SessionStore};
use std::sync::Arc;

pub use middleware::{AccessRejection, Authorized};
pub use routes::{find_session, health, logout, me, open_session};

/// Shared application state.
pub struct AppState {
    /// Per-request access decisions.
    pub gate: AccessGate,
    /// Opens and closes sessions.
    pub issuer: SessionIssuer,
    /// Direct session lookups.
    pub store: Arc<dyn SessionStore>,
    /// Time source shared with the gate.
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(
        store: Arc<dyn SessionStore>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        policy: Arc<AccessPolicy>,
        session_ttl: Duration,
    ) -> Self {
        let gate = AccessGate::new(store.clone(), audit, clock.clone(), policy.clone());
        let issuer = SessionIssuer::new(store.clone(), clock.clone(), policy, session_ttl);
        Self {
            gate,
            issuer,
            store,
            clock,
        }
    }
}
