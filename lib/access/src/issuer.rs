//! Opening and closing sessions.

use chrono::Duration;
use csdt_core::{SessionId, SubjectId};
use rootcause::prelude::Report;
use std::sync::Arc;
use tracing::info;

use crate::clock::Clock;
use crate::error::{IssueError, StoreError};
use crate::permission::PermissionMap;
use crate::policy::AccessPolicy;
use crate::role::Role;
use crate::session::{Session, SessionToken, SubjectKind};
use crate::store::SessionStore;

/// A login to turn into a session.
#[derive(Debug, Clone)]
pub struct OpenSession {
    pub subject_id: SubjectId,
    pub subject_kind: SubjectKind,
    pub role: Role,
    /// Per-subject grants and revocations layered over the role defaults.
    pub overrides: PermissionMap,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Creates sessions with privileges resolved from the access policy.
#[derive(Clone)]
pub struct SessionIssuer {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    policy: Arc<AccessPolicy>,
    ttl: Duration,
}

impl SessionIssuer {
    #[must_use]
    pub fn new(
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        policy: Arc<AccessPolicy>,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            policy,
            ttl,
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Opens a session for a subject that has already been authenticated.
    ///
    /// The access level is the role's rank and the permissions are the role
    /// defaults merged with the request's overrides. Earlier sessions of the
    /// same subject stay open.
    ///
    /// # Errors
    ///
    /// Fails for roles outside the rank table, for a lifetime that overflows
    /// the calendar, when no token can be generated, or when the store
    /// rejects the session.
    pub async fn open(&self, request: OpenSession) -> Result<Session, Report<IssueError>> {
        if !self.policy.hierarchy().is_known(&request.role) {
            return Err(IssueError::UnknownRole {
                role: request.role.to_string(),
            }
            .into());
        }

        let now = self.clock.now();
        if now.checked_add_signed(self.ttl).is_none() {
            return Err(IssueError::ExpiryOutOfRange {
                minutes: self.ttl.num_minutes(),
            }
            .into());
        }

        let resolved = self.policy.resolve(&request.role, &request.overrides);
        let token = SessionToken::generate()?;
        let session = Session::new(
            token,
            request.subject_id,
            request.subject_kind,
            request.role,
            resolved.access_level,
            resolved.permissions,
            now,
            self.ttl,
        )
        .with_client(request.client_ip, request.user_agent);

        self.store
            .insert(&session)
            .await
            .map_err(|e| IssueError::Store {
                details: e.to_string(),
            })?;

        info!(
            session = %session.id(),
            subject = %session.subject_id(),
            kind = %session.subject_kind(),
            expires_at = %session.expires_at(),
            "session opened"
        );
        Ok(session)
    }

    /// Closes a session. Closing an unknown or closed session is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the update fails.
    pub async fn close(&self, session_id: SessionId) -> Result<(), Report<StoreError>> {
        self.store.close(session_id).await?;
        info!(session = %session_id, "session closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::permission::{PermissionEvaluator, PermissionKey, Subject};
    use crate::role::RoleHierarchy;
    use crate::session::SessionState;
    use crate::store::MemorySessionStore;
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::HashMap;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 2, 9, 30, 0).unwrap()
    }

    fn issuer(store: &MemorySessionStore) -> SessionIssuer {
        let mut grants = HashMap::new();
        grants.insert("cliente".to_string(), vec!["pqrsfd.crear".to_string()]);
        let evaluator =
            PermissionEvaluator::from_grants(&grants, Role::AdministradorGeneral).expect("grants");
        let policy = AccessPolicy::new(RoleHierarchy::standard(), evaluator).expect("policy");
        SessionIssuer::new(
            Arc::new(store.clone()),
            Arc::new(ManualClock::new(t0())),
            Arc::new(policy),
            Duration::minutes(120),
        )
    }

    fn login(role: Role) -> OpenSession {
        OpenSession {
            subject_id: SubjectId::new(),
            subject_kind: SubjectKind::Client,
            role,
            overrides: PermissionMap::new(),
            client_ip: Some("181.50.1.2".to_string()),
            user_agent: Some("Mozilla/5.0".to_string()),
        }
    }

    #[tokio::test]
    async fn open_resolves_privileges() {
        let store = MemorySessionStore::new();
        let issuer = issuer(&store);

        let mut request = login(Role::Cliente);
        request
            .overrides
            .grant(&PermissionKey::new("veedurias", "ver"));
        let session = issuer.open(request).await.expect("open");

        assert_eq!(session.access_level(), 1);
        assert_eq!(
            session
                .permissions()
                .lookup(&PermissionKey::new("pqrsfd", "crear")),
            Some(true)
        );
        assert_eq!(
            session
                .permissions()
                .lookup(&PermissionKey::new("veedurias", "ver")),
            Some(true)
        );
        assert_eq!(session.expires_at(), t0() + Duration::minutes(120));
        assert_eq!(session.client_ip(), Some("181.50.1.2"));
        assert_eq!(store.get(session.id()), Some(session));
    }

    #[tokio::test]
    async fn open_rejects_unknown_role() {
        let store = MemorySessionStore::new();
        let err = issuer(&store)
            .open(login(Role::from("visitante")))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("visitante"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn open_rejects_a_lifetime_past_the_calendar() {
        let store = MemorySessionStore::new();
        let issuer = SessionIssuer::new(
            Arc::new(store.clone()),
            Arc::new(ManualClock::new(t0())),
            Arc::new(AccessPolicy::standard()),
            Duration::MAX,
        );

        let err = issuer.open(login(Role::Operador)).await.unwrap_err();
        assert!(matches!(
            err.current_context(),
            IssueError::ExpiryOutOfRange { .. }
        ));
        assert!(err.to_string().contains("out of range"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn each_open_issues_a_new_token() {
        let store = MemorySessionStore::new();
        let issuer = issuer(&store);
        let request = login(Role::Operador);

        let first = issuer.open(request.clone()).await.expect("open");
        let second = issuer.open(request).await.expect("open");

        assert_ne!(first.token(), second.token());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let store = MemorySessionStore::new();
        let issuer = issuer(&store);
        let session = issuer.open(login(Role::Operador)).await.expect("open");

        issuer.close(session.id()).await.expect("close");
        issuer.close(session.id()).await.expect("close again");
        issuer.close(SessionId::new()).await.expect("close unknown");

        assert_eq!(
            store.get(session.id()).map(|s| s.state()),
            Some(SessionState::Closed)
        );
    }
}
