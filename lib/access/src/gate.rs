//! Per-request access decisions.
//!
//! [`AccessGate::authorize`] walks a request through
//! `Unauthenticated -> TokenPresent -> SessionValid -> RoleOk -> PermissionOk
//! -> Forwarded`. Any stage can end in a [`Denial`]. Each decision writes
//! exactly one audit entry: `Critico` for denials, `Normal` for successes.
//! Audit failures are logged and dropped; they never change the outcome.

use chrono::{DateTime, Utc};
use csdt_core::{SessionId, SubjectId};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::audit::{AuditEntry, AuditSink, RequestMetadata};
use crate::clock::Clock;
use crate::permission::{PermissionCheck, PermissionKey, PermissionMap, Subject};
use crate::policy::AccessPolicy;
use crate::role::Role;
use crate::session::{Session, SessionState, SessionToken, SubjectKind};
use crate::store::SessionStore;

const BEARER_SCHEME: &str = "bearer";

/// Credentials presented with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// No `Authorization` header.
    Missing,
    /// A header that is not `Bearer <token>`.
    Malformed,
    /// A bearer token.
    Bearer(SessionToken),
}

impl Credentials {
    /// Interprets a raw `Authorization` header value.
    #[must_use]
    pub fn from_header(value: Option<&str>) -> Self {
        let Some(value) = value else {
            return Self::Missing;
        };
        match value.trim().split_once(' ') {
            Some((scheme, token))
                if scheme.eq_ignore_ascii_case(BEARER_SCHEME) && !token.trim().is_empty() =>
            {
                Self::Bearer(SessionToken::new(token.trim()))
            }
            _ => Self::Malformed,
        }
    }
}

/// What a route demands of the caller. Checks run role, then level, then
/// permission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Requirement {
    role: Option<Role>,
    min_level: Option<u8>,
    permission: Option<PermissionKey>,
}

impl Requirement {
    /// Any valid session.
    #[must_use]
    pub fn authenticated() -> Self {
        Self::default()
    }

    /// A role at least as high as `role`.
    #[must_use]
    pub fn role(role: impl Into<Role>) -> Self {
        Self::default().with_role(role)
    }

    /// A grant for `function` on `resource`.
    #[must_use]
    pub fn permission(resource: impl Into<String>, function: impl Into<String>) -> Self {
        Self::default().with_permission(resource, function)
    }

    /// A numeric access level of at least `level`.
    #[must_use]
    pub fn min_level(level: u8) -> Self {
        Self::default().with_min_level(level)
    }

    #[must_use]
    pub fn with_role(mut self, role: impl Into<Role>) -> Self {
        self.role = Some(role.into());
        self
    }

    #[must_use]
    pub fn with_permission(
        mut self,
        resource: impl Into<String>,
        function: impl Into<String>,
    ) -> Self {
        self.permission = Some(PermissionKey::new(resource, function));
        self
    }

    #[must_use]
    pub fn with_min_level(mut self, level: u8) -> Self {
        self.min_level = Some(level);
        self
    }

    /// Action name recorded in the audit log.
    #[must_use]
    pub fn action(&self) -> String {
        if let Some(key) = &self.permission {
            return key.to_string();
        }
        if let Some(role) = &self.role {
            return format!("role:{role}");
        }
        if let Some(level) = self.min_level {
            return format!("level:{level}");
        }
        "authenticated".to_string()
    }
}

/// One request to authorize.
#[derive(Debug, Clone)]
pub struct AccessRequest {
    pub credentials: Credentials,
    pub requirement: Requirement,
    pub metadata: RequestMetadata,
}

/// How far a request got before it was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Unauthenticated,
    TokenPresent,
    SessionValid,
    RoleOk,
    PermissionOk,
    Forwarded,
}

/// Machine-readable denial code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Unauthorized,
    Unauthenticated,
    InvalidSession,
    SessionExpired,
    InsufficientRole,
    InsufficientPermission,
    PermissionDenied,
    AccessLevelDenied,
    InternalError,
}

impl ErrorCode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::InvalidSession => "INVALID_SESSION",
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::InsufficientRole => "INSUFFICIENT_ROLE",
            Self::InsufficientPermission => "INSUFFICIENT_PERMISSION",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::AccessLevelDenied => "ACCESS_LEVEL_DENIED",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// HTTP status: 401 for authentication, 403 for authorization, 500
    /// for internal failures.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::Unauthorized
            | Self::Unauthenticated
            | Self::InvalidSession
            | Self::SessionExpired => 401,
            Self::InsufficientRole
            | Self::InsufficientPermission
            | Self::PermissionDenied
            | Self::AccessLevelDenied => 403,
            Self::InternalError => 500,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a request was denied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialReason {
    MissingToken,
    MalformedCredentials,
    InvalidSession,
    SessionExpired,
    InsufficientRole { required: Role, actual: Role },
    LevelTooLow { required: u8, actual: u8 },
    /// Stored level and role rank disagree; neither is trusted.
    LevelMismatch { stored: u8, rank: u8 },
    InsufficientPermission { key: PermissionKey },
    PermissionRevoked { key: PermissionKey },
    Internal,
}

impl DenialReason {
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::MissingToken => ErrorCode::Unauthorized,
            Self::MalformedCredentials => ErrorCode::Unauthenticated,
            Self::InvalidSession => ErrorCode::InvalidSession,
            Self::SessionExpired => ErrorCode::SessionExpired,
            Self::InsufficientRole { .. } => ErrorCode::InsufficientRole,
            Self::LevelTooLow { .. } | Self::LevelMismatch { .. } => ErrorCode::AccessLevelDenied,
            Self::InsufficientPermission { .. } => ErrorCode::InsufficientPermission,
            Self::PermissionRevoked { .. } => ErrorCode::PermissionDenied,
            Self::Internal => ErrorCode::InternalError,
        }
    }

    /// Caller-facing message. Never includes token or session identifiers.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::MissingToken => "authentication token required".to_string(),
            Self::MalformedCredentials => {
                "authorization header must use the Bearer scheme".to_string()
            }
            Self::InvalidSession => "session is not valid".to_string(),
            Self::SessionExpired => "session has expired".to_string(),
            Self::InsufficientRole { required, .. } => {
                format!("role '{required}' or higher is required")
            }
            Self::LevelTooLow { required, .. } => {
                format!("access level {required} or higher is required")
            }
            Self::LevelMismatch { .. } => {
                "session access level does not match its role".to_string()
            }
            Self::InsufficientPermission { key } => format!("permission '{key}' is required"),
            Self::PermissionRevoked { key } => format!("permission '{key}' has been denied"),
            Self::Internal => "internal error while checking access".to_string(),
        }
    }
}

/// JSON body returned to the caller on denial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DenialBody {
    pub success: bool,
    pub message: String,
    pub error_code: ErrorCode,
}

/// A denied request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    reason: DenialReason,
    stage: Stage,
}

impl Denial {
    #[must_use]
    pub fn new(reason: DenialReason, stage: Stage) -> Self {
        Self { reason, stage }
    }

    #[must_use]
    pub fn reason(&self) -> &DenialReason {
        &self.reason
    }

    /// The last stage the request reached.
    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        self.reason.error_code()
    }

    #[must_use]
    pub fn status(&self) -> u16 {
        self.error_code().status()
    }

    #[must_use]
    pub fn message(&self) -> String {
        self.reason.message()
    }

    #[must_use]
    pub fn body(&self) -> DenialBody {
        DenialBody {
            success: false,
            message: self.message(),
            error_code: self.error_code(),
        }
    }
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_code(), self.message())
    }
}

impl std::error::Error for Denial {}

/// Resolved identity attached to an authorized request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub subject_id: SubjectId,
    pub subject_kind: SubjectKind,
    pub role: Role,
    pub permissions: PermissionMap,
    pub access_level: u8,
    pub session_id: SessionId,
}

impl From<&Session> for Identity {
    fn from(session: &Session) -> Self {
        Self {
            subject_id: session.subject_id(),
            subject_kind: session.subject_kind(),
            role: session.role().clone(),
            permissions: session.permissions().clone(),
            access_level: session.access_level(),
            session_id: session.id(),
        }
    }
}

impl Subject for Identity {
    fn role(&self) -> &Role {
        &self.role
    }

    fn permissions(&self) -> &PermissionMap {
        &self.permissions
    }

    fn access_level(&self) -> u8 {
        self.access_level
    }
}

/// Composes session lookup, role, level and permission checks, and auditing.
#[derive(Clone)]
pub struct AccessGate {
    store: Arc<dyn SessionStore>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    policy: Arc<AccessPolicy>,
}

impl AccessGate {
    #[must_use]
    pub fn new(
        store: Arc<dyn SessionStore>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        policy: Arc<AccessPolicy>,
    ) -> Self {
        Self {
            store,
            audit,
            clock,
            policy,
        }
    }

    #[must_use]
    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// Decides whether the request may proceed.
    ///
    /// # Errors
    ///
    /// Returns the [`Denial`] when any check fails. Denials are final.
    pub async fn authorize(&self, request: &AccessRequest) -> Result<Identity, Denial> {
        let now = self.clock.now();

        let token = match &request.credentials {
            Credentials::Missing => {
                return Err(self
                    .deny(request, None, DenialReason::MissingToken, Stage::Unauthenticated, now)
                    .await);
            }
            Credentials::Malformed => {
                return Err(self
                    .deny(
                        request,
                        None,
                        DenialReason::MalformedCredentials,
                        Stage::Unauthenticated,
                        now,
                    )
                    .await);
            }
            Credentials::Bearer(token) => token,
        };

        let mut session = match self.store.find_by_token(token).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                return Err(self
                    .deny(request, None, DenialReason::InvalidSession, Stage::TokenPresent, now)
                    .await);
            }
            Err(report) => {
                error!(error = %report, "session lookup failed");
                return Err(self
                    .deny(request, None, DenialReason::Internal, Stage::TokenPresent, now)
                    .await);
            }
        };

        let subject = Some((session.subject_id(), session.subject_kind()));

        if session.state() == SessionState::Closed {
            return Err(self
                .deny(request, subject, DenialReason::InvalidSession, Stage::TokenPresent, now)
                .await);
        }

        if session.is_expired(now) {
            if let Err(report) = self.store.close(session.id()).await {
                warn!(session = %session.id(), error = %report, "failed to close expired session");
            } else {
                info!(session = %session.id(), subject = %session.subject_id(), "closed expired session");
            }
            return Err(self
                .deny(request, subject, DenialReason::SessionExpired, Stage::TokenPresent, now)
                .await);
        }

        if let Some(reason) = self.check_requirement(&session, &request.requirement) {
            let stage = match reason {
                DenialReason::InsufficientRole { .. } => Stage::SessionValid,
                _ => Stage::RoleOk,
            };
            return Err(self.deny(request, subject, reason, stage, now).await);
        }

        self.record(AuditEntry::authorized(
            now,
            session.subject_id(),
            session.subject_kind(),
            request.requirement.action(),
            request.metadata.url.clone(),
            request.metadata.clone(),
        ))
        .await;

        session.touch(now, &request.metadata);
        if let Err(report) = self.store.touch(&session).await {
            warn!(session = %session.id(), error = %report, "failed to refresh session activity");
        }

        debug!(
            subject = %session.subject_id(),
            role = %session.role(),
            action = %request.requirement.action(),
            "access granted"
        );

        Ok(Identity::from(&session))
    }

    /// Role, then level, then permission. Returns the first failure.
    fn check_requirement(&self, session: &Session, requirement: &Requirement) -> Option<DenialReason> {
        let hierarchy = self.policy.hierarchy();
        let evaluator = self.policy.evaluator();

        if let Some(required) = &requirement.role {
            if !hierarchy.satisfies(session.role(), required) {
                return Some(DenialReason::InsufficientRole {
                    required: required.clone(),
                    actual: session.role().clone(),
                });
            }
        }

        if let Some(required) = requirement.min_level {
            let rank = hierarchy.rank_of(session.role());
            if session.access_level() != rank {
                return Some(DenialReason::LevelMismatch {
                    stored: session.access_level(),
                    rank,
                });
            }
            if !evaluator.has_minimum_level(session, required) {
                return Some(DenialReason::LevelTooLow {
                    required,
                    actual: session.access_level(),
                });
            }
        }

        if let Some(key) = &requirement.permission {
            match evaluator.check(session, key) {
                PermissionCheck::Granted => {}
                PermissionCheck::Missing => {
                    return Some(DenialReason::InsufficientPermission { key: key.clone() });
                }
                PermissionCheck::Revoked => {
                    return Some(DenialReason::PermissionRevoked { key: key.clone() });
                }
            }
        }

        None
    }

    async fn deny(
        &self,
        request: &AccessRequest,
        subject: Option<(SubjectId, SubjectKind)>,
        reason: DenialReason,
        stage: Stage,
        now: DateTime<Utc>,
    ) -> Denial {
        let denial = Denial::new(reason, stage);

        warn!(
            code = %denial.error_code(),
            stage = ?stage,
            subject = ?subject.map(|(id, _)| id.to_string()),
            method = %request.metadata.method,
            url = %request.metadata.url,
            "access denied"
        );

        self.record(AuditEntry::denied(
            now,
            subject,
            request.requirement.action(),
            request.metadata.url.clone(),
            denial.error_code().as_str(),
            request.metadata.clone(),
        ))
        .await;

        denial
    }

    async fn record(&self, entry: AuditEntry) {
        let entry_id = entry.id;
        if let Err(report) = self.audit.record(entry).await {
            error!(entry = %entry_id, error = %report, "failed to write audit entry");
        }
    }
}
