//! Login sessions.
//!
//! A session records who logged in, with which role and resolved
//! permissions, and until when. It is usable only while it is active and
//! not yet expired. Expiry is lazy: nothing closes a session in the
//! background, the access gate closes it the first time it is read after
//! `expires_at`.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use csdt_core::{SessionId, SubjectId};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::audit::RequestMetadata;
use crate::error::IssueError;
use crate::permission::{PermissionMap, Subject};
use crate::role::Role;

const TOKEN_BYTES: usize = 32;

/// Kind of account behind a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubjectKind {
    /// Staff account.
    #[serde(rename = "operador")]
    Operator,
    /// Citizen account.
    #[serde(rename = "cliente")]
    Client,
}

impl SubjectKind {
    /// Returns the wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Operator => "operador",
            Self::Client => "cliente",
        }
    }

    /// Parses a wire name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "operador" => Some(Self::Operator),
            "cliente" => Some(Self::Client),
            _ => None,
        }
    }
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// The session can be used.
    #[serde(rename = "activa")]
    Active,
    /// Logged out, or closed after expiring.
    #[serde(rename = "cerrada")]
    Closed,
}

impl SessionState {
    /// Returns the wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "activa",
            Self::Closed => "cerrada",
        }
    }

    /// Parses a wire name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "activa" => Some(Self::Active),
            "cerrada" => Some(Self::Closed),
            _ => None,
        }
    }
}

/// Opaque bearer token identifying a session.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    /// Generates a fresh token from the operating system random source.
    ///
    /// # Errors
    ///
    /// Fails if the random source is unavailable.
    pub fn generate() -> Result<Self, IssueError> {
        let mut bytes = [0u8; TOKEN_BYTES];
        getrandom::fill(&mut bytes).map_err(|e| IssueError::TokenGeneration {
            details: e.to_string(),
        })?;
        Ok(Self(URL_SAFE_NO_PAD.encode(bytes)))
    }

    /// Wraps an existing token value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the token as presented in the `Authorization` header.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(**redacted**)")
    }
}

/// Recent-activity metadata, refreshed on every authorized request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    /// When the session was last used.
    pub last_seen_at: Option<DateTime<Utc>>,
    /// HTTP method of the last authorized request.
    pub last_method: Option<String>,
    /// URL of the last authorized request.
    pub last_url: Option<String>,
    /// Number of authorized requests served by this session.
    pub request_count: u64,
}

/// All stored fields of a session, used by stores to rebuild one.
#[derive(Debug, Clone)]
pub struct SessionParts {
    pub id: SessionId,
    pub token: SessionToken,
    pub subject_id: SubjectId,
    pub subject_kind: SubjectKind,
    pub role: Role,
    pub access_level: u8,
    pub permissions: PermissionMap,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub activity: Activity,
}

/// One authenticated login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: SessionId,
    token: SessionToken,
    subject_id: SubjectId,
    subject_kind: SubjectKind,
    role: Role,
    access_level: u8,
    permissions: PermissionMap,
    state: SessionState,
    started_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    client_ip: Option<String>,
    user_agent: Option<String>,
    activity: Activity,
}

impl Session {
    /// Creates an active session starting at `now` and lasting `ttl`.
    ///
    /// `access_level` and `permissions` must already be resolved. An expiry
    /// past the last representable instant is clamped to it.
    #[must_use]
    #[expect(clippy::too_many_arguments)]
    pub fn new(
        token: SessionToken,
        subject_id: SubjectId,
        subject_kind: SubjectKind,
        role: Role,
        access_level: u8,
        permissions: PermissionMap,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            id: SessionId::new(),
            token,
            subject_id,
            subject_kind,
            role,
            access_level,
            permissions,
            state: SessionState::Active,
            started_at: now,
            expires_at: now
                .checked_add_signed(ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            client_ip: None,
            user_agent: None,
            activity: Activity::default(),
        }
    }

    /// Rebuilds a session from stored fields.
    #[must_use]
    pub fn from_parts(parts: SessionParts) -> Self {
        Self {
            id: parts.id,
            token: parts.token,
            subject_id: parts.subject_id,
            subject_kind: parts.subject_kind,
            role: parts.role,
            access_level: parts.access_level,
            permissions: parts.permissions,
            state: parts.state,
            started_at: parts.started_at,
            expires_at: parts.expires_at,
            client_ip: parts.client_ip,
            user_agent: parts.user_agent,
            activity: parts.activity,
        }
    }

    /// Records the client the session was opened from.
    #[must_use]
    pub fn with_client(mut self, client_ip: Option<String>, user_agent: Option<String>) -> Self {
        self.client_ip = client_ip;
        self.user_agent = user_agent;
        self
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn token(&self) -> &SessionToken {
        &self.token
    }

    #[must_use]
    pub fn subject_id(&self) -> SubjectId {
        self.subject_id
    }

    #[must_use]
    pub fn subject_kind(&self) -> SubjectKind {
        self.subject_kind
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    #[must_use]
    pub fn client_ip(&self) -> Option<&str> {
        self.client_ip.as_deref()
    }

    #[must_use]
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    #[must_use]
    pub fn activity(&self) -> &Activity {
        &self.activity
    }

    /// Returns true once `now` has reached the expiration time.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Returns true if the session is active and not expired.
    #[must_use]
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.state == SessionState::Active && !self.is_expired(now)
    }

    /// Refreshes activity metadata. Role, permissions, level and
    /// expiration are left untouched.
    pub fn touch(&mut self, now: DateTime<Utc>, request: &RequestMetadata) {
        self.activity.last_seen_at = Some(now);
        self.activity.last_method = Some(request.method.clone());
        self.activity.last_url = Some(request.url.clone());
        self.activity.request_count += 1;
    }

    /// Takes over another copy's activity metadata, leaving every other
    /// field as stored.
    pub fn copy_activity_from(&mut self, other: &Session) {
        self.activity = other.activity.clone();
    }

    /// Marks the session closed. Closing twice has no further effect.
    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }
}

impl Subject for Session {
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
