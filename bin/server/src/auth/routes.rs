//! Session routes: identity, logout, open, and lookup.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use csdt_access::{
    Activity, Clock, Identity, IssueError, OpenSession, PermissionMap, Role, Session,
    SessionState, Subject, SubjectKind,
};
use csdt_core::{SessionId, SubjectId};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

use super::{AppState, Authorized};
use crate::error::ApiError;

/// Successful response envelope.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    success: bool,
    data: T,
}

impl<T> Envelope<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

/// Liveness check.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Returns the caller's resolved identity.
pub async fn me(Authorized(identity): Authorized) -> Json<Envelope<Identity>> {
    Envelope::ok(identity)
}

/// Closes the caller's session.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Authorized(identity): Authorized,
) -> Result<Json<Envelope<LogoutResponse>>, ApiError> {
    state
        .issuer
        .close(identity.session_id)
        .await
        .map_err(|e| ApiError::Internal {
            details: e.to_string(),
        })?;

    tracing::info!(subject = %identity.subject_id, "user logged out");
    Ok(Envelope::ok(LogoutResponse {
        session_id: identity.session_id,
    }))
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    session_id: SessionId,
}

/// Body of `POST /auth/sessions`.
#[derive(Debug, Deserialize)]
pub struct OpenSessionRequest {
    pub subject_id: SubjectId,
    pub subject_kind: SubjectKind,
    pub role: Role,
    /// Per-subject grants (`true`) and revocations (`false`).
    #[serde(default)]
    pub permissions: PermissionMap,
    #[serde(default)]
    pub client_ip: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

/// Token handed back to the login service.
#[derive(Debug, Serialize)]
pub struct OpenedSession {
    token: String,
    session_id: SessionId,
    role: Role,
    access_level: u8,
    permissions: PermissionMap,
    expires_at: DateTime<Utc>,
}

/// Opens a session for an already authenticated subject.
pub async fn open_session(
    State(state): State<Arc<AppState>>,
    Authorized(caller): Authorized,
    Json(body): Json<OpenSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .issuer
        .open(OpenSession {
            subject_id: body.subject_id,
            subject_kind: body.subject_kind,
            role: body.role,
            overrides: body.permissions,
            client_ip: body.client_ip,
            user_agent: body.user_agent,
        })
        .await
        .map_err(|e| match e.current_context() {
            unknown @ IssueError::UnknownRole { .. } => ApiError::BadRequest {
                details: unknown.to_string(),
            },
            _ => ApiError::Internal {
                details: e.to_string(),
            },
        })?;

    tracing::info!(
        issued_by = %caller.subject_id,
        subject = %session.subject_id(),
        "session issued"
    );

    let opened = OpenedSession {
        token: session.token().as_str().to_string(),
        session_id: session.id(),
        role: session.role().clone(),
        access_level: session.access_level(),
        permissions: session.permissions().clone(),
        expires_at: session.expires_at(),
    };
    Ok((StatusCode::CREATED, Envelope::ok(opened)))
}

/// Session details without the token.
#[derive(Debug, Serialize)]
pub struct SessionSummary {
    session_id: SessionId,
    subject_id: SubjectId,
    subject_kind: SubjectKind,
    role: Role,
    access_level: u8,
    state: SessionState,
    started_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    expired: bool,
    activity: Activity,
}

impl SessionSummary {
    fn new(session: &Session, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session.id(),
            subject_id: session.subject_id(),
            subject_kind: session.subject_kind(),
            role: session.role().clone(),
            access_level: session.access_level(),
            state: session.state(),
            started_at: session.started_at(),
            expires_at: session.expires_at(),
            expired: session.is_expired(now),
            activity: session.activity().clone(),
        }
    }
}

/// Returns a subject's most recent active session.
pub async fn find_session(
    State(state): State<Arc<AppState>>,
    Authorized(_caller): Authorized,
    Path(subject_id): Path<String>,
) -> Result<Json<Envelope<SessionSummary>>, ApiError> {
    let subject_id = SubjectId::from_str(&subject_id).map_err(|e| ApiError::BadRequest {
        details: e.to_string(),
    })?;

    let session = state
        .store
        .find_active(subject_id)
        .await
        .map_err(|e| ApiError::Internal {
            details: e.to_string(),
        })?
        .ok_or_else(|| ApiError::NotFound {
            what: "active session".to_string(),
        })?;

    Ok(Envelope::ok(SessionSummary::new(
        &session,
        state.clock.now(),
    )))
}
