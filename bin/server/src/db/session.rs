//! Postgres-backed session store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use csdt_access::{
    Activity, PermissionMap, Role, Session, SessionParts, SessionState, SessionStore, SessionToken,
    StoreError, SubjectKind, Subject,
};
use csdt_core::{SessionId, SubjectId};
use rootcause::prelude::Report;
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use tracing::instrument;

const SESSION_COLUMNS: &str = r#"
    id, token, subject_id, subject_kind, role, access_level, permissions, state,
    started_at, expires_at, client_ip, user_agent,
    last_seen_at, last_method, last_url, request_count
"#;

/// Row type for session queries.
#[derive(FromRow)]
struct SessionRow {
    id: String,
    token: String,
    subject_id: String,
    subject_kind: String,
    role: String,
    access_level: i16,
    permissions: serde_json::Value,
    state: String,
    started_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    client_ip: Option<String>,
    user_agent: Option<String>,
    last_seen_at: Option<DateTime<Utc>>,
    last_method: Option<String>,
    last_url: Option<String>,
    request_count: i64,
}

impl SessionRow {
    fn try_into_session(self) -> Result<Session, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            session_id: self.id.clone(),
            reason,
        };

        let id = SessionId::from_str(&self.id).map_err(|e| corrupt(e.to_string()))?;
        let subject_id =
            SubjectId::from_str(&self.subject_id).map_err(|e| corrupt(e.to_string()))?;
        let subject_kind = SubjectKind::parse(&self.subject_kind)
            .ok_or_else(|| corrupt(format!("unknown subject kind '{}'", self.subject_kind)))?;
        let state = SessionState::parse(&self.state)
            .ok_or_else(|| corrupt(format!("unknown state '{}'", self.state)))?;
        let access_level = u8::try_from(self.access_level)
            .map_err(|_| corrupt(format!("access level {} out of range", self.access_level)))?;
        let request_count = u64::try_from(self.request_count)
            .map_err(|_| corrupt(format!("negative request count {}", self.request_count)))?;
        let permissions: PermissionMap = serde_json::from_value(self.permissions.clone())
            .map_err(|e| corrupt(format!("invalid permissions: {e}")))?;

        Ok(Session::from_parts(SessionParts {
            id,
            token: SessionToken::new(self.token),
            subject_id,
            subject_kind,
            role: Role::from(self.role),
            access_level,
            permissions,
            state,
            started_at: self.started_at,
            expires_at: self.expires_at,
            client_ip: self.client_ip,
            user_agent: self.user_agent,
            activity: Activity {
                last_seen_at: self.last_seen_at,
                last_method: self.last_method,
                last_url: self.last_url,
                request_count,
            },
        }))
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return StoreError::DuplicateToken;
        }
    }
    StoreError::Backend {
        details: e.to_string(),
    }
}

/// Session store backed by the `sessions` table.
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    /// Creates a new session store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_where(
        &self,
        clause: &str,
        value: String,
    ) -> Result<Option<Session>, Report<StoreError>> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE {clause}");
        let row: Option<SessionRow> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        match row {
            Some(r) => Ok(Some(r.try_into_session()?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    #[instrument(skip(self), fields(subject = %subject_id))]
    async fn find_active(
        &self,
        subject_id: SubjectId,
    ) -> Result<Option<Session>, Report<StoreError>> {
        self.fetch_one_where(
            "subject_id = $1 AND state = 'activa' ORDER BY started_at DESC LIMIT 1",
            subject_id.to_string(),
        )
        .await
    }

    #[instrument(skip_all)]
    async fn find_by_token(
        &self,
        token: &SessionToken,
    ) -> Result<Option<Session>, Report<StoreError>> {
        self.fetch_one_where("token = $1", token.as_str().to_string())
            .await
    }

    #[instrument(skip_all, fields(session = %session.id()))]
    async fn insert(&self, session: &Session) -> Result<(), Report<StoreError>> {
        let permissions =
            serde_json::to_value(session.permissions()).map_err(|e| StoreError::Backend {
                details: format!("failed to encode permissions: {e}"),
            })?;
        let request_count = i64::try_from(session.activity().request_count).unwrap_or(i64::MAX);

        sqlx::query(
            r#"
            INSERT INTO sessions (
                id, token, subject_id, subject_kind, role, access_level, permissions, state,
                started_at, expires_at, client_ip, user_agent,
                last_seen_at, last_method, last_url, request_count
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(session.id().to_string())
        .bind(session.token().as_str())
        .bind(session.subject_id().to_string())
        .bind(session.subject_kind().as_str())
        .bind(session.role().as_str())
        .bind(i16::from(session.access_level()))
        .bind(permissions)
        .bind(session.state().as_str())
        .bind(session.started_at())
        .bind(session.expires_at())
        .bind(session.client_ip())
        .bind(session.user_agent())
        .bind(session.activity().last_seen_at)
        .bind(session.activity().last_method.as_deref())
        .bind(session.activity().last_url.as_deref())
        .bind(request_count)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    #[instrument(skip_all, fields(session = %session.id()))]
    async fn touch(&self, session: &Session) -> Result<(), Report<StoreError>> {
        let activity = session.activity();
        let request_count = i64::try_from(activity.request_count).unwrap_or(i64::MAX);

        sqlx::query(
            r#"
            UPDATE sessions
            SET last_seen_at = $2, last_method = $3, last_url = $4, request_count = $5
            WHERE id = $1
            "#,
        )
        .bind(session.id().to_string())
        .bind(activity.last_seen_at)
        .bind(activity.last_method.as_deref())
        .bind(activity.last_url.as_deref())
        .bind(request_count)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    #[instrument(skip(self), fields(session = %session_id))]
    async fn close(&self, session_id: SessionId) -> Result<(), Report<StoreError>> {
        sqlx::query(
            r#"
            UPDATE sessions
            SET state = 'cerrada'
            WHERE id = $1
            "#,
        )
        .bind(session_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn row() -> SessionRow {
        let started = Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap();
        SessionRow {
            id: SessionId::new().to_string(),
            token: "tok".to_string(),
            subject_id: SubjectId::new().to_string(),
            subject_kind: "operador".to_string(),
            role: "operador".to_string(),
            access_level: 2,
            permissions: serde_json::json!({ "veedurias.ver": true, "donaciones.eliminar": false }),
            state: "activa".to_string(),
            started_at: started,
            expires_at: started + Duration::hours(2),
            client_ip: Some("10.1.1.1".to_string()),
            user_agent: None,
            last_seen_at: None,
            last_method: None,
            last_url: None,
            request_count: 3,
        }
    }

    #[test]
    fn decodes_a_stored_row() {
        let session = row().try_into_session().expect("decode");
        assert_eq!(session.role(), &Role::Operador);
        assert_eq!(session.access_level(), 2);
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.permissions().len(), 2);
        assert_eq!(session.activity().request_count, 3);
    }

    #[test]
    fn rejects_unknown_state() {
        let mut r = row();
        r.state = "suspendida".to_string();
        let err = r.try_into_session().unwrap_err();
        assert!(err.to_string().contains("suspendida"));
    }

    #[test]
    fn rejects_out_of_range_level() {
        let mut r = row();
        r.access_level = 300;
        assert!(matches!(
            r.try_into_session(),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn rejects_malformed_permission_names() {
        let mut r = row();
        r.permissions = serde_json::json!({ "veedurias": true });
        let err = r.try_into_session().unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
        assert!(err.to_string().contains("invalid permissions"));
    }
}
