//! Postgres-backed audit log. Entries are insert-only.

use async_trait::async_trait;
use csdt_access::{AuditEntry, AuditError, AuditSink};
use rootcause::prelude::Report;
use sqlx::PgPool;

/// Audit sink writing to the `audit_log` table.
#[derive(Clone)]
pub struct PgAuditLog {
    pool: PgPool,
}

impl PgAuditLog {
    /// Creates a new audit log.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditLog {
    async fn record(&self, entry: AuditEntry) -> Result<(), Report<AuditError>> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (
                id, occurred_at, subject_id, subject_kind, action, resource,
                outcome, severity, reason, method, url, client_ip, user_agent
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.occurred_at)
        .bind(entry.subject_id.map(|id| id.to_string()))
        .bind(entry.subject_kind.map(|kind| kind.as_str()))
        .bind(&entry.action)
        .bind(&entry.resource)
        .bind(entry.outcome.as_str())
        .bind(entry.severity.as_str())
        .bind(entry.reason.as_deref())
        .bind(&entry.request.method)
        .bind(&entry.request.url)
        .bind(entry.request.client_ip.as_deref())
        .bind(entry.request.user_agent.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|e| AuditError::WriteFailed {
            details: e.to_string(),
        })?;

        Ok(())
    }
}
