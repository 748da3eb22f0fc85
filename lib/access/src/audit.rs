//! Audit trail of access decisions.
//!
//! Every decision the gate makes produces exactly one [`AuditEntry`]. Entries
//! are immutable; retention and deletion belong to whoever owns the sink.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use csdt_core::{AuditEntryId, SubjectId};
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use crate::error::AuditError;
use crate::session::SubjectKind;

/// Result of an access decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    #[serde(rename = "autorizado")]
    Authorized,
    #[serde(rename = "denegado")]
    Denied,
}

impl Outcome {
    /// Returns the wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authorized => "autorizado",
            Self::Denied => "denegado",
        }
    }
}

/// How loudly an entry should be surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// Routine authorized access.
    Normal,
    /// Any denial.
    #[serde(rename = "Critico")]
    Critical,
}

impl Severity {
    /// Returns the wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Critical => "Critico",
        }
    }
}

/// Request attributes recorded alongside a decision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMetadata {
    pub url: String,
    pub method: String,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestMetadata {
    /// Creates metadata for a method and URL.
    #[must_use]
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            client_ip: None,
            user_agent: None,
        }
    }

    /// Sets the client address.
    #[must_use]
    pub fn with_client_ip(mut self, client_ip: Option<String>) -> Self {
        self.client_ip = client_ip;
        self
    }

    /// Sets the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent;
        self
    }
}

/// Immutable record of one access decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditEntryId,
    pub occurred_at: DateTime<Utc>,
    pub subject_id: Option<SubjectId>,
    pub subject_kind: Option<SubjectKind>,
    pub action: String,
    pub resource: String,
    pub outcome: Outcome,
    pub severity: Severity,
    /// Error code of the denial, absent when authorized.
    pub reason: Option<String>,
    pub request: RequestMetadata,
}

impl AuditEntry {
    /// Entry for an authorized request.
    #[must_use]
    pub fn authorized(
        occurred_at: DateTime<Utc>,
        subject_id: SubjectId,
        subject_kind: SubjectKind,
        action: impl Into<String>,
        resource: impl Into<String>,
        request: RequestMetadata,
    ) -> Self {
        Self {
            id: AuditEntryId::new(),
            occurred_at,
            subject_id: Some(subject_id),
            subject_kind: Some(subject_kind),
            action: action.into(),
            resource: resource.into(),
            outcome: Outcome::Authorized,
            severity: Severity::Normal,
            reason: None,
            request,
        }
    }

    /// Entry for a denied request. The subject is unknown when the denial
    /// happened before a session was found.
    #[must_use]
    pub fn denied(
        occurred_at: DateTime<Utc>,
        subject: Option<(SubjectId, SubjectKind)>,
        action: impl Into<String>,
        resource: impl Into<String>,
        reason: impl Into<String>,
        request: RequestMetadata,
    ) -> Self {
        Self {
            id: AuditEntryId::new(),
            occurred_at,
            subject_id: subject.map(|(id, _)| id),
            subject_kind: subject.map(|(_, kind)| kind),
            action: action.into(),
            resource: resource.into(),
            outcome: Outcome::Denied,
            severity: Severity::Critical,
            reason: Some(reason.into()),
            request,
        }
    }
}

/// Destination for audit entries.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persists one entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry could not be written. Callers on the
    /// authorization path log and drop these errors.
    async fn record(&self, entry: AuditEntry) -> Result<(), Report<AuditError>>;
}

/// In-memory audit log, for tests and single-process deployments.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditLog {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl MemoryAuditLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every recorded entry, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<AuditEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl AuditSink for MemoryAuditLog {
    async fn record(&self, entry: AuditEntry) -> Result<(), Report<AuditError>> {
        let mut entries = self.entries.lock().map_err(|e| AuditError::WriteFailed {
            details: e.to_string(),
        })?;
        entries.push(entry);
        Ok(())
    }
}
