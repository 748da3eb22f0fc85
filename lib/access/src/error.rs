//! Error types for the access crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `StoreError`: session persistence failures
//! - `AuditError`: audit sink failures (logged, never decisive)
//! - `HierarchyError`: invalid role/permission configuration
//! - `IssueError`: failures while opening a session

use std::fmt;

/// Errors from session persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store could not be reached or rejected the query.
    Backend { details: String },
    /// A stored row could not be decoded into a session.
    Corrupt { session_id: String, reason: String },
    /// A session with the same token already exists.
    DuplicateToken,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backend { details } => write!(f, "session store error: {details}"),
            Self::Corrupt { session_id, reason } => {
                write!(f, "stored session {session_id} is corrupt: {reason}")
            }
            Self::DuplicateToken => write!(f, "session token already in use"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors from writing audit entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditError {
    /// The audit sink failed to persist the entry.
    WriteFailed { details: String },
}

impl fmt::Display for AuditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WriteFailed { details } => write!(f, "audit write failed: {details}"),
        }
    }
}

impl std::error::Error for AuditError {}

/// Errors from building the role hierarchy or permission defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HierarchyError {
    /// Rank 0 is reserved for unrecognized roles.
    ReservedRank { role: String },
    /// The rank table has no entries.
    EmptyTable,
    /// A permission name is not of the form `resource.function`.
    InvalidPermission { value: String },
    /// The bypass role is missing from the rank table.
    UnknownBypassRole { role: String },
}

impl fmt::Display for HierarchyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReservedRank { role } => {
                write!(f, "role '{role}' uses rank 0, which is reserved for unknown roles")
            }
            Self::EmptyTable => write!(f, "role rank table is empty"),
            Self::InvalidPermission { value } => {
                write!(f, "invalid permission '{value}', expected resource.function")
            }
            Self::UnknownBypassRole { role } => {
                write!(f, "bypass role '{role}' is not in the rank table")
            }
        }
    }
}

impl std::error::Error for HierarchyError {}

/// Errors from opening a new session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueError {
    /// The operating system random source failed.
    TokenGeneration { details: String },
    /// The role is not in the rank table.
    UnknownRole { role: String },
    /// The session lifetime runs past the last representable instant.
    ExpiryOutOfRange { minutes: i64 },
    /// The new session could not be stored.
    Store { details: String },
}

impl fmt::Display for IssueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TokenGeneration { details } => {
                write!(f, "failed to generate session token: {details}")
            }
            Self::UnknownRole { role } => {
                write!(f, "cannot open a session for unknown role '{role}'")
            }
            Self::ExpiryOutOfRange { minutes } => {
                write!(f, "session lifetime of {minutes} minutes is out of range")
            }
            Self::Store { details } => write!(f, "failed to store session: {details}"),
        }
    }
}

impl std::error::Error for IssueError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_display() {
        let err = StoreError::Corrupt {
            session_id: "ses_1".to_string(),
            reason: "bad role".to_string(),
        };
        assert!(err.to_string().contains("ses_1"));
        assert!(err.to_string().contains("bad role"));
    }

    #[test]
    fn hierarchy_error_display() {
        let err = HierarchyError::ReservedRank {
            role: "visitante".to_string(),
        };
        assert!(err.to_string().contains("visitante"));
        assert!(err.to_string().contains("rank 0"));
    }

    #[test]
    fn issue_error_wraps_store_error() {
        let err = IssueError::Store {
            details: StoreError::DuplicateToken.to_string(),
        };
        assert!(err.to_string().contains("already in use"));
    }
}
