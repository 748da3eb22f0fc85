//! Database repositories for the CSDT access layer.
//!
//! This module provides Postgres implementations of:
//! - Session persistence (`sessions` table)
//! - The audit log (`audit_log` table)

pub mod audit;
pub mod session;

pub use audit::PgAuditLog;
pub use session::PgSessionStore;
