//! Shared identifiers and error handling for the CSDT access layer.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{AuditEntryId, Id, IdKind, ParseIdError, SessionId, SubjectId};
