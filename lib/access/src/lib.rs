//! Sessions, role hierarchy, permissions and audited access decisions for CSDT.
//!
//! This crate provides:
//! - Session management (`Session`, `SessionStore`, `SessionIssuer`)
//! - The role hierarchy (`Role`, `RoleHierarchy`)
//! - Permission evaluation (`PermissionKey`, `PermissionMap`, `PermissionEvaluator`)
//! - The per-request decision chain (`AccessGate`) and its audit trail
//!
//! # Access Model
//!
//! Roles are ranked. A role satisfies a requirement when its rank is at
//! least the required role's rank; unranked roles satisfy nothing. The
//! `administrador_general` role bypasses permission checks. Everyone else
//! needs an explicit `resource.function` grant in their session.
//!
//! # Example
//!
//! ```
//! use csdt_access::{PermissionEvaluator, PermissionKey, Role, RoleHierarchy};
//! use std::collections::HashMap;
//!
//! let hierarchy = RoleHierarchy::standard();
//! assert!(hierarchy.satisfies(&Role::Administrador, &Role::Operador));
//! assert!(!hierarchy.satisfies(&Role::Cliente, &Role::Operador));
//!
//! let mut grants = HashMap::new();
//! grants.insert("operador".to_string(), vec!["veedurias.ver".to_string()]);
//! let evaluator = PermissionEvaluator::from_grants(&grants, Role::AdministradorGeneral)
//!     .expect("valid grants");
//!
//! let permissions = evaluator.resolve(&Role::Operador, &Default::default());
//! assert_eq!(
//!     permissions.lookup(&PermissionKey::new("veedurias", "ver")),
//!     Some(true)
//! );
//! ```

pub mod audit;
pub mod clock;
pub mod error;
pub mod gate;
pub mod issuer;
pub mod permission;
pub mod policy;
pub mod role;
pub mod session;
pub mod store;

// Re-export main types at crate root
pub use audit::{AuditEntry, AuditSink, MemoryAuditLog, Outcome, RequestMetadata, Severity};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{AuditError, HierarchyError, IssueError, StoreError};
pub use gate::{
    AccessGate, AccessRequest, Credentials, Denial, DenialBody, DenialReason, ErrorCode, Identity,
    Requirement, Stage,
};
pub use issuer::{OpenSession, SessionIssuer};
pub use permission::{PermissionCheck, PermissionEvaluator, PermissionKey, PermissionMap, Subject};
pub use policy::{AccessPolicy, ResolvedPrivileges};
pub use role::{Role, RoleHierarchy, UNKNOWN_RANK};
pub use session::{Activity, Session, SessionParts, SessionState, SessionToken, SubjectKind};
pub use store::{MemorySessionStore, SessionStore};
