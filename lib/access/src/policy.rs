//! The configured authorization policy: rank table plus permission defaults.
//!
//! Role rank is the canonical privilege model. A session's numeric access
//! level is derived from its role's rank when the session is opened, so the
//! two can only disagree for sessions written by something else.

use crate::error::HierarchyError;
use crate::permission::{PermissionEvaluator, PermissionMap};
use crate::role::{Role, RoleHierarchy};

/// Role hierarchy and permission evaluator, validated together.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    hierarchy: RoleHierarchy,
    evaluator: PermissionEvaluator,
}

/// Privileges resolved for a role at session-open time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPrivileges {
    pub access_level: u8,
    pub permissions: PermissionMap,
}

impl AccessPolicy {
    /// Combines a hierarchy and an evaluator.
    ///
    /// # Errors
    ///
    /// Fails if the evaluator's bypass role has no rank.
    pub fn new(
        hierarchy: RoleHierarchy,
        evaluator: PermissionEvaluator,
    ) -> Result<Self, HierarchyError> {
        if !hierarchy.is_known(evaluator.bypass_role()) {
            return Err(HierarchyError::UnknownBypassRole {
                role: evaluator.bypass_role().to_string(),
            });
        }
        Ok(Self {
            hierarchy,
            evaluator,
        })
    }

    /// Standard rank table, no role defaults, `administrador_general` bypass.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            hierarchy: RoleHierarchy::standard(),
            evaluator: PermissionEvaluator::standard(),
        }
    }

    #[must_use]
    pub fn hierarchy(&self) -> &RoleHierarchy {
        &self.hierarchy
    }

    #[must_use]
    pub fn evaluator(&self) -> &PermissionEvaluator {
        &self.evaluator
    }

    /// Derives the access level and effective permissions for a role.
    #[must_use]
    pub fn resolve(&self, role: &Role, overrides: &PermissionMap) -> ResolvedPrivileges {
        ResolvedPrivileges {
            access_level: self.hierarchy.rank_of(role),
            permissions: self.evaluator.resolve(role, overrides),
        }
    }
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::standard()
    }
}
