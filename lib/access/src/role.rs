//! Roles and the rank hierarchy used for role-based checks.
//!
//! Roles form a total order through an explicit rank table handed to
//! [`RoleHierarchy`] at construction. Names that are not in the table rank 0
//! and never satisfy a requirement.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::HierarchyError;

/// A named privilege tier.
///
/// Unrecognized names are preserved in [`Role::Other`] so that stored
/// sessions with stale role names can still be loaded and then denied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    /// Full-bypass role: passes every permission check.
    AdministradorGeneral,
    /// Administrator.
    Administrador,
    /// Operator staff.
    Operador,
    /// Citizen client account.
    Cliente,
    /// Any role name this build does not know about.
    Other(String),
}

impl Role {
    /// Returns the wire name of the role.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::AdministradorGeneral => "administrador_general",
            Self::Administrador => "administrador",
            Self::Operador => "operador",
            Self::Cliente => "cliente",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for Role {
    fn from(name: String) -> Self {
        match name.as_str() {
            "administrador_general" => Self::AdministradorGeneral,
            "administrador" => Self::Administrador,
            "operador" => Self::Operador,
            "cliente" => Self::Cliente,
            _ => Self::Other(name),
        }
    }
}

impl From<&str> for Role {
    fn from(name: &str) -> Self {
        Self::from(name.to_string())
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        match role {
            Role::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rank given to roles missing from the table.
pub const UNKNOWN_RANK: u8 = 0;

/// Resolves role names to ranks and compares them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleHierarchy {
    ranks: BTreeMap<Role, u8>,
}

impl RoleHierarchy {
    /// Builds a hierarchy from an explicit rank table.
    ///
    /// # Errors
    ///
    /// Fails if the table is empty or assigns the reserved rank 0.
    pub fn new<I, R>(ranks: I) -> Result<Self, HierarchyError>
    where
        I: IntoIterator<Item = (R, u8)>,
        R: Into<Role>,
    {
        let mut table = BTreeMap::new();
        for (role, rank) in ranks {
            let role = role.into();
            if rank == UNKNOWN_RANK {
                return Err(HierarchyError::ReservedRank {
                    role: role.to_string(),
                });
            }
            table.insert(role, rank);
        }

        if table.is_empty() {
            return Err(HierarchyError::EmptyTable);
        }

        Ok(Self { ranks: table })
    }

    /// The stock CSDT table: general administrator > administrator >
    /// operator > client.
    #[must_use]
    pub fn standard() -> Self {
        let ranks = [
            (Role::AdministradorGeneral, 4),
            (Role::Administrador, 3),
            (Role::Operador, 2),
            (Role::Cliente, 1),
        ];
        Self {
            ranks: ranks.into_iter().collect(),
        }
    }

    /// Returns the rank of a role, or [`UNKNOWN_RANK`] if it is not configured.
    #[must_use]
    pub fn rank_of(&self, role: &Role) -> u8 {
        self.ranks.get(role).copied().unwrap_or(UNKNOWN_RANK)
    }

    /// Returns true if the role is in the table.
    #[must_use]
    pub fn is_known(&self, role: &Role) -> bool {
        self.ranks.contains_key(role)
    }

    /// Returns true if `subject` ranks at least as high as `required`.
    ///
    /// Unknown roles on either side never satisfy, so two unrecognized names
    /// cannot authorize each other through a shared rank of 0.
    #[must_use]
    pub fn satisfies(&self, subject: &Role, required: &Role) -> bool {
        let subject_rank = self.rank_of(subject);
        let required_rank = self.rank_of(required);
        if subject_rank == UNKNOWN_RANK || required_rank == UNKNOWN_RANK {
            return false;
        }
        subject_rank >= required_rank
    }

    /// Iterates the configured roles with their ranks.
    pub fn iter(&self) -> impl Iterator<Item = (&Role, u8)> {
        self.ranks.iter().map(|(role, rank)| (role, *rank))
    }
}

impl Default for RoleHierarchy {
    fn default() -> Self {
        Self::standard()
    }
}
