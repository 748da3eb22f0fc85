//! Centralized server configuration.
//!
//! This module provides strongly-typed configuration for the server,
//! loaded via the `config` crate from environment variables. Nested keys use
//! `__`, e.g. `SESSION__DURATION_MINUTES=60` or
//! `ACCESS__BYPASS_ROLE=administrador_general`.

use csdt_access::{AccessPolicy, PermissionEvaluator, Role, RoleHierarchy};
use rootcause::prelude::Report;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

use crate::error::ConfigError;

/// Server configuration.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// PostgreSQL database connection URL.
    pub database_url: String,

    /// Address the HTTP listener binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Session configuration.
    #[serde(default)]
    pub session: SessionConfig,

    /// Role ranks and permission defaults.
    #[serde(default)]
    pub access: AccessConfig,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

/// Session-related configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Session duration in minutes.
    #[serde(default = "default_session_duration_minutes")]
    pub duration_minutes: i64,
}

fn default_session_duration_minutes() -> i64 {
    120
}

/// Longest accepted session: one year.
pub const MAX_SESSION_DURATION_MINUTES: i64 = 60 * 24 * 365;

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration_minutes: default_session_duration_minutes(),
        }
    }
}

impl SessionConfig {
    /// Session lifetime.
    ///
    /// # Errors
    ///
    /// Returns an error unless the duration is between one minute and
    /// [`MAX_SESSION_DURATION_MINUTES`].
    pub fn ttl(&self) -> Result<chrono::Duration, Report<ConfigError>> {
        let invalid = || ConfigError::InvalidSessionDuration {
            minutes: self.duration_minutes,
            max: MAX_SESSION_DURATION_MINUTES,
        };
        if !(1..=MAX_SESSION_DURATION_MINUTES).contains(&self.duration_minutes) {
            return Err(invalid().into());
        }
        Ok(chrono::Duration::try_minutes(self.duration_minutes).ok_or_else(invalid)?)
    }
}

/// Authorization policy configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessConfig {
    /// Rank per role name. Higher ranks satisfy lower requirements.
    #[serde(default = "default_role_ranks")]
    pub role_ranks: BTreeMap<String, u8>,

    /// Default `resource.function` grants per role name.
    #[serde(default)]
    pub role_defaults: HashMap<String, Vec<String>>,

    /// Role that passes every permission check.
    #[serde(default = "default_bypass_role")]
    pub bypass_role: String,
}

fn default_role_ranks() -> BTreeMap<String, u8> {
    RoleHierarchy::standard()
        .iter()
        .map(|(role, rank)| (role.to_string(), rank))
        .collect()
}

fn default_bypass_role() -> String {
    Role::AdministradorGeneral.to_string()
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            role_ranks: default_role_ranks(),
            role_defaults: HashMap::new(),
            bypass_role: default_bypass_role(),
        }
    }
}

impl AccessConfig {
    /// Validates the configuration into an access policy.
    ///
    /// # Errors
    ///
    /// Returns an error for rank 0, an empty table, malformed permission
    /// names, or a bypass role missing from the table.
    pub fn to_policy(&self) -> Result<AccessPolicy, Report<ConfigError>> {
        let invalid = |e: csdt_access::HierarchyError| ConfigError::InvalidAccess {
            details: e.to_string(),
        };

        let hierarchy = RoleHierarchy::new(
            self.role_ranks
                .iter()
                .map(|(role, rank)| (role.as_str(), *rank)),
        )
        .map_err(invalid)?;
        let evaluator =
            PermissionEvaluator::from_grants(&self.role_defaults, Role::from(self.bypass_role.as_str()))
                .map_err(invalid)?;
        let policy = AccessPolicy::new(hierarchy, evaluator).map_err(invalid)?;
        Ok(policy)
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_config_has_correct_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.duration_minutes, 120);
        assert_eq!(config.ttl().expect("ttl"), chrono::Duration::hours(2));
    }

    #[test]
    fn non_positive_duration_is_rejected() {
        let config = SessionConfig {
            duration_minutes: 0,
        };
        let err = config.ttl().unwrap_err();
        assert!(err.to_string().contains("got 0"));
    }

    #[test]
    fn oversized_duration_is_rejected() {
        for minutes in [MAX_SESSION_DURATION_MINUTES + 1, 1_000_000_000_000, i64::MAX] {
            let config = SessionConfig {
                duration_minutes: minutes,
            };
            let err = config.ttl().unwrap_err();
            assert!(err.to_string().contains(&minutes.to_string()));
        }

        let longest = SessionConfig {
            duration_minutes: MAX_SESSION_DURATION_MINUTES,
        };
        assert_eq!(longest.ttl().expect("ttl"), chrono::Duration::days(365));
    }

    #[test]
    fn default_access_config_builds_standard_policy() {
        let policy = AccessConfig::default().to_policy().expect("policy");
        assert_eq!(policy.hierarchy().rank_of(&Role::AdministradorGeneral), 4);
        assert_eq!(policy.hierarchy().rank_of(&Role::Cliente), 1);
        assert_eq!(policy.evaluator().bypass_role(), &Role::AdministradorGeneral);
    }

    #[test]
    fn zero_rank_is_rejected() {
        let mut config = AccessConfig::default();
        config.role_ranks.insert("visitante".to_string(), 0);
        let err = config.to_policy().unwrap_err();
        assert!(err.to_string().contains("visitante"));
    }

    #[test]
    fn malformed_permission_is_rejected() {
        let mut config = AccessConfig::default();
        config
            .role_defaults
            .insert("operador".to_string(), vec!["veedurias".to_string()]);
        assert!(config.to_policy().is_err());
    }

    #[test]
    fn deserializes_nested_access_config() {
        let json = serde_json::json!({
            "database_url": "postgres://localhost/csdt",
            "access": {
                "role_defaults": { "operador": ["veedurias.ver"] }
            }
        });
        let config: ServerConfig = serde_json::from_value(json).expect("deserialize");
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.session.duration_minutes, 120);
        assert_eq!(config.access.bypass_role, "administrador_general");
        assert_eq!(config.access.role_ranks.get("operador"), Some(&2));
        assert!(config.access.to_policy().is_ok());
    }
}
