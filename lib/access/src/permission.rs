//! Capability grants keyed by resource and function.
//!
//! A subject's effective permissions are resolved once, when its session is
//! opened: role defaults first, session overrides on top. Checks afterwards
//! are plain map lookups with deny-by-default.

use serde::de::Error as _;
use serde::ser::{Error as _, SerializeMap};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::error::HierarchyError;
use crate::role::Role;

/// A `(resource, function)` pair such as `veedurias.actualizar`.
///
/// Neither part may be empty or contain a `.`, so the `resource.function`
/// text form names exactly one pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PermissionKey {
    resource: String,
    function: String,
}

impl PermissionKey {
    /// Creates a key from its two parts.
    ///
    /// Intended for literal names. A key built here from parts that are empty
    /// or dotted only ever matches itself and cannot be persisted; use
    /// [`PermissionKey::try_new`] for untrusted input.
    #[must_use]
    pub fn new(resource: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            function: function.into(),
        }
    }

    /// Creates a key, rejecting empty or dotted parts.
    ///
    /// # Errors
    ///
    /// Returns [`HierarchyError::InvalidPermission`] if either part is empty
    /// or contains a `.`.
    pub fn try_new(
        resource: impl Into<String>,
        function: impl Into<String>,
    ) -> Result<Self, HierarchyError> {
        let key = Self::new(resource, function);
        if key.is_well_formed() {
            Ok(key)
        } else {
            Err(HierarchyError::InvalidPermission {
                value: key.to_string(),
            })
        }
    }

    /// The resource part.
    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// The function part.
    #[must_use]
    pub fn function(&self) -> &str {
        &self.function
    }

    /// Returns true if both parts are non-empty and free of dots.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        [&self.resource, &self.function]
            .iter()
            .all(|part| !part.is_empty() && !part.contains('.'))
    }
}

impl fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource, self.function)
    }
}

impl FromStr for PermissionKey {
    type Err = HierarchyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (resource, function) = s
            .split_once('.')
            .ok_or_else(|| HierarchyError::InvalidPermission {
                value: s.to_string(),
            })?;
        Self::try_new(resource, function)
    }
}

/// Capability to grant flag. Missing entries mean "not granted".
///
/// Serialized as a JSON object keyed by `resource.function`; every key is
/// validated on the way in and on the way out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionMap(BTreeMap<PermissionKey, bool>);

impl PermissionMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a map granting every listed key.
    #[must_use]
    pub fn granting<'a>(keys: impl IntoIterator<Item = &'a PermissionKey>) -> Self {
        let mut map = Self::new();
        for key in keys {
            map.grant(key);
        }
        map
    }

    /// Sets the key to granted.
    pub fn grant(&mut self, key: &PermissionKey) {
        self.0.insert(key.clone(), true);
    }

    /// Sets the key to explicitly denied.
    pub fn revoke(&mut self, key: &PermissionKey) {
        self.0.insert(key.clone(), false);
    }

    /// Returns the stored flag, if any.
    #[must_use]
    pub fn lookup(&self, key: &PermissionKey) -> Option<bool> {
        self.0.get(key).copied()
    }

    /// Returns a new map with `overrides` applied on top of `self`.
    #[must_use]
    pub fn merged(&self, overrides: &PermissionMap) -> Self {
        let mut merged = self.0.clone();
        merged.extend(overrides.0.iter().map(|(k, v)| (k.clone(), *v)));
        Self(merged)
    }

    /// Number of stored entries, granted or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates the stored keys and flags.
    pub fn iter(&self) -> impl Iterator<Item = (&PermissionKey, bool)> {
        self.0.iter().map(|(k, v)| (k, *v))
    }
}

impl Serialize for PermissionMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, granted) in &self.0 {
            if !key.is_well_formed() {
                return Err(S::Error::custom(format!("invalid permission name '{key}'")));
            }
            map.serialize_entry(&key.to_string(), granted)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for PermissionMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        BTreeMap::<String, bool>::deserialize(deserializer)?
            .into_iter()
            .map(|(name, granted)| {
                name.parse::<PermissionKey>()
                    .map(|key| (key, granted))
                    .map_err(D::Error::custom)
            })
            .collect::<Result<BTreeMap<_, _>, _>>()
            .map(Self)
    }
}

/// Anything that can be authorized: a stored session or a resolved identity.
pub trait Subject {
    /// The subject's role.
    fn role(&self) -> &Role;
    /// The resolved permission map.
    fn permissions(&self) -> &PermissionMap;
    /// The numeric access level recorded for the subject.
    fn access_level(&self) -> u8;
}

/// Outcome of a single permission lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionCheck {
    /// Granted by the map or by the bypass role.
    Granted,
    /// No entry exists.
    Missing,
    /// The entry exists and is false.
    Revoked,
}

impl PermissionCheck {
    /// Returns true if access is allowed.
    #[must_use]
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }
}

/// Evaluates permission grants against a subject.
#[derive(Debug, Clone)]
pub struct PermissionEvaluator {
    defaults: HashMap<Role, PermissionMap>,
    bypass_role: Role,
}

impl PermissionEvaluator {
    /// Creates an evaluator from per-role defaults and the full-bypass role.
    #[must_use]
    pub fn new(defaults: HashMap<Role, PermissionMap>, bypass_role: Role) -> Self {
        Self {
            defaults,
            bypass_role,
        }
    }

    /// An evaluator with no role defaults and `administrador_general` as bypass.
    #[must_use]
    pub fn standard() -> Self {
        Self::new(HashMap::new(), Role::AdministradorGeneral)
    }

    /// Builds role defaults from `resource.function` strings.
    ///
    /// # Errors
    ///
    /// Fails on any entry that is not a valid permission key.
    pub fn from_grants(
        grants: &HashMap<String, Vec<String>>,
        bypass_role: Role,
    ) -> Result<Self, HierarchyError> {
        let mut defaults = HashMap::new();
        for (role, names) in grants {
            let keys = names
                .iter()
                .map(|name| name.parse::<PermissionKey>())
                .collect::<Result<Vec<_>, _>>()?;
            defaults.insert(Role::from(role.as_str()), PermissionMap::granting(&keys));
        }
        Ok(Self::new(defaults, bypass_role))
    }

    /// The full-bypass role.
    #[must_use]
    pub fn bypass_role(&self) -> &Role {
        &self.bypass_role
    }

    /// Union of the role's defaults and the session overrides; overrides win.
    #[must_use]
    pub fn resolve(&self, role: &Role, overrides: &PermissionMap) -> PermissionMap {
        self.defaults
            .get(role)
            .map(|defaults| defaults.merged(overrides))
            .unwrap_or_else(|| overrides.clone())
    }

    /// Looks up a permission, reporting why it was not granted.
    #[must_use]
    pub fn check<S: Subject + ?Sized>(&self, subject: &S, key: &PermissionKey) -> PermissionCheck {
        if *subject.role() == self.bypass_role {
            return PermissionCheck::Granted;
        }
        match subject.permissions().lookup(key) {
            Some(true) => PermissionCheck::Granted,
            Some(false) => PermissionCheck::Revoked,
            None => PermissionCheck::Missing,
        }
    }

    /// Returns true if the subject may perform `function` on `resource`.
    #[must_use]
    pub fn has_permission<S: Subject + ?Sized>(
        &self,
        subject: &S,
        resource: &str,
        function: &str,
    ) -> bool {
        self.check(subject, &PermissionKey::new(resource, function))
            .is_granted()
    }

    /// Returns true if the subject's numeric level is at least `required`.
    #[must_use]
    pub fn has_minimum_level<S: Subject + ?Sized>(&self, subject: &S, required: u8) -> bool {
        subject.access_level() >= required
    }
}

impl Default for PermissionEvaluator {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Account {
        role: Role,
        permissions: PermissionMap,
        level: u8,
    }

    impl Subject for Account {
        fn role(&self) -> &Role {
            &self.role
        }

        fn permissions(&self) -> &PermissionMap {
            &self.permissions
        }

        fn access_level(&self) -> u8 {
            self.level
        }
    }

    fn key(s: &str) -> PermissionKey {
        s.parse().expect("valid key")
    }

    #[test]
    fn key_parsing() {
        let parsed = key("veedurias.actualizar");
        assert_eq!(parsed.resource(), "veedurias");
        assert_eq!(parsed.function(), "actualizar");
        assert_eq!(parsed.to_string(), "veedurias.actualizar");

        for bad in ["veedurias", ".actualizar", "veedurias.", "a.b.c"] {
            assert!(bad.parse::<PermissionKey>().is_err(), "{bad}");
        }
    }

    #[test]
    fn dotted_parts_are_rejected() {
        assert!(PermissionKey::try_new("veedurias", "ver").is_ok());
        for (resource, function) in [
            ("veedurias.borradores", "ver"),
            ("veedurias", "borradores.ver"),
            ("", "ver"),
            ("veedurias", ""),
        ] {
            let err = PermissionKey::try_new(resource, function).unwrap_err();
            assert!(err.to_string().contains("invalid permission"), "{err}");
        }
    }

    #[test]
    fn dotted_resource_is_not_confused_with_dotted_function() {
        let evaluator = PermissionEvaluator::standard();
        let subject = Account {
            role: Role::Operador,
            permissions: PermissionMap::granting(&[PermissionKey::new(
                "veedurias.borradores",
                "ver",
            )]),
            level: 2,
        };
        assert!(evaluator.has_permission(&subject, "veedurias.borradores", "ver"));
        assert!(!evaluator.has_permission(&subject, "veedurias", "borradores.ver"));
        assert_eq!(
            evaluator.check(&subject, &PermissionKey::new("veedurias", "borradores.ver")),
            PermissionCheck::Missing
        );
    }

    #[test]
    fn map_with_dotted_part_does_not_serialize() {
        let map = PermissionMap::granting(&[PermissionKey::new("veedurias.borradores", "ver")]);
        assert!(serde_json::to_value(&map).is_err());
    }

    #[test]
    fn merged_overrides_win() {
        let base = PermissionMap::granting(&[key("pqrsfd.ver"), key("pqrsfd.crear")]);
        let mut overrides = PermissionMap::new();
        overrides.revoke(&key("pqrsfd.crear"));
        overrides.grant(&key("donaciones.ver"));

        let merged = base.merged(&overrides);
        assert_eq!(merged.lookup(&key("pqrsfd.ver")), Some(true));
        assert_eq!(merged.lookup(&key("pqrsfd.crear")), Some(false));
        assert_eq!(merged.lookup(&key("donaciones.ver")), Some(true));
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn resolve_uses_role_defaults() {
        let mut grants = HashMap::new();
        grants.insert(
            "operador".to_string(),
            vec!["veedurias.ver".to_string(), "veedurias.actualizar".to_string()],
        );
        let evaluator =
            PermissionEvaluator::from_grants(&grants, Role::AdministradorGeneral).expect("grants");

        let mut overrides = PermissionMap::new();
        overrides.revoke(&key("veedurias.actualizar"));

        let resolved = evaluator.resolve(&Role::Operador, &overrides);
        assert_eq!(resolved.lookup(&key("veedurias.ver")), Some(true));
        assert_eq!(resolved.lookup(&key("veedurias.actualizar")), Some(false));

        let client = evaluator.resolve(&Role::Cliente, &PermissionMap::new());
        assert!(client.is_empty());
    }

    #[test]
    fn from_grants_rejects_bad_names() {
        let mut grants = HashMap::new();
        grants.insert("operador".to_string(), vec!["veedurias".to_string()]);
        assert!(PermissionEvaluator::from_grants(&grants, Role::AdministradorGeneral).is_err());
    }

    #[test]
    fn missing_entries_deny() {
        let evaluator = PermissionEvaluator::standard();
        let subject = Account {
            role: Role::Operador,
            permissions: PermissionMap::granting(&[key("veedurias.ver")]),
            level: 2,
        };
        assert!(evaluator.has_permission(&subject, "veedurias", "ver"));
        assert!(!evaluator.has_permission(&subject, "veedurias", "eliminar"));
        assert_eq!(
            evaluator.check(&subject, &key("veedurias.eliminar")),
            PermissionCheck::Missing
        );
    }

    #[test]
    fn explicit_false_reports_revoked() {
        let evaluator = PermissionEvaluator::standard();
        let mut permissions = PermissionMap::new();
        permissions.revoke(&key("donaciones.eliminar"));
        let subject = Account {
            role: Role::Administrador,
            permissions,
            level: 3,
        };
        assert_eq!(
            evaluator.check(&subject, &key("donaciones.eliminar")),
            PermissionCheck::Revoked
        );
    }

    #[test]
    fn bypass_role_ignores_the_map() {
        let evaluator = PermissionEvaluator::standard();
        let mut permissions = PermissionMap::new();
        permissions.revoke(&key("cualquier_recurso.eliminar"));
        let subject = Account {
            role: Role::AdministradorGeneral,
            permissions,
            level: 4,
        };
        assert!(evaluator.has_permission(&subject, "cualquier_recurso", "eliminar"));
        assert!(evaluator.has_permission(&subject, "otro", "crear"));
    }

    #[test]
    fn minimum_level_compares_numbers() {
        let evaluator = PermissionEvaluator::standard();
        let subject = Account {
            role: Role::Operador,
            permissions: PermissionMap::new(),
            level: 2,
        };
        assert!(evaluator.has_minimum_level(&subject, 1));
        assert!(evaluator.has_minimum_level(&subject, 2));
        assert!(!evaluator.has_minimum_level(&subject, 3));
    }

    #[test]
    fn map_serializes_as_object() {
        let map = PermissionMap::granting(&[key("pqrsfd.ver")]);
        let json = serde_json::to_value(&map).expect("serialize");
        assert_eq!(json, serde_json::json!({ "pqrsfd.ver": true }));

        let parsed: PermissionMap = serde_json::from_value(json).expect("deserialize");
        assert_eq!(parsed, map);
    }

    #[test]
    fn map_rejects_malformed_names() {
        for bad in [
            serde_json::json!({ "veedurias": true }),
            serde_json::json!({ "veedurias.borradores.ver": true }),
            serde_json::json!({ ".ver": false }),
        ] {
            let err = serde_json::from_value::<PermissionMap>(bad).unwrap_err();
            assert!(err.to_string().contains("invalid permission"), "{err}");
        }
    }
}
