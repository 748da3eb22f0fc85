//! Strongly-typed identifiers for access-layer records.
//!
//! All identifiers share one representation, [`Id`], tagged with a marker
//! type so a session id can never be passed where a subject id is expected.
//! The payload is a ULID, so ids sort by creation time and audit trails stay
//! ordered without an extra column.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::str::FromStr;
use ulid::Ulid;

/// What an [`Id`] identifies.
pub trait IdKind {
    /// Text prefix, `sub` in `sub_01J...`.
    const PREFIX: &'static str;
    /// Type name used in parse errors.
    const NAME: &'static str;
}

/// Marker types for [`IdKind`].
pub mod kind {
    use super::IdKind;

    /// An operator or client account.
    #[derive(Debug)]
    pub enum Subject {}

    /// One login session.
    #[derive(Debug)]
    pub enum Session {}

    /// One audit log entry.
    #[derive(Debug)]
    pub enum AuditEntry {}

    impl IdKind for Subject {
        const PREFIX: &'static str = "sub";
        const NAME: &'static str = "SubjectId";
    }

    impl IdKind for Session {
        const PREFIX: &'static str = "ses";
        const NAME: &'static str = "SessionId";
    }

    impl IdKind for AuditEntry {
        const PREFIX: &'static str = "aud";
        const NAME: &'static str = "AuditEntryId";
    }
}

/// Identifies an authenticated subject (an operator or a client account).
pub type SubjectId = Id<kind::Subject>;

/// Identifies one login session.
pub type SessionId = Id<kind::Session>;

/// Identifies one audit log entry.
pub type AuditEntryId = Id<kind::AuditEntry>;

/// Error returned when parsing an ID from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The reason for the parse failure.
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

/// A ULID tagged with the kind of record it names.
///
/// Displayed as `<prefix>_<ulid>`; parsing accepts that form or the bare
/// ULID. Serialized as the bare ULID.
pub struct Id<K> {
    ulid: Ulid,
    kind: PhantomData<fn() -> K>,
}

impl<K: IdKind> Id<K> {
    /// A fresh id for a record created now.
    #[must_use]
    pub fn new() -> Self {
        Self::from_ulid(Ulid::new())
    }

    /// Wraps an existing ULID.
    #[must_use]
    pub const fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            kind: PhantomData,
        }
    }

    /// The wrapped ULID.
    #[must_use]
    pub const fn as_ulid(&self) -> Ulid {
        self.ulid
    }

    /// Text prefix for this kind of id.
    #[must_use]
    pub const fn prefix() -> &'static str {
        K::PREFIX
    }
}

impl<K: IdKind> Default for Id<K> {
    fn default() -> Self {
        Self::new()
    }
}

// Manual impls: derives would demand the same traits of the marker type.

impl<K> Clone for Id<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for Id<K> {}

impl<K> PartialEq for Id<K> {
    fn eq(&self, other: &Self) -> bool {
        self.ulid == other.ulid
    }
}

impl<K> Eq for Id<K> {}

impl<K> PartialOrd for Id<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for Id<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ulid.cmp(&other.ulid)
    }
}

impl<K> Hash for Id<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ulid.hash(state);
    }
}

impl<K: IdKind> fmt::Debug for Id<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple(K::NAME).field(&self.ulid).finish()
    }
}

impl<K: IdKind> fmt::Display for Id<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", K::PREFIX, self.ulid)
    }
}

impl<K: IdKind> FromStr for Id<K> {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s
            .strip_prefix(K::PREFIX)
            .and_then(|rest| rest.strip_prefix('_'))
            .unwrap_or(s);

        raw.parse::<Ulid>()
            .map(Self::from_ulid)
            .map_err(|e| ParseIdError {
                id_type: K::NAME,
                reason: e.to_string(),
            })
    }
}

impl<K: IdKind> From<Ulid> for Id<K> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<K> Serialize for Id<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.ulid.serialize(serializer)
    }
}

impl<'de, K: IdKind> Deserialize<'de> for Id<K> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ulid::deserialize(deserializer).map(Self::from_ulid)
    }
}
