//! Strongly-typed identifiers used across the domain.
//!
//! Every identifier is a UUIDv7 newtype: globally unique and time-ordered, so
//! records sort by creation without a separate sequence.

/// Declare a UUID-backed identifier newtype.
///
/// The generated type is `Copy`, serializes transparently as the UUID string,
/// parses with `FromStr` (mapping failures to [`DomainError::InvalidId`]) and
/// exposes `new()` (UUIDv7), `from_uuid()` and `as_uuid()`.
///
/// Callers need `serde` in their dependency graph.
///
/// [`DomainError::InvalidId`]: crate::DomainError::InvalidId
#[macro_export]
macro_rules! uuid_newtype {
    ($(#[$meta:meta])* $vis:vis struct $t:ident, $name:literal) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        $vis struct $t($crate::__private::Uuid);

        impl $t {
            /// Create a new identifier.
            ///
            /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in tests
            /// for determinism.
            pub fn new() -> Self {
                Self($crate::__private::Uuid::now_v7())
            }

            pub fn from_uuid(uuid: $crate::__private::Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &$crate::__private::Uuid {
                &self.0
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<$crate::__private::Uuid> for $t {
            fn from(value: $crate::__private::Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$t> for $crate::__private::Uuid {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl core::str::FromStr for $t {
            type Err = $crate::DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = <$crate::__private::Uuid as core::str::FromStr>::from_str(s)
                    .map_err(|e| $crate::DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                Ok(Self(uuid))
            }
        }
    };
}

uuid_newtype!(
    /// Identifier of a user (actor identity, recorded as `createdBy`).
    pub struct UserId,
    "UserId"
);

uuid_newtype!(
    /// Identifier of an aggregate root.
    pub struct AggregateId,
    "AggregateId"
);
