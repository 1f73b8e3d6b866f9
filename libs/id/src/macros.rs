//! Macros for defining typed IDs and names.

/// Macro to define a generated, prefixed ID.
///
/// Generates a ULID newtype with `new()`, `Default`, and a `Display` of the
/// form `{prefix}_{ulid}`. IDs sort by creation time.
///
/// # Example
///
/// ```ignore
/// define_id!(OperationId, "op");
///
/// let op_id = OperationId::new();
/// tracing::info!(op_id = %op_id, "Starting");
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name($crate::Ulid);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            #[must_use]
            pub fn new() -> Self {
                Self($crate::Ulid::new())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}_{}", Self::PREFIX, self.0)
            }
        }
    };
}

/// Macro to define an opaque, caller-supplied name.
///
/// Names carry no internal structure. Parsing only rejects the empty string
/// and control characters, so any registry reference or node URI is accepted
/// verbatim.
///
/// Generates `parse()`, `as_str()`, `Display`, `FromStr`, `AsRef<str>`,
/// `Borrow<str>`, and string-transparent serde impls.
#[macro_export]
macro_rules! define_name {
    ($name:ident, $kind:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(String);

        impl $name {
            /// Human-readable kind, used in error messages.
            pub const KIND: &'static str = $kind;

            /// Parses a name, rejecting empty input and control characters.
            pub fn parse(s: impl Into<String>) -> Result<Self, $crate::IdError> {
                let s = s.into();
                if s.is_empty() {
                    return Err($crate::IdError::Empty { kind: Self::KIND });
                }
                if let Some(c) = s.chars().find(|c| c.is_control()) {
                    return Err($crate::IdError::InvalidName {
                        kind: Self::KIND,
                        message: format!("contains control character {:?}", c),
                    });
                }
                Ok(Self(s))
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = $crate::IdError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::parse(s)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = $crate::IdError;

            fn try_from(s: &str) -> Result<Self, Self::Error> {
                Self::parse(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::parse(s).map_err(serde::de::Error::custom)
            }
        }
    };
}
