//! String-backed identifiers handed out by the external account system.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

macro_rules! define_key {
    (
        $(#[$meta:meta])*
        $name:ident, $what:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Parse and validate an identifier.
            pub fn parse(value: impl Into<String>) -> Result<Self, AppError> {
                let value = value.into();
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return Err(AppError::validation(concat!($what, " must not be empty")));
                }
                if trimmed.len() > 64 {
                    return Err(AppError::validation(concat!($what, " is too long")));
                }
                Ok(Self(trimmed.to_string()))
            }

            /// Borrow the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = AppError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

define_key!(
    /// Stable unique identity identifier, distinct from the display alias.
    Uid, "uid"
);

define_key!(
    /// Identifier of a group (syncshell).
    GroupId, "group id"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uid_trims_and_rejects_empty() {
        assert_eq!(Uid::parse("  ABC123 ").expect("valid").as_str(), "ABC123");
        assert!(Uid::parse("   ").is_err());
        assert!(Uid::parse("x".repeat(65)).is_err());
    }

    #[test]
    fn test_uid_deserialize_validates() {
        let ok: Uid = serde_json::from_str("\"U1\"").expect("valid uid");
        assert_eq!(ok.to_string(), "U1");
        assert!(serde_json::from_str::<Uid>("\"\"").is_err());
    }
}
