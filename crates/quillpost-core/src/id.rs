//! Store-assigned identifiers.
//!
//! Both accounts and posts are keyed by ascending integers assigned by the
//! store. The newtypes keep the two from being mixed up at call sites.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

macro_rules! integer_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw store identifier.
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Returns the raw store identifier.
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim()
                    .parse::<i64>()
                    .map(Self)
                    .map_err(|_| CoreError::invalid_id(s))
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

integer_id!(
    /// Identifier of an [`Account`](crate::Account).
    AccountId
);

integer_id!(
    /// Identifier of a [`Post`](crate::Post).
    PostId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_id() {
        let id: PostId = "42".parse().unwrap();
        assert_eq!(id.get(), 42);
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn test_parse_invalid_id() {
        let err = "abc".parse::<AccountId>().unwrap_err();
        assert!(matches!(err, CoreError::InvalidId(ref s) if s == "abc"));
    }

    #[test]
    fn test_serializes_as_plain_integer() {
        let json = serde_json::to_string(&AccountId::new(7)).unwrap();
        assert_eq!(json, "7");
    }
}
