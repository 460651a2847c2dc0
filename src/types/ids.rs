//! Strongly-typed identifiers.
//!
//! All IDs are validated at construction time and implement common traits.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to define a strongly-typed ID newtype wrapper.
///
/// Generates: struct, `from_string()`, `as_str()`, Display, Serialize, Deserialize.
/// Optionally generates `new()` (UUID v4) and `Default` if `uuid` flag is passed.
macro_rules! define_id {
    ($name:ident, uuid) => {
        define_id!($name);

        impl $name {
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4().simple().to_string())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }
    };
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn from_string(s: impl Into<String>) -> Result<Self, &'static str> {
                let s = s.into();
                if s.is_empty() {
                    return Err(concat!(stringify!($name), " cannot be empty"));
                }
                Ok(Self(s))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(SubscriberId, uuid);
define_id!(CorrelationId);

impl SubscriberId {
    /// Fresh id of the form `<prefix>-<uuid>`.
    pub fn with_prefix(prefix: &str) -> Self {
        Self(format!("{}-{}", prefix, uuid::Uuid::new_v4().simple()))
    }
}

/// Number of random bytes behind a freshly minted correlation id.
pub const CORRELATION_ID_BYTES: usize = 8;

impl CorrelationId {
    /// Mint a random id: 8 bytes from the thread RNG, hex encoded (16 chars).
    pub fn random() -> Self {
        let mut bytes = [0u8; CORRELATION_ID_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn test_random_correlation_id_shape() {
        let id = CorrelationId::random();
        assert_eq!(id.as_str().len(), 2 * CORRELATION_ID_BYTES);
        assert!(id
            .as_str()
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_no_collisions_across_batches() {
        for _ in 0..5 {
            let batch: HashSet<CorrelationId> =
                (0..10_000).map(|_| CorrelationId::random()).collect();
            assert_eq!(batch.len(), 10_000);
        }
    }

    #[test]
    fn test_empty_ids_rejected() {
        assert!(CorrelationId::from_string(String::new()).is_err());
        assert_eq!(
            CorrelationId::from_string("zzzz").unwrap().as_str(),
            "zzzz"
        );
    }

    #[test]
    fn test_subscriber_ids_are_unique() {
        assert_ne!(SubscriberId::new(), SubscriberId::new());
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let id = CorrelationId::from_string("a1b2c3d4e5f6a7b8").unwrap();
        assert_eq!(
            serde_json::to_string(&id).unwrap(),
            "\"a1b2c3d4e5f6a7b8\""
        );
    }

    proptest! {
        #[test]
        fn prop_non_empty_strings_round_trip(s in "[a-z0-9]{1,32}") {
            let id = CorrelationId::from_string(s.clone()).unwrap();
            prop_assert_eq!(id.as_str(), s.as_str());
            prop_assert_eq!(id.to_string(), s);
        }
    }
}
