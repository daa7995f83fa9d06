//! Identifiers of backend rows.
//!
//! The backend hands out ids in whatever shape its tables use (UUID strings
//! for auth identities, integers or UUIDs for application rows), so these
//! newtypes keep the textual form and accept either JSON strings or numbers.

use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use crate::error::DomainError;

/// Identifier of a row in the `usuarios` table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct UserId(String);

/// Identifier issued by the auth provider for a sign-in identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct AuthId(String);

/// Identifier of the academy (organization) a user belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct AcademyId(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum WireId {
    Text(String),
    Signed(i64),
    Unsigned(u64),
}

impl WireId {
    fn into_text(self) -> String {
        match self {
            WireId::Text(s) => s,
            WireId::Signed(n) => n.to_string(),
            WireId::Unsigned(n) => n.to_string(),
        }
    }
}

macro_rules! impl_record_id {
    ($t:ty, $name:literal) => {
        impl $t {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Lenient extraction from a raw JSON value.
            ///
            /// Strings and integers are accepted; null, blanks and anything
            /// else yield `None`.
            pub fn from_json(value: &JsonValue) -> Option<Self> {
                match value {
                    JsonValue::String(s) if !s.trim().is_empty() => Some(Self(s.clone())),
                    JsonValue::Number(n) if n.is_i64() || n.is_u64() => Some(Self(n.to_string())),
                    _ => None,
                }
            }

            /// JSON form used when filtering or patching rows.
            pub fn to_json(&self) -> JsonValue {
                JsonValue::String(self.0.clone())
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Err(DomainError::invalid_id(format!("{}: blank", $name)));
                }
                Ok(Self(trimmed.to_string()))
            }
        }

        impl<'de> Deserialize<'de> for $t {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                Ok(Self(WireId::deserialize(deserializer)?.into_text()))
            }
        }
    };
}

impl_record_id!(UserId, "UserId");
impl_record_id!(AuthId, "AuthId");
impl_record_id!(AcademyId, "AcademyId");
