use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Name of the role assigned to enrolled students.
pub const STUDENT_ROLE: &str = "Aluno";

/// A named permission grouping with its numeric access level.
///
/// Wire shape is the backend's role row: `{ "nome": ..., "nivel_acesso": ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Role {
    #[serde(rename = "nome")]
    name: Cow<'static, str>,
    #[serde(rename = "nivel_acesso", default)]
    access_level: u32,
}

impl Role {
    pub fn new(name: impl Into<Cow<'static, str>>, access_level: u32) -> Self {
        Self {
            name: name.into(),
            access_level,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn access_level(&self) -> u32 {
        self.access_level
    }

    /// Lenient extraction from a raw role row.
    ///
    /// Rows without a string `nome` are dropped. A missing, negative or
    /// non-numeric `nivel_acesso` counts as level 0.
    pub fn from_json(value: &JsonValue) -> Option<Self> {
        let name = value.get("nome")?.as_str()?.to_string();
        let access_level = value.get("nivel_acesso").map_or(0, lenient_u32);
        Some(Self::new(name, access_level))
    }
}

/// Non-negative whole number from a number or numeric string (`2`, `2.0`,
/// `"2"`); anything else is 0. Values above `u32::MAX` saturate.
pub(crate) fn lenient_u32(value: &JsonValue) -> u32 {
    let whole = |f: f64| (f.is_finite() && f >= 0.0 && f.fract() == 0.0).then_some(f);
    let parsed = match value {
        JsonValue::Number(n) => n.as_u64().map(|n| n as f64).or_else(|| n.as_f64().and_then(whole)),
        JsonValue::String(s) => s.trim().parse::<f64>().ok().and_then(whole),
        _ => None,
    };
    parsed.map_or(0, |f| if f >= u32::MAX as f64 { u32::MAX } else { f as u32 })
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} ({})", self.name, self.access_level)
    }
}

/// The roles assigned to one principal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleSet(Vec<Role>);

impl RoleSet {
    pub fn new(roles: Vec<Role>) -> Self {
        Self(roles)
    }

    /// Builds a set from a raw `papeis` array; anything that is not an array is empty.
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Array(rows) => Self(rows.iter().filter_map(Role::from_json).collect()),
            _ => Self::default(),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        JsonValue::Array(
            self.0
                .iter()
                .map(|r| serde_json::json!({ "nome": r.name(), "nivel_acesso": r.access_level() }))
                .collect(),
        )
    }

    /// Exact, case-sensitive name match.
    pub fn has_role(&self, name: &str) -> bool {
        self.0.iter().any(|r| r.name() == name)
    }

    /// Highest access level across all roles; 0 when there are none.
    pub fn max_access_level(&self) -> u32 {
        self.0.iter().map(Role::access_level).max().unwrap_or(0)
    }

    pub fn is_student(&self) -> bool {
        self.has_role(STUDENT_ROLE)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Role> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
