//! The normalized identity of an authenticated (or profile-fetched) principal.
//!
//! Construction from raw backend data is total: every field has a safe
//! default, so a partial, malformed or empty row still yields a record.

use chrono::{Local, NaiveDate};
use serde_json::{Map, Value as JsonValue, json};

use dojo_core::{AcademyId, AuthId, UserId};

use crate::belt::BeltRank;
use crate::membership::{JoinDate, NOT_AVAILABLE, format_membership};
use crate::roles::{RoleSet, lenient_u32};

static NULL: JsonValue = JsonValue::Null;

/// Local representation of a principal.
///
/// # Invariants
/// - `belt` is always one of the five ranks (unknown input is White).
/// - `degree` is non-negative.
/// - Access level is derived from `roles` only (see [`RoleSet::max_access_level`]).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityRecord {
    pub id: Option<UserId>,
    pub name: String,
    pub email: String,
    pub auth_id: Option<AuthId>,
    pub academy_id: Option<AcademyId>,
    pub belt: BeltRank,
    pub degree: u32,
    pub join_date: Option<JoinDate>,
    pub next_session: String,
    pub phone: String,
    /// From the nested student profile, when one was fetched.
    pub weight: String,
    /// From the nested student profile, when one was fetched.
    pub height: String,
    pub roles: RoleSet,
}

impl IdentityRecord {
    /// Builds a record from a raw merged backend row. Never fails.
    ///
    /// Recognized keys: `id`, `nome`, `email`, `auth_id`, `academia_id`,
    /// `faixa`, `grau`, `dataIngresso` (or `data_inicio`), `proximaAula`,
    /// `telefone`, `aluno.peso`, `aluno.altura`, `papeis`.
    pub fn from_raw(raw: &JsonValue) -> Self {
        let field = |key: &str| raw.get(key).unwrap_or(&NULL);
        let student = field("aluno");
        let student_field = |key: &str| student.get(key).unwrap_or(&NULL);

        let join_text = {
            let primary = text(field("dataIngresso"));
            if primary.is_empty() {
                text(field("data_inicio"))
            } else {
                primary
            }
        };

        Self {
            id: UserId::from_json(field("id")),
            name: text(field("nome")),
            email: text(field("email")),
            auth_id: AuthId::from_json(field("auth_id")),
            academy_id: AcademyId::from_json(field("academia_id")),
            belt: field("faixa")
                .as_str()
                .map(BeltRank::from_wire)
                .unwrap_or_default(),
            degree: lenient_u32(field("grau")),
            join_date: JoinDate::parse(&join_text),
            next_session: text(field("proximaAula")),
            phone: text(field("telefone")),
            weight: text(student_field("peso")),
            height: text(student_field("altura")),
            roles: RoleSet::from_json(field("papeis")),
        }
    }

    /// Serializes back into the raw wire shape accepted by [`from_raw`](Self::from_raw).
    pub fn to_raw(&self) -> JsonValue {
        let mut row = Map::new();
        row.insert(
            "id".into(),
            self.id.as_ref().map(UserId::to_json).unwrap_or(JsonValue::Null),
        );
        row.insert("nome".into(), json!(self.name));
        row.insert("email".into(), json!(self.email));
        row.insert(
            "auth_id".into(),
            self.auth_id.as_ref().map(AuthId::to_json).unwrap_or(JsonValue::Null),
        );
        row.insert(
            "academia_id".into(),
            self.academy_id
                .as_ref()
                .map(AcademyId::to_json)
                .unwrap_or(JsonValue::Null),
        );
        row.insert("faixa".into(), json!(self.belt.label()));
        row.insert("grau".into(), json!(self.degree));
        row.insert(
            "dataIngresso".into(),
            json!(self.join_date.map(|d| d.to_iso()).unwrap_or_default()),
        );
        row.insert("proximaAula".into(), json!(self.next_session));
        row.insert("telefone".into(), json!(self.phone));
        if !self.weight.is_empty() || !self.height.is_empty() {
            row.insert(
                "aluno".into(),
                json!({ "peso": self.weight, "altura": self.height }),
            );
        }
        row.insert("papeis".into(), self.roles.to_json());
        JsonValue::Object(row)
    }

    /// Elapsed membership time until today, e.g. "2 anos e 2 meses".
    pub fn elapsed_membership_duration(&self) -> String {
        self.elapsed_membership_duration_at(Local::now().date_naive())
    }

    /// Elapsed membership time until `today`.
    pub fn elapsed_membership_duration_at(&self, today: NaiveDate) -> String {
        match self.join_date {
            Some(join) => format_membership(join.months_until(today)),
            None => NOT_AVAILABLE.to_string(),
        }
    }

    pub fn belt_color(&self) -> &'static str {
        self.belt.color()
    }

    pub fn belt_text_color(&self) -> &'static str {
        self.belt.text_color()
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.roles.has_role(name)
    }

    pub fn max_access_level(&self) -> u32 {
        self.roles.max_access_level()
    }

    /// Avatar letter: first character of the name, `U` when there is none.
    pub fn initial(&self) -> char {
        self.name.trim().chars().next().unwrap_or('U')
    }

    /// The degree the member is working towards.
    pub fn next_degree(&self) -> u32 {
        self.degree.saturating_add(1)
    }
}

impl From<&JsonValue> for IdentityRecord {
    fn from(raw: &JsonValue) -> Self {
        Self::from_raw(raw)
    }
}

/// Free-text field: strings verbatim, numbers and booleans stringified, else empty.
fn text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}
