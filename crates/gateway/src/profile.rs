//! Login and registration input, validated before any remote call.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde_json::{Map, Value as JsonValue};

use dojo_core::{DomainError, DomainResult};

pub const MIN_PASSWORD_LEN: usize = 6;

/// Email/password pair for sign-in.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.email.trim().is_empty() {
            return Err(DomainError::validation("Por favor, informe seu e-mail"));
        }
        if self.password.is_empty() {
            return Err(DomainError::validation("Por favor, informe sua senha"));
        }
        Ok(())
    }
}

impl core::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Data for a new membership account.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RegistrationProfile {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub gender: Option<String>,
}

impl RegistrationProfile {
    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("Por favor, informe seu nome completo"));
        }
        if self.email.trim().is_empty() || !looks_like_email(&self.email) {
            return Err(DomainError::validation("Por favor, informe um e-mail válido"));
        }
        if self.password.is_empty() {
            return Err(DomainError::validation("Por favor, informe uma senha"));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(DomainError::validation(format!(
                "A senha deve ter pelo menos {MIN_PASSWORD_LEN} caracteres"
            )));
        }
        Ok(())
    }

    /// Optional fields to write onto the provisioned user row, keyed by
    /// column. `None` when there is nothing to write.
    pub fn supplementary_patch(&self) -> Option<JsonValue> {
        let mut patch = Map::new();
        if let Some(phone) = self.phone.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            patch.insert("telefone".into(), phone.into());
        }
        if let Some(date) = self.birth_date {
            patch.insert("data_nascimento".into(), date.format("%Y-%m-%d").to_string().into());
        }
        if let Some(gender) = self.gender.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            patch.insert("genero".into(), gender.into());
        }
        (!patch.is_empty()).then_some(JsonValue::Object(patch))
    }
}

impl core::fmt::Debug for RegistrationProfile {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RegistrationProfile")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("phone", &self.phone)
            .field("birth_date", &self.birth_date)
            .field("gender", &self.gender)
            .finish()
    }
}

/// Registration form as filled in by the user (with password confirmation).
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RegistrationForm {
    pub profile: RegistrationProfile,
    pub confirm_password: String,
}

impl RegistrationForm {
    /// Validates the form and yields the profile to submit.
    pub fn into_profile(self) -> DomainResult<RegistrationProfile> {
        self.profile.validate()?;
        if self.profile.password != self.confirm_password {
            return Err(DomainError::validation("As senhas não coincidem"));
        }
        Ok(self.profile)
    }
}

impl core::fmt::Debug for RegistrationForm {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RegistrationForm")
            .field("profile", &self.profile)
            .field("confirm_password", &"<redacted>")
            .finish()
    }
}

static EMAIL_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\S+@\S+\.\S+").expect("email pattern is valid"));

/// `\S+@\S+\.\S+` somewhere in the input.
fn looks_like_email(input: &str) -> bool {
    EMAIL_SHAPE.is_match(input)
}
