//! Session gateway: identity operations over an [`AuthBackend`].
//!
//! Role and student-profile data are fetched with separate narrow calls
//! (`get_my_user`, `get_my_roles`, then the `alunos` row) because the backend
//! enforces row-level security through those procedures.

use serde_json::{Map, Value as JsonValue, json};

use dojo_auth::{IdentityRecord, RoleSet};
use dojo_core::UserId;

use crate::backend::{AuthBackend, AuthSession, AuthUser, BackendError, RowFilter, SignUpRequest};
use crate::config::ProvisioningPolicy;
use crate::errors::GatewayError;
use crate::profile::{Credentials, RegistrationProfile};

pub const USERS_TABLE: &str = "usuarios";
pub const STUDENTS_TABLE: &str = "alunos";

/// Raw identity data as fetched from the backend, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentitySource {
    /// Canonical user row (`get_my_user`).
    pub user: JsonValue,
    /// Role rows (`get_my_roles`).
    pub roles: JsonValue,
    /// Student profile row, only for students and only when it could be read.
    pub student: Option<JsonValue>,
}

impl IdentitySource {
    /// The merged row: user fields plus `papeis` and, when present, `aluno`.
    pub fn merged(&self) -> JsonValue {
        let mut row = match &self.user {
            JsonValue::Object(map) => map.clone(),
            _ => Map::new(),
        };
        row.insert("papeis".into(), self.roles.clone());
        if let Some(student) = &self.student {
            row.insert("aluno".into(), student.clone());
        }
        JsonValue::Object(row)
    }

    pub fn to_record(&self) -> IdentityRecord {
        IdentityRecord::from_raw(&self.merged())
    }
}

/// Outcome of a registration.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationResult {
    /// The new user row, or a row synthesized from the sign-up response when
    /// provisioning was not observed in time.
    pub user: JsonValue,
    /// Whether the backend-provisioned user row was observed.
    pub provisioned: bool,
    /// Whether the supplementary profile fields were written.
    pub profile_patched: bool,
}

impl RegistrationResult {
    pub fn to_record(&self) -> IdentityRecord {
        IdentityRecord::from_raw(&self.user)
    }
}

/// Sole point of contact with the identity backend.
#[derive(Debug)]
pub struct SessionGateway<B> {
    backend: B,
    provisioning: ProvisioningPolicy,
}

impl<B: AuthBackend> SessionGateway<B> {
    pub fn new(backend: B, provisioning: ProvisioningPolicy) -> Self {
        Self {
            backend,
            provisioning,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Signs in and fetches the full identity.
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> Result<IdentitySource, GatewayError> {
        Credentials::new(email, password).validate()?;

        self.backend
            .sign_in_with_password(email, password)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "sign-in failed");
                GatewayError::authentication(&e)
            })?;

        let source = self.fetch_identity().await.map_err(|e| {
            tracing::warn!(error = %e, "identity fetch after sign-in failed");
            GatewayError::authentication(&e)
        })?;
        tracing::info!(roles = %role_names(&source.roles), "signed in");
        Ok(source)
    }

    /// Creates the auth identity, waits for the user row, then writes the
    /// optional profile fields. Only a failed identity creation is an error.
    ///
    /// The caller's session is left as it was: if sign-up opened a session
    /// for the new account, that session is ended and the previous one (if
    /// any) is put back.
    pub async fn register_user(
        &self,
        profile: &RegistrationProfile,
    ) -> Result<RegistrationResult, GatewayError> {
        profile.validate()?;

        let prior = self.current_session().await;
        let auth_user = self
            .backend
            .sign_up(&SignUpRequest {
                email: profile.email.trim().to_string(),
                password: profile.password.clone(),
                full_name: profile.name.trim().to_string(),
            })
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "sign-up failed");
                GatewayError::registration(&e)
            })?;

        // Without a session for the new account (email confirmation pending)
        // `get_my_user` would answer for someone else.
        let signed_in_as_new = self
            .current_session()
            .await
            .is_some_and(|s| s.user.id == auth_user.id);

        let provisioned_row = if signed_in_as_new {
            self.await_provisioning().await
        } else {
            None
        };
        let provisioned = provisioned_row.is_some();
        if !provisioned {
            tracing::warn!(
                attempts = self.provisioning.max_attempts,
                "user row not visible after sign-up; continuing with sign-up data"
            );
        }

        let mut user = provisioned_row.unwrap_or_else(|| synthesized_row(&auth_user, profile));

        let profile_patched = match profile.supplementary_patch() {
            None => false,
            Some(patch) => {
                let target = match user.get("id").and_then(UserId::from_json) {
                    Some(id) if provisioned => RowFilter::eq("id", id.to_json()),
                    _ => RowFilter::eq("email", profile.email.trim()),
                };
                match self.backend.update(USERS_TABLE, &target, patch.clone()).await {
                    Ok(0) => {
                        tracing::warn!("no user row took the supplementary profile fields");
                        false
                    }
                    Ok(_) => {
                        merge_into(&mut user, patch);
                        true
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "could not save supplementary profile fields");
                        false
                    }
                }
            }
        };

        if signed_in_as_new {
            self.hand_back_session(prior).await;
        }

        tracing::info!(provisioned, profile_patched, "registered");
        Ok(RegistrationResult {
            user,
            provisioned,
            profile_patched,
        })
    }

    pub async fn logout(&self) -> Result<(), GatewayError> {
        self.backend.sign_out().await.map_err(|e| {
            tracing::warn!(error = %e, "sign-out failed");
            GatewayError::logout(&e)
        })?;
        tracing::info!("signed out");
        Ok(())
    }

    /// The locally held session, or `None` on any error.
    pub async fn current_session(&self) -> Option<AuthSession> {
        match self.backend.session().await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(error = %e, "session lookup failed");
                None
            }
        }
    }

    /// The signed-in identity, or `None` when signed out or on any error.
    pub async fn current_user(&self) -> Option<IdentitySource> {
        self.current_session().await?;
        match self.fetch_identity().await {
            Ok(source) => Some(source),
            Err(e) => {
                tracing::warn!(error = %e, "could not restore current user");
                None
            }
        }
    }

    /// Server-side role check; `false` on any error.
    pub async fn has_role(&self, name: &str) -> bool {
        match self.backend.rpc("user_has_role", json!({ "role_name": name })).await {
            Ok(JsonValue::Bool(b)) => b,
            Ok(other) => other.as_i64().is_some_and(|n| n != 0),
            Err(e) => {
                tracing::warn!(error = %e, role = name, "role check failed");
                false
            }
        }
    }

    /// Server-side access level; `0` on any error.
    pub async fn access_level(&self) -> u32 {
        match self.backend.rpc("get_user_access_level", JsonValue::Null).await {
            Ok(value) => value
                .as_u64()
                .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
                .unwrap_or(0),
            Err(e) => {
                tracing::warn!(error = %e, "access level lookup failed");
                0
            }
        }
    }

    /// `get_my_user` + `get_my_roles` (+ the student row for students).
    async fn fetch_identity(&self) -> Result<IdentitySource, BackendError> {
        let user = first_row(self.backend.rpc("get_my_user", JsonValue::Null).await?)
            .ok_or_else(|| BackendError::rejected("Usuário não encontrado"))?;
        let roles = self.backend.rpc("get_my_roles", JsonValue::Null).await?;

        let student = if RoleSet::from_json(&roles).is_student() {
            self.fetch_student_profile(&user).await
        } else {
            None
        };

        Ok(IdentitySource {
            user,
            roles,
            student,
        })
    }

    /// Best effort: a missing or unreadable profile is simply absent.
    async fn fetch_student_profile(&self, user: &JsonValue) -> Option<JsonValue> {
        let id = user.get("id").and_then(UserId::from_json)?;
        match self
            .backend
            .select_one(STUDENTS_TABLE, &RowFilter::eq("id", id.to_json()))
            .await
        {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!(error = %e, user_id = %id, "student profile unavailable");
                None
            }
        }
    }

    /// Ends the new account's session and reinstates `prior`.
    async fn hand_back_session(&self, prior: Option<AuthSession>) {
        if let Err(e) = self.backend.sign_out().await {
            tracing::warn!(error = %e, "could not end the new account's session");
        }
        if let Err(e) = self.backend.restore_session(prior).await {
            tracing::warn!(error = %e, "could not restore the previous session");
        }
    }

    /// Polls `get_my_user` with backoff until the provisioned row shows up.
    async fn await_provisioning(&self) -> Option<JsonValue> {
        for attempt in 0..self.provisioning.max_attempts {
            let delay = self.provisioning.delay_before(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match self.backend.rpc("get_my_user", JsonValue::Null).await {
                Ok(rows) => {
                    if let Some(row) = first_row(rows) {
                        tracing::debug!(attempt, "user row provisioned");
                        return Some(row);
                    }
                }
                Err(e) => tracing::debug!(attempt, error = %e, "provisioning poll failed"),
            }
        }
        None
    }
}

/// `get_my_user` returns a row list; a bare object is accepted too.
fn first_row(value: JsonValue) -> Option<JsonValue> {
    match value {
        JsonValue::Array(rows) => rows.into_iter().find(JsonValue::is_object),
        obj @ JsonValue::Object(_) => Some(obj),
        _ => None,
    }
}

fn synthesized_row(auth_user: &AuthUser, profile: &RegistrationProfile) -> JsonValue {
    json!({
        "auth_id": auth_user.id.to_json(),
        "nome": profile.name.trim(),
        "email": auth_user.email.clone().unwrap_or_else(|| profile.email.trim().to_string()),
    })
}

fn merge_into(row: &mut JsonValue, patch: JsonValue) {
    if let (JsonValue::Object(fields), JsonValue::Object(patch)) = (row, patch) {
        fields.extend(patch);
    }
}

fn role_names(roles: &JsonValue) -> String {
    RoleSet::from_json(roles)
        .iter()
        .map(|r| r.name().to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory::{Fault, INVALID_CREDENTIALS, InMemoryBackend};
    use dojo_auth::{BeltRank, Role};

    fn gateway(backend: InMemoryBackend) -> SessionGateway<InMemoryBackend> {
        SessionGateway::new(backend, ProvisioningPolicy::immediate(5))
    }

    fn student_backend() -> InMemoryBackend {
        let backend = InMemoryBackend::new();
        backend.add_account(
            "aluno@dojo.com",
            "oss123",
            json!({ "id": 11, "nome": "Aluno", "faixa": "Azul", "grau": 1 }),
            vec![Role::new("Aluno", 1)],
        );
        backend.insert_row(STUDENTS_TABLE, json!({ "id": 11, "peso": "70", "altura": "1,75" }));
        backend
    }

    fn registration() -> RegistrationProfile {
        RegistrationProfile {
            name: "Nova Aluna".into(),
            email: "nova@dojo.com".into(),
            password: "oss123".into(),
            phone: Some("(11) 90000-0000".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn authenticate_merges_student_profile() {
        let gw = gateway(student_backend());
        let source = gw.authenticate("aluno@dojo.com", "oss123").await.unwrap();
        let record = source.to_record();

        assert_eq!(record.belt, BeltRank::Blue);
        assert_eq!(record.weight, "70");
        assert_eq!(record.height, "1,75");
        assert!(record.has_role("Aluno"));
        assert_eq!(
            gw.backend().calls(),
            vec!["sign_in", "rpc:get_my_user", "rpc:get_my_roles", "select:alunos"]
        );
    }

    #[tokio::test]
    async fn non_students_skip_the_profile_fetch() {
        let backend = InMemoryBackend::new();
        backend.add_account("prof@dojo.com", "oss123", json!({ "id": 2 }), vec![Role::new("Professor", 5)]);
        let gw = gateway(backend);

        let source = gw.authenticate("prof@dojo.com", "oss123").await.unwrap();
        assert_eq!(source.student, None);
        assert!(!gw.backend().calls().iter().any(|c| c.starts_with("select:")));
    }

    #[tokio::test]
    async fn student_profile_failure_is_swallowed() {
        let backend = student_backend();
        backend.fail(Fault::Select(STUDENTS_TABLE.into()), "permission denied");
        let gw = gateway(backend);

        let source = gw.authenticate("aluno@dojo.com", "oss123").await.unwrap();
        assert_eq!(source.student, None);
        assert_eq!(source.to_record().weight, "");
    }

    #[tokio::test]
    async fn bad_credentials_carry_backend_message() {
        let gw = gateway(student_backend());
        let err = gw.authenticate("bad@x.com", "wrong").await.unwrap_err();
        assert_eq!(err, GatewayError::Authentication(INVALID_CREDENTIALS.into()));
    }

    #[tokio::test]
    async fn role_fetch_failure_is_authentication_error() {
        let backend = student_backend();
        backend.fail(Fault::Rpc("get_my_roles".into()), "permission denied for function");
        let gw = gateway(backend);

        let err = gw.authenticate("aluno@dojo.com", "oss123").await.unwrap_err();
        assert_eq!(err.to_string(), "permission denied for function");
    }

    #[tokio::test]
    async fn blank_credentials_never_reach_backend() {
        let gw = gateway(student_backend());
        let err = gw.authenticate("", "oss123").await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidInput(_)));
        assert!(gw.backend().calls().is_empty());
    }

    #[tokio::test]
    async fn current_user_is_none_without_session() {
        let gw = gateway(student_backend());
        assert_eq!(gw.current_session().await, None);
        assert_eq!(gw.current_user().await, None);
    }

    #[tokio::test]
    async fn current_user_swallows_faults() {
        let gw = gateway(student_backend());
        gw.authenticate("aluno@dojo.com", "oss123").await.unwrap();
        assert!(gw.current_user().await.is_some());

        gw.backend().fail(Fault::Rpc("get_my_user".into()), "boom");
        assert_eq!(gw.current_user().await, None);

        gw.backend().fail(Fault::Session, "storage unavailable");
        assert_eq!(gw.current_session().await, None);
    }

    #[tokio::test]
    async fn remote_predicates_default_on_error() {
        let gw = gateway(student_backend());
        assert!(!gw.has_role("Aluno").await);
        assert_eq!(gw.access_level().await, 0);

        gw.authenticate("aluno@dojo.com", "oss123").await.unwrap();
        assert!(gw.has_role("Aluno").await);
        assert!(!gw.has_role("aluno").await);
        assert_eq!(gw.access_level().await, 1);
    }

    #[tokio::test]
    async fn register_waits_for_provisioning_and_patches_profile() {
        let gw = gateway(InMemoryBackend::new().with_provisioning_delay(2));
        let result = gw.register_user(&registration()).await.unwrap();

        assert!(result.provisioned);
        assert!(result.profile_patched);
        let record = result.to_record();
        assert_eq!(record.name, "Nova Aluna");
        assert_eq!(record.phone, "(11) 90000-0000");
        assert!(record.id.is_some());

        let auth_id = record.auth_id.unwrap();
        let row = gw.backend().user_row(&auth_id).unwrap();
        assert_eq!(row["telefone"], "(11) 90000-0000");
    }

    #[tokio::test]
    async fn register_survives_missing_provisioning() {
        let gw = SessionGateway::new(
            InMemoryBackend::new().with_provisioning_delay(10),
            ProvisioningPolicy::immediate(3),
        );
        let result = gw.register_user(&registration()).await.unwrap();

        assert!(!result.provisioned);
        assert!(!result.profile_patched);
        let record = result.to_record();
        assert_eq!(record.email, "nova@dojo.com");
        assert_eq!(record.phone, "");
        assert!(record.id.is_none());

        let auth_id = record.auth_id.unwrap();
        assert_eq!(gw.backend().user_row(&auth_id), None);
    }

    #[tokio::test]
    async fn register_leaves_anonymous_caller_signed_out() {
        let gw = gateway(InMemoryBackend::new());
        gw.register_user(&registration()).await.unwrap();

        assert_eq!(gw.current_session().await, None);
        assert_eq!(gw.current_user().await, None);
    }

    #[tokio::test]
    async fn register_keeps_the_callers_session() {
        let gw = gateway(student_backend());
        gw.authenticate("aluno@dojo.com", "oss123").await.unwrap();

        let result = gw.register_user(&registration()).await.unwrap();
        assert!(result.provisioned);

        let session = gw.current_session().await.unwrap();
        assert_eq!(session.user.email.as_deref(), Some("aluno@dojo.com"));
        let current = gw.current_user().await.unwrap().to_record();
        assert_eq!(current.email, "aluno@dojo.com");
    }

    #[tokio::test]
    async fn register_tolerates_patch_failure() {
        let backend = InMemoryBackend::new();
        backend.fail(Fault::Update(USERS_TABLE.into()), "column does not exist");
        let gw = gateway(backend);

        let result = gw.register_user(&registration()).await.unwrap();
        assert!(result.provisioned);
        assert!(!result.profile_patched);
        assert_eq!(result.to_record().phone, "");
    }

    #[tokio::test]
    async fn register_without_optional_fields_skips_patch() {
        let gw = gateway(InMemoryBackend::new());
        let profile = RegistrationProfile {
            phone: None,
            ..registration()
        };
        let result = gw.register_user(&profile).await.unwrap();
        assert!(!result.profile_patched);
        assert!(!gw.backend().calls().iter().any(|c| c.starts_with("update:")));
    }

    #[tokio::test]
    async fn sign_up_failure_is_registration_error() {
        let backend = InMemoryBackend::new();
        backend.fail(Fault::SignUp, "Signups not allowed for this instance");
        let gw = gateway(backend);

        let err = gw.register_user(&registration()).await.unwrap_err();
        assert_eq!(err, GatewayError::Registration("Signups not allowed for this instance".into()));
    }

    #[tokio::test]
    async fn logout_rejection_is_logout_error() {
        let gw = gateway(student_backend());
        gw.authenticate("aluno@dojo.com", "oss123").await.unwrap();
        gw.backend().fail(Fault::SignOut, "network down");

        assert_eq!(gw.logout().await.unwrap_err(), GatewayError::Logout("network down".into()));
        gw.backend().clear_faults();
        assert!(gw.logout().await.is_ok());
        assert_eq!(gw.current_session().await, None);
    }

    #[test]
    fn first_row_accepts_lists_and_objects() {
        assert_eq!(first_row(json!([])), None);
        assert_eq!(first_row(json!([{ "id": 1 }])), Some(json!({ "id": 1 })));
        assert_eq!(first_row(json!({ "id": 2 })), Some(json!({ "id": 2 })));
        assert_eq!(first_row(JsonValue::Null), None);
    }
}
