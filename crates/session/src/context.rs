//! Identity Context: the single owned cell holding "who is signed in".
//!
//! Every transition (`initialize`, `login`, `register`, `logout`) is a gateway
//! call bracketed by state updates. The cell is a [`watch`] channel so
//! presentation code can subscribe and re-render on change.
//!
//! At most one transition is expected in flight at a time; callers disable
//! their controls while [`IdentitySnapshot::loading`] is true.

use tokio::sync::watch;

use dojo_auth::IdentityRecord;
use dojo_gateway::{AuthBackend, GatewayError, RegistrationProfile, SessionGateway};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentityState {
    /// Restoring a previous session at startup.
    #[default]
    Initializing,
    Anonymous,
    Authenticated,
    /// A login, registration or logout is in flight.
    Transitioning,
}

/// Point-in-time view of the context.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IdentitySnapshot {
    pub state: IdentityState,
    pub identity: Option<IdentityRecord>,
    /// Message of the last failed transition; cleared when the next one starts.
    pub error: Option<String>,
}

impl IdentitySnapshot {
    pub fn loading(&self) -> bool {
        matches!(
            self.state,
            IdentityState::Initializing | IdentityState::Transitioning
        )
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.identity.as_ref().is_some_and(|i| i.has_role(name))
    }

    pub fn access_level(&self) -> u32 {
        self.identity.as_ref().map_or(0, IdentityRecord::max_access_level)
    }
}

pub struct IdentityContext<B> {
    gateway: SessionGateway<B>,
    cell: watch::Sender<IdentitySnapshot>,
}

impl<B: AuthBackend> IdentityContext<B> {
    /// A context in the `Initializing` state; call [`initialize`](Self::initialize) next.
    pub fn new(gateway: SessionGateway<B>) -> Self {
        let (cell, _) = watch::channel(IdentitySnapshot::default());
        Self { gateway, cell }
    }

    pub fn gateway(&self) -> &SessionGateway<B> {
        &self.gateway
    }

    /// Restores the identity of an existing session, if any.
    pub async fn initialize(&self) {
        self.cell.send_modify(|s| {
            s.state = IdentityState::Initializing;
            s.error = None;
        });
        let identity = self
            .gateway
            .current_user()
            .await
            .map(|source| source.to_record());
        tracing::info!(authenticated = identity.is_some(), "identity context ready");
        self.settle(identity, None);
    }

    /// Signs in and makes the fetched identity current.
    pub async fn login(&self, email: &str, password: &str) -> Result<IdentityRecord, GatewayError> {
        let prior = self.begin();
        match self.gateway.authenticate(email, password).await {
            Ok(source) => {
                let record = source.to_record();
                self.settle(Some(record.clone()), None);
                Ok(record)
            }
            Err(e) => {
                self.settle(prior, Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// Creates a new account. The current identity is left as it was; the
    /// new member signs in separately.
    pub async fn register(
        &self,
        profile: &RegistrationProfile,
    ) -> Result<IdentityRecord, GatewayError> {
        let prior = self.begin();
        let result = self.gateway.register_user(profile).await;
        let error = result.as_ref().err().map(ToString::to_string);
        self.settle(prior, error);
        result.map(|r| r.to_record())
    }

    /// Signs out. Local identity is cleared even when the backend call fails;
    /// that failure is still returned.
    pub async fn logout(&self) -> Result<(), GatewayError> {
        self.begin();
        let result = self.gateway.logout().await;
        let error = result.as_ref().err().map(ToString::to_string);
        self.settle(None, error);
        result
    }

    /// Swaps in a refreshed record (e.g. after a profile edit). Ignored unless
    /// someone is signed in.
    pub fn replace_identity(&self, record: IdentityRecord) -> bool {
        self.cell.send_if_modified(|s| {
            if s.state != IdentityState::Authenticated {
                return false;
            }
            s.identity = Some(record);
            true
        })
    }

    pub fn snapshot(&self) -> IdentitySnapshot {
        self.cell.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<IdentitySnapshot> {
        self.cell.subscribe()
    }

    pub fn state(&self) -> IdentityState {
        self.cell.borrow().state
    }

    pub fn identity(&self) -> Option<IdentityRecord> {
        self.cell.borrow().identity.clone()
    }

    pub fn error(&self) -> Option<String> {
        self.cell.borrow().error.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.cell.borrow().loading()
    }

    pub fn is_authenticated(&self) -> bool {
        self.cell.borrow().is_authenticated()
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.cell.borrow().has_role(name)
    }

    pub fn access_level(&self) -> u32 {
        self.cell.borrow().access_level()
    }

    /// Enters `Transitioning`, returning the identity to restore on failure.
    fn begin(&self) -> Option<IdentityRecord> {
        let mut prior = None;
        self.cell.send_modify(|s| {
            prior = s.identity.clone();
            s.state = IdentityState::Transitioning;
            s.error = None;
        });
        prior
    }

    fn settle(&self, identity: Option<IdentityRecord>, error: Option<String>) {
        self.cell.send_modify(|s| {
            s.state = if identity.is_some() {
                IdentityState::Authenticated
            } else {
                IdentityState::Anonymous
            };
            s.identity = identity;
            s.error = error;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dojo_auth::Role;
    use dojo_gateway::{AuthBackend, Fault, InMemoryBackend, ProvisioningPolicy};
    use serde_json::json;

    fn context() -> IdentityContext<InMemoryBackend> {
        let backend = InMemoryBackend::new();
        backend.add_account(
            "mestre@dojo.com",
            "oss123",
            json!({ "id": 1, "nome": "Mestre", "faixa": "Preta", "grau": 4 }),
            vec![Role::new("Professor", 5), Role::new("Admin", 10)],
        );
        IdentityContext::new(SessionGateway::new(backend, ProvisioningPolicy::immediate(3)))
    }

    fn profile() -> RegistrationProfile {
        RegistrationProfile {
            name: "Nova".into(),
            email: "nova@dojo.com".into(),
            password: "oss123".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn starts_initializing_then_anonymous_without_session() {
        let ctx = context();
        assert_eq!(ctx.state(), IdentityState::Initializing);
        assert!(ctx.is_loading());

        ctx.initialize().await;
        assert_eq!(ctx.state(), IdentityState::Anonymous);
        assert!(!ctx.is_loading());
        assert!(!ctx.is_authenticated());
        assert_eq!(ctx.access_level(), 0);
    }

    #[tokio::test]
    async fn initialize_restores_existing_session() {
        let ctx = context();
        ctx.gateway()
            .backend()
            .sign_in_with_password("mestre@dojo.com", "oss123")
            .await
            .unwrap();

        ctx.initialize().await;
        assert_eq!(ctx.state(), IdentityState::Authenticated);
        assert_eq!(ctx.identity().unwrap().name, "Mestre");
    }

    #[tokio::test]
    async fn login_sets_identity_and_queries() {
        let ctx = context();
        ctx.initialize().await;

        let record = ctx.login("mestre@dojo.com", "oss123").await.unwrap();
        assert_eq!(record.degree, 4);
        assert_eq!(ctx.state(), IdentityState::Authenticated);
        assert!(ctx.has_role("Admin"));
        assert!(!ctx.has_role("admin"));
        assert_eq!(ctx.access_level(), 10);
        assert_eq!(ctx.error(), None);
    }

    #[tokio::test]
    async fn bad_login_stays_anonymous_with_backend_message() {
        let ctx = context();
        ctx.initialize().await;

        let err = ctx.login("bad@x.com", "wrong").await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid login credentials");

        let snapshot = ctx.snapshot();
        assert_eq!(snapshot.state, IdentityState::Anonymous);
        assert_eq!(snapshot.identity, None);
        assert_eq!(snapshot.error.as_deref(), Some("Invalid login credentials"));
    }

    #[tokio::test]
    async fn failed_login_keeps_prior_identity() {
        let ctx = context();
        ctx.login("mestre@dojo.com", "oss123").await.unwrap();
        let before = ctx.identity();

        assert!(ctx.login("mestre@dojo.com", "wrong").await.is_err());
        assert_eq!(ctx.state(), IdentityState::Authenticated);
        assert_eq!(ctx.identity(), before);
    }

    #[tokio::test]
    async fn local_validation_failure_surfaces_as_error() {
        let ctx = context();
        ctx.initialize().await;

        assert!(ctx.login("", "oss123").await.is_err());
        assert_eq!(ctx.error().as_deref(), Some("Por favor, informe seu e-mail"));
        assert!(ctx.gateway().backend().calls().iter().all(|c| c == "session"));
    }

    #[tokio::test]
    async fn register_does_not_change_identity() {
        let ctx = context();
        ctx.initialize().await;

        let record = ctx.register(&profile()).await.unwrap();
        assert_eq!(record.name, "Nova");
        assert_eq!(ctx.state(), IdentityState::Anonymous);
        assert_eq!(ctx.identity(), None);

        ctx.initialize().await;
        assert_eq!(ctx.identity(), None);
    }

    #[tokio::test]
    async fn registering_someone_else_keeps_the_signed_in_session() {
        let ctx = context();
        ctx.login("mestre@dojo.com", "oss123").await.unwrap();

        let record = ctx.register(&profile()).await.unwrap();
        assert_eq!(record.name, "Nova");
        assert_eq!(ctx.identity().unwrap().name, "Mestre");

        assert!(ctx.gateway().has_role("Admin").await);
        assert_eq!(ctx.gateway().access_level().await, 10);

        ctx.initialize().await;
        assert_eq!(ctx.identity().unwrap().name, "Mestre");
    }

    #[tokio::test]
    async fn register_failure_is_reported() {
        let ctx = context();
        ctx.initialize().await;
        let mut taken = profile();
        taken.email = "mestre@dojo.com".into();

        let err = ctx.register(&taken).await.unwrap_err();
        assert_eq!(err.to_string(), "User already registered");
        assert_eq!(ctx.error().as_deref(), Some("User already registered"));
        assert_eq!(ctx.state(), IdentityState::Anonymous);
    }

    #[tokio::test]
    async fn logout_always_clears_identity() {
        let ctx = context();
        ctx.login("mestre@dojo.com", "oss123").await.unwrap();
        ctx.gateway().backend().fail(Fault::SignOut, "network down");

        let err = ctx.logout().await.unwrap_err();
        assert_eq!(err.to_string(), "network down");
        assert!(!ctx.is_authenticated());
        assert_eq!(ctx.state(), IdentityState::Anonymous);
        assert_eq!(ctx.error().as_deref(), Some("network down"));

        ctx.gateway().backend().clear_faults();
        ctx.login("mestre@dojo.com", "oss123").await.unwrap();
        ctx.logout().await.unwrap();
        assert!(!ctx.is_authenticated());
        assert_eq!(ctx.error(), None);
    }

    #[tokio::test]
    async fn subscribers_see_transitions() {
        let ctx = context();
        let mut rx = ctx.subscribe();

        ctx.login("mestre@dojo.com", "oss123").await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_authenticated());
    }

    #[tokio::test]
    async fn replace_identity_requires_authentication() {
        let ctx = context();
        ctx.initialize().await;
        assert!(!ctx.replace_identity(IdentityRecord::default()));

        let mut record = ctx.login("mestre@dojo.com", "oss123").await.unwrap();
        record.phone = "(11) 91234-5678".into();
        assert!(ctx.replace_identity(record));
        assert_eq!(ctx.identity().unwrap().phone, "(11) 91234-5678");
    }
}
