use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::{Value as JsonValue, json};
use uuid::Uuid;

use dojo_auth::{Role, RoleSet, STUDENT_ROLE};
use dojo_core::AuthId;

use crate::backend::{AuthBackend, AuthSession, AuthUser, BackendError, RowFilter, SignUpRequest};

pub const INVALID_CREDENTIALS: &str = "Invalid login credentials";
pub const NOT_AUTHENTICATED: &str = "JWT expired";

/// Operations whose next invocations can be made to fail.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Fault {
    SignIn,
    SignUp,
    SignOut,
    Session,
    Rpc(String),
    Select(String),
    Update(String),
}

#[derive(Debug, Clone)]
struct Account {
    password: String,
    auth_id: AuthId,
}

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<String, Account>,
    /// `usuarios` rows, keyed by auth id.
    users: HashMap<AuthId, JsonValue>,
    /// Role rows, keyed by auth id.
    roles: HashMap<AuthId, Vec<Role>>,
    /// Other tables (e.g. `alunos`), as plain row lists.
    tables: HashMap<String, Vec<JsonValue>>,
    /// Sign-ups whose user row is not visible yet: remaining `get_my_user` misses.
    pending: HashMap<AuthId, (u32, JsonValue)>,
    session: Option<AuthSession>,
    faults: HashMap<Fault, String>,
    calls: Vec<String>,
    next_row_id: u64,
}

/// In-memory stand-in for the hosted backend.
///
/// Intended for tests/dev. Models password accounts, the privileged RPCs,
/// row access, delayed provisioning of new sign-ups, and fault injection.
#[derive(Debug)]
pub struct InMemoryBackend {
    state: RwLock<State>,
    provisioning_misses: u32,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State {
                next_row_id: 1,
                ..State::default()
            }),
            provisioning_misses: 0,
        }
    }

    /// New sign-ups stay invisible to `get_my_user` for `misses` polls.
    pub fn with_provisioning_delay(mut self, misses: u32) -> Self {
        self.provisioning_misses = misses;
        self
    }

    /// Seeds a password account with its user row and roles.
    ///
    /// The row gets an `id` (if it has none), `email` and `auth_id`. Returns the auth id.
    pub fn add_account(&self, email: &str, password: &str, row: JsonValue, roles: Vec<Role>) -> AuthId {
        let auth_id = AuthId::new(Uuid::now_v7().to_string());
        let mut state = self.write();
        let row = state.complete_row(row, email, &auth_id);
        state.accounts.insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                auth_id: auth_id.clone(),
            },
        );
        state.users.insert(auth_id.clone(), row);
        state.roles.insert(auth_id.clone(), roles);
        auth_id
    }

    /// Inserts a row into a plain table (e.g. `alunos`).
    pub fn insert_row(&self, table: &str, row: JsonValue) {
        self.write().tables.entry(table.to_string()).or_default().push(row);
    }

    /// The current `usuarios` row of an account.
    pub fn user_row(&self, auth_id: &AuthId) -> Option<JsonValue> {
        self.read().users.get(auth_id).cloned()
    }

    /// Makes every call of `fault`'s kind fail with `message` until cleared.
    pub fn fail(&self, fault: Fault, message: impl Into<String>) {
        self.write().faults.insert(fault, message.into());
    }

    pub fn clear_faults(&self) {
        self.write().faults.clear();
    }

    /// Names of the operations invoked so far, in order (`rpc:get_my_user`, `select:alunos`, ...).
    pub fn calls(&self) -> Vec<String> {
        self.read().calls.clone()
    }

    pub fn has_session(&self) -> bool {
        self.read().session.is_some()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Records the call and returns the injected failure, if any.
    fn enter(&self, call: String, fault: Fault) -> Result<(), BackendError> {
        let mut state = self.write();
        state.calls.push(call);
        match state.faults.get(&fault) {
            Some(msg) => Err(BackendError::rejected(msg.clone())),
            None => Ok(()),
        }
    }

    fn session_user(&self) -> Result<AuthId, BackendError> {
        self.read()
            .session
            .as_ref()
            .map(|s| s.user.id.clone())
            .ok_or_else(|| BackendError::rejected(NOT_AUTHENTICATED))
    }
}

impl State {
    fn complete_row(&mut self, row: JsonValue, email: &str, auth_id: &AuthId) -> JsonValue {
        let mut row = match row {
            JsonValue::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        if !row.contains_key("id") {
            row.insert("id".into(), json!(self.next_row_id));
            self.next_row_id += 1;
        }
        row.insert("email".into(), json!(email));
        row.insert("auth_id".into(), auth_id.to_json());
        JsonValue::Object(row)
    }

    /// Promotes a pending sign-up once its remaining misses reach zero.
    fn poll_provisioning(&mut self, auth_id: &AuthId) {
        let Some((misses, _)) = self.pending.get_mut(auth_id) else {
            return;
        };
        if *misses > 0 {
            *misses -= 1;
            return;
        }
        if let Some((_, row)) = self.pending.remove(auth_id) {
            self.users.insert(auth_id.clone(), row);
            self.roles
                .insert(auth_id.clone(), vec![Role::new(STUDENT_ROLE, 1)]);
        }
    }
}

#[async_trait::async_trait]
impl AuthBackend for InMemoryBackend {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, BackendError> {
        self.enter("sign_in".into(), Fault::SignIn)?;

        let mut state = self.write();
        let account = state
            .accounts
            .get(email)
            .filter(|a| a.password == password)
            .cloned()
            .ok_or_else(|| BackendError::rejected(INVALID_CREDENTIALS))?;

        let session = AuthSession {
            access_token: Uuid::now_v7().to_string(),
            refresh_token: Some(Uuid::now_v7().to_string()),
            expires_at: None,
            user: AuthUser {
                id: account.auth_id,
                email: Some(email.to_string()),
            },
        };
        state.session = Some(session.clone());
        Ok(session)
    }

    async fn sign_up(&self, request: &SignUpRequest) -> Result<AuthUser, BackendError> {
        self.enter("sign_up".into(), Fault::SignUp)?;

        let mut state = self.write();
        if state.accounts.contains_key(&request.email) {
            return Err(BackendError::rejected("User already registered"));
        }

        let auth_id = AuthId::new(Uuid::now_v7().to_string());
        let row = state.complete_row(json!({ "nome": request.full_name }), &request.email, &auth_id);
        state.accounts.insert(
            request.email.clone(),
            Account {
                password: request.password.clone(),
                auth_id: auth_id.clone(),
            },
        );
        state
            .pending
            .insert(auth_id.clone(), (self.provisioning_misses, row));

        let user = AuthUser {
            id: auth_id,
            email: Some(request.email.clone()),
        };
        // Sign-up without email confirmation opens a session right away.
        state.session = Some(AuthSession {
            access_token: Uuid::now_v7().to_string(),
            refresh_token: None,
            expires_at: None,
            user: user.clone(),
        });
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let result = self.enter("sign_out".into(), Fault::SignOut);
        self.write().session = None;
        result
    }

    async fn session(&self) -> Result<Option<AuthSession>, BackendError> {
        self.enter("session".into(), Fault::Session)?;
        Ok(self.read().session.clone())
    }

    async fn restore_session(&self, session: Option<AuthSession>) -> Result<(), BackendError> {
        self.write().session = session;
        Ok(())
    }

    async fn rpc(&self, function: &str, args: JsonValue) -> Result<JsonValue, BackendError> {
        self.enter(format!("rpc:{function}"), Fault::Rpc(function.to_string()))?;
        let auth_id = self.session_user()?;

        let mut state = self.write();
        state.poll_provisioning(&auth_id);
        let roles: RoleSet = state.roles.get(&auth_id).cloned().unwrap_or_default().into_iter().collect();

        match function {
            "get_my_user" => Ok(JsonValue::Array(
                state.users.get(&auth_id).cloned().into_iter().collect(),
            )),
            "get_my_roles" => Ok(roles.to_json()),
            "user_has_role" => {
                let name = args.get("role_name").and_then(JsonValue::as_str).unwrap_or_default();
                Ok(json!(roles.has_role(name)))
            }
            "get_user_access_level" => Ok(json!(roles.max_access_level())),
            other => Err(BackendError::rejected(format!(
                "Could not find the function public.{other}"
            ))),
        }
    }

    async fn select_one(
        &self,
        table: &str,
        filter: &RowFilter,
    ) -> Result<Option<JsonValue>, BackendError> {
        self.enter(format!("select:{table}"), Fault::Select(table.to_string()))?;

        let state = self.read();
        let mut matches: Vec<JsonValue> = match table {
            "usuarios" => state.users.values().filter(|r| filter.matches(r)).cloned().collect(),
            _ => state
                .tables
                .get(table)
                .map(|rows| rows.iter().filter(|r| filter.matches(r)).cloned().collect())
                .unwrap_or_default(),
        };
        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            _ => Err(BackendError::MultipleRows(table.to_string())),
        }
    }

    async fn update(
        &self,
        table: &str,
        filter: &RowFilter,
        patch: JsonValue,
    ) -> Result<usize, BackendError> {
        self.enter(format!("update:{table}"), Fault::Update(table.to_string()))?;

        let JsonValue::Object(patch) = patch else {
            return Err(BackendError::Decode("patch must be an object".into()));
        };

        let mut state = self.write();
        let State { users, tables, .. } = &mut *state;
        let rows: Box<dyn Iterator<Item = &mut JsonValue> + '_> = match table {
            "usuarios" => Box::new(users.values_mut()),
            _ => Box::new(tables.entry(table.to_string()).or_default().iter_mut()),
        };
        let mut changed = 0;
        for row in rows.filter(|r| filter.matches(r)) {
            if let JsonValue::Object(fields) = row {
                fields.extend(patch.clone());
                changed += 1;
            }
        }
        Ok(changed)
    }
}
