//! The backend-as-a-service seam.
//!
//! [`AuthBackend`] is the narrow surface the gateway needs from the hosted
//! backend: password auth, session retrieval, privileged RPCs and
//! single-table row access. Implementations: [`crate::RestBackend`] (HTTP)
//! and [`crate::InMemoryBackend`] (tests/dev).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use dojo_core::AuthId;

/// Identity as known to the auth provider (not the application row).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: AuthId,
    #[serde(default)]
    pub email: Option<String>,
}

/// Token-bearing session handle.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub user: AuthUser,
}

impl AuthSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

// Tokens stay out of logs.
impl core::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AuthSession")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

/// New auth identity request.
#[derive(Clone, PartialEq, Eq)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    /// Stored as `full_name` user metadata; the backend's provisioning
    /// trigger copies it into the user row.
    pub full_name: String,
}

impl core::fmt::Debug for SignUpRequest {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SignUpRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("full_name", &self.full_name)
            .finish()
    }
}

/// Equality filter on a single column (`column = value`).
#[derive(Debug, Clone, PartialEq)]
pub struct RowFilter {
    pub column: String,
    pub value: JsonValue,
}

impl RowFilter {
    pub fn eq(column: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    /// The value as it appears in a query string.
    pub fn value_text(&self) -> String {
        json_text(&self.value)
    }

    /// Compares by text form: ids may come back as numbers while filters carry strings.
    pub fn matches(&self, row: &JsonValue) -> bool {
        row.get(&self.column)
            .is_some_and(|v| json_text(v) == self.value_text())
    }
}

fn json_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Backend-level fault.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend answered with an error payload; carries its message.
    #[error("{0}")]
    Rejected(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("no active session")]
    NoSession,

    #[error("expected at most one row from '{0}'")]
    MultipleRows(String),
}

impl BackendError {
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }
}

#[async_trait::async_trait]
pub trait AuthBackend: Send + Sync {
    /// Credential sign-in. On success the backend keeps the session locally.
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, BackendError>;

    /// Creates a new auth identity.
    ///
    /// Provisioning of the application row happens asynchronously on the
    /// backend side; it may not be visible yet when this returns.
    async fn sign_up(&self, request: &SignUpRequest) -> Result<AuthUser, BackendError>;

    /// Invalidates the remote session and forgets the local one. The local
    /// session is forgotten even when the backend rejects the call.
    async fn sign_out(&self) -> Result<(), BackendError>;

    /// The locally held session, if any.
    async fn session(&self) -> Result<Option<AuthSession>, BackendError>;

    /// Replaces the locally held session without contacting the backend.
    async fn restore_session(&self, session: Option<AuthSession>) -> Result<(), BackendError>;

    /// Calls a privileged stored procedure.
    async fn rpc(&self, function: &str, args: JsonValue) -> Result<JsonValue, BackendError>;

    /// Reads at most one row matching `filter`.
    async fn select_one(
        &self,
        table: &str,
        filter: &RowFilter,
    ) -> Result<Option<JsonValue>, BackendError>;

    /// Patches every row matching `filter`; returns how many rows changed.
    async fn update(
        &self,
        table: &str,
        filter: &RowFilter,
        patch: JsonValue,
    ) -> Result<usize, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn session_debug_redacts_tokens() {
        let session = AuthSession {
            access_token: "secret-access".into(),
            refresh_token: Some("secret-refresh".into()),
            expires_at: None,
            user: AuthUser {
                id: AuthId::new("a-1"),
                email: Some("a@b.com".into()),
            },
        };
        let debug = format!("{session:?}");
        assert!(!debug.contains("secret-access"));
        assert!(!debug.contains("secret-refresh"));
        assert!(debug.contains("a@b.com"));
    }

    #[test]
    fn expiry_is_inclusive() {
        let now = Utc::now();
        let mut session = AuthSession {
            access_token: "t".into(),
            refresh_token: None,
            expires_at: Some(now),
            user: AuthUser {
                id: AuthId::new("a-1"),
                email: None,
            },
        };
        assert!(session.is_expired(now));
        session.expires_at = None;
        assert!(!session.is_expired(now));
    }

    #[test]
    fn filter_matches_numeric_ids_by_text() {
        let filter = RowFilter::eq("id", "17");
        assert!(filter.matches(&json!({ "id": 17 })));
        assert!(filter.matches(&json!({ "id": "17" })));
        assert!(!filter.matches(&json!({ "id": 18 })));
        assert!(!filter.matches(&json!({ "email": "17" })));
        assert_eq!(RowFilter::eq("id", 5).value_text(), "5");
    }
}
