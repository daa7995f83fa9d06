//! HTTP backend speaking the hosted BaaS REST dialect
//! (`/auth/v1/*` for identities, `/rest/v1/*` for RPCs and rows).

use std::sync::RwLock;

use chrono::{Duration as ChronoDuration, Utc};
use reqwest::{Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};

use crate::backend::{AuthBackend, AuthSession, AuthUser, BackendError, RowFilter, SignUpRequest};
use crate::config::GatewayConfig;

/// Token endpoint response (sign-in, refresh, and sign-up with auto-confirm).
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    user: AuthUser,
}

impl TokenResponse {
    fn into_session(self) -> AuthSession {
        AuthSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: self
                .expires_in
                .map(|secs| Utc::now() + ChronoDuration::seconds(secs)),
            user: self.user,
        }
    }
}

/// Backend reached over HTTP.
///
/// The session is kept in memory for the life of the process; persistence
/// across restarts is the concern of whoever embeds the client.
#[derive(Debug)]
pub struct RestBackend {
    base_url: String,
    anon_key: String,
    client: reqwest::Client,
    session: RwLock<Option<AuthSession>>,
}

impl RestBackend {
    pub fn new(config: &GatewayConfig) -> Self {
        Self::with_client(config, reqwest::Client::new())
    }

    pub fn with_client(config: &GatewayConfig, client: reqwest::Client) -> Self {
        Self {
            base_url: config.backend_url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            client,
            session: RwLock::new(None),
        }
    }

    fn stored_session(&self) -> Option<AuthSession> {
        self.session
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn store_session(&self, session: Option<AuthSession>) {
        *self
            .session
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = session;
    }

    /// Request with the API key and the caller's bearer (the session token,
    /// or the anonymous key when signed out).
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let bearer = self
            .stored_session()
            .map(|s| s.access_token)
            .unwrap_or_else(|| self.anon_key.clone());
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, BackendError> {
        let resp = builder
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body: JsonValue = resp.json().await.unwrap_or(JsonValue::Null);
        Err(BackendError::Rejected(error_message(&body).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        })))
    }

    async fn json(&self, builder: RequestBuilder) -> Result<JsonValue, BackendError> {
        let resp = self.send(builder).await?;
        let text = resp
            .text()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
        if text.trim().is_empty() {
            return Ok(JsonValue::Null);
        }
        serde_json::from_str(&text).map_err(|e| BackendError::Decode(e.to_string()))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthSession, BackendError> {
        let body = self
            .json(
                self.request(Method::POST, "/auth/v1/token")
                    .query(&[("grant_type", "refresh_token")])
                    .json(&json!({ "refresh_token": refresh_token })),
            )
            .await?;
        let token: TokenResponse =
            serde_json::from_value(body).map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(token.into_session())
    }
}

/// Error text from a BaaS error body (auth and REST use different keys).
fn error_message(body: &JsonValue) -> Option<String> {
    ["error_description", "msg", "message", "error"]
        .iter()
        .find_map(|key| body.get(*key).and_then(JsonValue::as_str))
        .map(str::to_string)
}

#[async_trait::async_trait]
impl AuthBackend for RestBackend {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, BackendError> {
        let body = self
            .json(
                self.request(Method::POST, "/auth/v1/token")
                    .query(&[("grant_type", "password")])
                    .json(&json!({ "email": email, "password": password })),
            )
            .await?;
        let token: TokenResponse =
            serde_json::from_value(body).map_err(|e| BackendError::Decode(e.to_string()))?;
        let session = token.into_session();
        self.store_session(Some(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, request: &SignUpRequest) -> Result<AuthUser, BackendError> {
        let body = self
            .json(self.request(Method::POST, "/auth/v1/signup").json(&json!({
                "email": request.email,
                "password": request.password,
                "data": { "full_name": request.full_name },
            })))
            .await?;

        // With auto-confirm the response is a full token grant; otherwise it
        // is the bare user (no session until the email is confirmed).
        if body.get("access_token").is_some() {
            let token: TokenResponse =
                serde_json::from_value(body).map_err(|e| BackendError::Decode(e.to_string()))?;
            let session = token.into_session();
            let user = session.user.clone();
            self.store_session(Some(session));
            return Ok(user);
        }

        let user = body.get("user").cloned().unwrap_or(body);
        serde_json::from_value(user).map_err(|e| BackendError::Decode(e.to_string()))
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        if self.stored_session().is_none() {
            return Ok(());
        }
        let result = self.send(self.request(Method::POST, "/auth/v1/logout")).await;
        self.store_session(None);
        result.map(|_| ())
    }

    async fn session(&self) -> Result<Option<AuthSession>, BackendError> {
        let Some(session) = self.stored_session() else {
            return Ok(None);
        };
        if !session.is_expired(Utc::now()) {
            return Ok(Some(session));
        }

        let Some(refresh_token) = session.refresh_token.as_deref() else {
            self.store_session(None);
            return Ok(None);
        };
        match self.refresh(refresh_token).await {
            Ok(refreshed) => {
                self.store_session(Some(refreshed.clone()));
                Ok(Some(refreshed))
            }
            Err(e) => {
                self.store_session(None);
                Err(e)
            }
        }
    }

    async fn restore_session(&self, session: Option<AuthSession>) -> Result<(), BackendError> {
        self.store_session(session);
        Ok(())
    }

    async fn rpc(&self, function: &str, args: JsonValue) -> Result<JsonValue, BackendError> {
        tracing::debug!(function, "rpc");
        let args = if args.is_null() { json!({}) } else { args };
        self.json(
            self.request(Method::POST, &format!("/rest/v1/rpc/{function}"))
                .json(&args),
        )
        .await
    }

    async fn select_one(
        &self,
        table: &str,
        filter: &RowFilter,
    ) -> Result<Option<JsonValue>, BackendError> {
        let body = self
            .json(
                self.request(Method::GET, &format!("/rest/v1/{table}"))
                    .query(&[
                        ("select", "*".to_string()),
                        (filter.column.as_str(), format!("eq.{}", filter.value_text())),
                    ]),
            )
            .await?;

        match body {
            JsonValue::Array(mut rows) => match rows.len() {
                0 => Ok(None),
                1 => Ok(rows.pop()),
                _ => Err(BackendError::MultipleRows(table.to_string())),
            },
            JsonValue::Null => Ok(None),
            other => Err(BackendError::Decode(format!(
                "expected row list from '{table}', got {other}"
            ))),
        }
    }

    async fn update(
        &self,
        table: &str,
        filter: &RowFilter,
        patch: JsonValue,
    ) -> Result<usize, BackendError> {
        let body = self
            .json(
                self.request(Method::PATCH, &format!("/rest/v1/{table}"))
                    .query(&[(filter.column.as_str(), format!("eq.{}", filter.value_text()))])
                    .header("Prefer", "return=representation")
                    .json(&patch),
            )
            .await?;
        // Row-level security hides rows silently, so the echoed rows are the
        // only evidence of what was written.
        match body {
            JsonValue::Array(rows) => Ok(rows.len()),
            JsonValue::Null => Ok(0),
            other => Err(BackendError::Decode(format!(
                "expected row list from '{table}', got {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_prefers_auth_description() {
        let body = json!({ "error": "invalid_grant", "error_description": "Invalid login credentials" });
        assert_eq!(error_message(&body).as_deref(), Some("Invalid login credentials"));

        let body = json!({ "code": "PGRST202", "message": "Could not find the function" });
        assert_eq!(error_message(&body).as_deref(), Some("Could not find the function"));

        assert_eq!(error_message(&JsonValue::Null), None);
    }

    #[test]
    fn base_url_is_normalized() {
        let backend = RestBackend::new(&GatewayConfig::new("http://localhost:9999/", "k"));
        assert_eq!(backend.base_url, "http://localhost:9999");
    }

    #[tokio::test]
    async fn sign_out_without_session_is_local_noop() {
        let backend = RestBackend::new(&GatewayConfig::new("http://127.0.0.1:9", "k"));
        assert!(backend.sign_out().await.is_ok());
        assert_eq!(backend.session().await.unwrap(), None);
    }

    #[tokio::test]
    async fn failed_sign_out_still_forgets_local_session() {
        let backend = RestBackend::new(&GatewayConfig::new("http://127.0.0.1:9", "k"));
        backend
            .restore_session(Some(AuthSession {
                access_token: "t".into(),
                refresh_token: None,
                expires_at: None,
                user: AuthUser {
                    id: dojo_core::AuthId::new("a-1"),
                    email: None,
                },
            }))
            .await
            .unwrap();
        assert!(backend.session().await.unwrap().is_some());

        assert!(matches!(backend.sign_out().await, Err(BackendError::Network(_))));
        assert_eq!(backend.session().await.unwrap(), None);
    }
}
