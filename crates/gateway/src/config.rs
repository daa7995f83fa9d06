//! Gateway configuration, sourced from the environment.
//!
//! Unset or malformed variables fall back to development defaults with a
//! warning; building a config never fails.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:54321";

/// How long to wait for backend-side provisioning after sign-up.
///
/// Polls are spaced by an exponential backoff: `initial_delay_ms`, doubled
/// after each miss, capped at `max_delay_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ProvisioningPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 200,
            max_delay_ms: 2_000,
        }
    }
}

impl ProvisioningPolicy {
    /// No waiting between polls (tests).
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Sleep before poll `attempt` (0-based). The first poll is immediate.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
        let ms = self
            .initial_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(ms)
    }
}

/// Where the backend lives and how to talk to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub backend_url: String,
    /// Public (anonymous) API key sent with every request.
    pub anon_key: String,
    pub provisioning: ProvisioningPolicy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            anon_key: String::new(),
            provisioning: ProvisioningPolicy::default(),
        }
    }
}

impl GatewayConfig {
    pub fn new(backend_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            backend_url: backend_url.into(),
            anon_key: anon_key.into(),
            provisioning: ProvisioningPolicy::default(),
        }
    }

    pub fn with_provisioning(mut self, provisioning: ProvisioningPolicy) -> Self {
        self.provisioning = provisioning;
        self
    }

    /// Reads `DOJO_BACKEND_URL`, `DOJO_BACKEND_ANON_KEY`,
    /// `DOJO_PROVISION_ATTEMPTS`, `DOJO_PROVISION_INITIAL_DELAY_MS` and
    /// `DOJO_PROVISION_MAX_DELAY_MS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = ProvisioningPolicy::default();

        let backend_url = lookup("DOJO_BACKEND_URL").unwrap_or_else(|| {
            tracing::warn!("DOJO_BACKEND_URL not set; using {DEFAULT_BACKEND_URL}");
            DEFAULT_BACKEND_URL.to_string()
        });

        let anon_key = lookup("DOJO_BACKEND_ANON_KEY").unwrap_or_else(|| {
            tracing::warn!("DOJO_BACKEND_ANON_KEY not set; requests will be sent without an API key");
            String::new()
        });

        Self {
            backend_url: backend_url.trim_end_matches('/').to_string(),
            anon_key,
            provisioning: ProvisioningPolicy {
                max_attempts: number(&lookup, "DOJO_PROVISION_ATTEMPTS", defaults.max_attempts),
                initial_delay_ms: number(
                    &lookup,
                    "DOJO_PROVISION_INITIAL_DELAY_MS",
                    defaults.initial_delay_ms,
                ),
                max_delay_ms: number(&lookup, "DOJO_PROVISION_MAX_DELAY_MS", defaults.max_delay_ms),
            },
        }
    }
}

fn number<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: core::str::FromStr + core::fmt::Display + Copy,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "not a number; using default {default}");
            default
        }),
    }
}
