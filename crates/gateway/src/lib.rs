//! `dojo-gateway`: the only component that talks to the identity backend.
//!
//! [`SessionGateway`] turns the backend's auth/RPC/row surface (abstracted by
//! [`AuthBackend`]) into the identity operations the client needs, and
//! normalizes every backend fault into [`GatewayError`].

pub mod backend;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod in_memory;
pub mod profile;
pub mod rest;

pub use backend::{AuthBackend, AuthSession, AuthUser, BackendError, RowFilter, SignUpRequest};
pub use config::{GatewayConfig, ProvisioningPolicy};
pub use errors::GatewayError;
pub use gateway::{IdentitySource, RegistrationResult, SessionGateway};
pub use in_memory::{Fault, InMemoryBackend};
pub use profile::{Credentials, RegistrationForm, RegistrationProfile};
pub use rest::RestBackend;
