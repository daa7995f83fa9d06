//! `dojo-session`: the process-wide identity state and what reads it.
//!
//! [`IdentityContext`] owns the current [`dojo_auth::IdentityRecord`] and
//! drives the [`dojo_gateway::SessionGateway`]; [`guard`] turns its state into
//! navigation decisions for protected screens.

pub mod context;
pub mod guard;

pub use context::{IdentityContext, IdentitySnapshot, IdentityState};
pub use guard::{RouteDecision, guard, require_role};
