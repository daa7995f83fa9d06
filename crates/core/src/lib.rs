//! `dojo-core`: shared building blocks for the membership client.
//!
//! Pure data primitives only (no IO, no backend concerns).

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{AcademyId, AuthId, UserId};
